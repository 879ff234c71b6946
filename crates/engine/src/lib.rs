//! Wallpaper rotation engine.
//!
//! Resolves opaque image identifiers through a remote catalog, downloads the
//! content under size and time bounds with retry, keeps it in a size-bounded
//! LRU cache with a persisted access index, and applies it to the desktop
//! through a pluggable [`rotation::BackgroundApplier`]. A [`scheduler`]
//! drives the pipeline periodically.

pub mod builder;
pub mod cache;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod retry;
pub mod rotation;
pub mod scheduler;
pub mod validate;

pub use builder::EngineConfigBuilder;
pub use cache::{AccessIndex, CacheStore, CachedItem};
pub use catalog::{CatalogClient, CatalogEntry};
pub use config::{EngineConfig, RotationSource};
pub use error::{EngineError, ErrorKind, Result};
pub use fetch::{ContentFetcher, ProgressSample};
pub use retry::RetryPolicy;
pub use rotation::{BackgroundApplier, RotationStage, Rotator};
pub use scheduler::Scheduler;
pub use validate::Validator;

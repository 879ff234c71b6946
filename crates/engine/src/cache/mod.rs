//! Size-bounded local content cache with LRU eviction.
//!
//! The store owns a directory of content files plus a persisted
//! identifier -> last-access-time index. The index, not filesystem atime,
//! is the source of truth for LRU ordering: atime is unreliable depending
//! on mount options, so file metadata is only a fallback.

mod index;
mod store;
mod types;

pub use index::AccessIndex;
pub use store::CacheStore;
pub use types::CachedItem;

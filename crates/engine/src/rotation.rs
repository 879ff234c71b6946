//! Rotation pipeline: validate, resolve, fetch, apply, clean up.
//!
//! Cache cleanup runs only after the background was applied successfully, so
//! a failed apply never evicts the file that is still on screen.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::catalog::CatalogClient;
use crate::client::create_client;
use crate::config::EngineConfig;
use crate::error::{EngineError, ErrorKind, Result};
use crate::fetch::{ContentFetcher, ProgressObserver};
use crate::retry::RetryPolicy;
use crate::validate::Validator;

/// Applies a local file as the desktop background. Implementations report
/// plain success or failure; the pipeline wraps failure into an error.
pub trait BackgroundApplier: Send + Sync {
    fn apply(&self, path: &Path) -> bool;
}

/// Pipeline stage, attached to errors so a failure names where it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStage {
    Idle,
    Validating,
    ResolvingCatalog,
    Fetching,
    Applying,
    CleaningUp,
    Done,
    Failed,
}

impl std::fmt::Display for RotationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::ResolvingCatalog => "resolving catalog",
            Self::Fetching => "fetching",
            Self::Applying => "applying",
            Self::CleaningUp => "cleaning up",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

pub struct Rotator {
    catalog: CatalogClient,
    fetcher: ContentFetcher,
    store: Arc<CacheStore>,
    applier: Arc<dyn BackgroundApplier>,
    validator: Validator,
    max_cache_size: u64,
}

impl Rotator {
    pub fn new(
        catalog: CatalogClient,
        fetcher: ContentFetcher,
        store: Arc<CacheStore>,
        applier: Arc<dyn BackgroundApplier>,
        validator: Validator,
        max_cache_size: u64,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            store,
            applier,
            validator,
            max_cache_size,
        }
    }

    /// Wire the whole pipeline from a validated config: separate HTTP clients
    /// for catalog lookups and content downloads, one shared cache store.
    pub async fn from_config(
        config: &EngineConfig,
        applier: Arc<dyn BackgroundApplier>,
    ) -> Result<Self> {
        let validator = Validator::new(config.allowed_hosts.clone(), config.max_file_size_bytes);
        let retry = RetryPolicy::new(config.max_retries);
        let store = Arc::new(CacheStore::new(&config.cache_dir, validator.clone()).await?);

        let catalog = CatalogClient::new(
            create_client(config.api_timeout())?,
            &config.catalog_base_url,
            validator.clone(),
            retry,
        );
        let fetcher = ContentFetcher::new(
            create_client(config.download_timeout())?,
            Arc::clone(&store),
            validator.clone(),
            retry,
        );

        Ok(Self::new(
            catalog,
            fetcher,
            store,
            applier,
            validator,
            config.max_cache_size_bytes(),
        ))
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn catalog(&self) -> &CatalogClient {
        &self.catalog
    }

    /// Run the full pipeline for one identifier. Returns the local path that
    /// was applied.
    pub async fn set_from_identifier(
        &self,
        identifier: &str,
        progress: Option<&ProgressObserver>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        debug!(identifier = %identifier, stage = %RotationStage::Validating, "rotation started");
        if !self.validator.is_valid_identifier(identifier) {
            return Err(
                EngineError::new(ErrorKind::InvalidIdentifier, "invalid identifier")
                    .with_context("identifier", identifier)
                    .with_context("stage", RotationStage::Validating),
            );
        }

        debug!(identifier = %identifier, stage = %RotationStage::ResolvingCatalog, "resolving");
        let entry = self
            .catalog
            .resolve(identifier, cancel)
            .await
            .map_err(|e| e.with_context("stage", RotationStage::ResolvingCatalog))?;

        debug!(identifier = %identifier, stage = %RotationStage::Fetching, url = %entry.url, "fetching");
        let path = self
            .fetcher
            .fetch(&entry.url, identifier, progress, cancel)
            .await
            .map_err(|e| e.with_context("stage", RotationStage::Fetching))?;

        debug!(identifier = %identifier, stage = %RotationStage::Applying, path = ?path, "applying");
        if !self.applier.apply(&path) {
            return Err(EngineError::new(
                ErrorKind::SystemApplyError,
                "failed to apply background",
            )
            .with_context("identifier", identifier)
            .with_context("path", path.display())
            .with_context("stage", RotationStage::Applying));
        }

        // Apply succeeded; the on-screen file has a fresh access time and is
        // the last candidate for eviction.
        debug!(identifier = %identifier, stage = %RotationStage::CleaningUp, "cleaning up");
        self.store.touch(identifier);
        self.store.cleanup_to_limit(self.max_cache_size).await;

        info!(identifier = %identifier, path = ?path, "background rotated");
        Ok(path)
    }
}

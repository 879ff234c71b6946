//! Engine configuration with range validation and JSON persistence.
//!
//! The engine consumes this surface, it does not own it: values are
//! range-checked on load and out-of-range entries are silently replaced by
//! defaults with a logged warning, so a hand-edited settings file can never
//! take the engine down.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EngineError, ErrorKind, Result};
use crate::validate::{DEFAULT_ALLOWED_HOSTS, DEFAULT_MAX_FILE_SIZE};

pub const DEFAULT_CATALOG_BASE_URL: &str = "https://aiwp.me/api";
pub const DEFAULT_MAX_CACHE_SIZE_MB: u64 = 500;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_SCHEDULER_INTERVAL_MINUTES: u64 = 60;

/// Where the scheduler looks for the next identifier to rotate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RotationSource {
    /// Pick uniformly among already-cached items whose file still exists.
    History,
    /// Ask the remote catalog for a random identifier.
    #[default]
    Catalog,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Directory holding cached files and the access index.
    pub cache_dir: PathBuf,
    pub max_cache_size_mb: u64,
    pub download_timeout_secs: u64,
    pub api_timeout_secs: u64,
    pub max_retries: u32,
    pub max_file_size_bytes: u64,
    pub allowed_hosts: Vec<String>,
    pub catalog_base_url: String,
    pub scheduler_enabled: bool,
    pub scheduler_interval_minutes: u64,
    pub rotation_source: RotationSource,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("wallshift-cache"),
            max_cache_size_mb: DEFAULT_MAX_CACHE_SIZE_MB,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            api_timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            allowed_hosts: DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
            catalog_base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
            scheduler_enabled: false,
            scheduler_interval_minutes: DEFAULT_SCHEDULER_INTERVAL_MINUTES,
            rotation_source: RotationSource::default(),
        }
    }
}

impl EngineConfig {
    pub fn builder() -> crate::builder::EngineConfigBuilder {
        crate::builder::EngineConfigBuilder::new()
    }

    pub fn max_cache_size_bytes(&self) -> u64 {
        self.max_cache_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_minutes.saturating_mul(60))
    }

    /// Replace out-of-range values with defaults, warning for each fix.
    pub fn validated(mut self) -> Self {
        if !(10..=1024 * 1024).contains(&self.max_cache_size_mb) {
            warn!(
                value = self.max_cache_size_mb,
                "maxCacheSizeMb out of range, using default"
            );
            self.max_cache_size_mb = DEFAULT_MAX_CACHE_SIZE_MB;
        }
        if !(10..=300).contains(&self.download_timeout_secs) {
            warn!(
                value = self.download_timeout_secs,
                "downloadTimeoutSecs out of range, using default"
            );
            self.download_timeout_secs = DEFAULT_DOWNLOAD_TIMEOUT_SECS;
        }
        if !(5..=120).contains(&self.api_timeout_secs) {
            warn!(
                value = self.api_timeout_secs,
                "apiTimeoutSecs out of range, using default"
            );
            self.api_timeout_secs = DEFAULT_API_TIMEOUT_SECS;
        }
        if self.max_retries > 10 {
            warn!(value = self.max_retries, "maxRetries out of range, using default");
            self.max_retries = DEFAULT_MAX_RETRIES;
        }
        if self.max_file_size_bytes == 0 {
            warn!("maxFileSizeBytes must be positive, using default");
            self.max_file_size_bytes = DEFAULT_MAX_FILE_SIZE;
        }
        // One week ceiling; anything longer is a typo, not a schedule.
        if !(1..=7 * 24 * 60).contains(&self.scheduler_interval_minutes) {
            warn!(
                value = self.scheduler_interval_minutes,
                "schedulerIntervalMinutes out of range, using default"
            );
            self.scheduler_interval_minutes = DEFAULT_SCHEDULER_INTERVAL_MINUTES;
        }
        if self.cache_dir.as_os_str().is_empty() {
            warn!("cacheDir empty, using default");
            self.cache_dir = Self::default().cache_dir;
        }
        if self.allowed_hosts.is_empty() {
            warn!("allowedHosts empty, using default");
            self.allowed_hosts = Self::default().allowed_hosts;
        }
        if self.catalog_base_url.trim().is_empty() {
            warn!("catalogBaseUrl empty, using default");
            self.catalog_base_url = DEFAULT_CATALOG_BASE_URL.to_string();
        }
        self
    }

    /// Load settings from a JSON file. A missing file yields defaults; a
    /// corrupt one is logged and also yields defaults. Never fatal.
    pub async fn load(path: &Path) -> Self {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Self::default();
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "failed to read settings file, using defaults");
                return Self::default();
            }
        };
        match serde_json::from_slice::<Self>(&raw) {
            Ok(config) => config.validated(),
            Err(e) => {
                warn!(path = ?path, error = %e, "invalid settings file, using defaults");
                Self::default()
            }
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| {
            EngineError::with_source(ErrorKind::ConfigurationError, "failed to serialize settings", e)
        })?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                EngineError::with_source(
                    ErrorKind::ConfigurationError,
                    "failed to create settings directory",
                    e,
                )
            })?;
        }
        tokio::fs::write(path, json).await.map_err(|e| {
            EngineError::with_source(ErrorKind::ConfigurationError, "failed to write settings", e)
                .with_context("path", path.display())
        })
    }
}

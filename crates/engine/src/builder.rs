//! Builder for [`EngineConfig`] with a fluent API.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{EngineConfig, RotationSource};

#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    pub fn with_max_cache_size_mb(mut self, mb: u64) -> Self {
        self.config.max_cache_size_mb = mb;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.config.download_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_api_timeout(mut self, timeout: Duration) -> Self {
        self.config.api_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn with_max_file_size_bytes(mut self, bytes: u64) -> Self {
        self.config.max_file_size_bytes = bytes;
        self
    }

    pub fn with_allowed_hosts(mut self, hosts: Vec<String>) -> Self {
        self.config.allowed_hosts = hosts;
        self
    }

    pub fn with_catalog_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.catalog_base_url = url.into();
        self
    }

    pub fn with_scheduler_enabled(mut self, enabled: bool) -> Self {
        self.config.scheduler_enabled = enabled;
        self
    }

    pub fn with_scheduler_interval_minutes(mut self, minutes: u64) -> Self {
        self.config.scheduler_interval_minutes = minutes;
        self
    }

    pub fn with_rotation_source(mut self, source: RotationSource) -> Self {
        self.config.rotation_source = source;
        self
    }

    /// Build the config. Range validation is applied, so out-of-range values
    /// end up as defaults exactly as they would when loaded from disk.
    pub fn build(self) -> EngineConfig {
        self.config.validated()
    }
}

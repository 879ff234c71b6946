//! Streaming content fetcher: cache-hit short circuit, bounded download
//! with progress reporting and retry, atomic write into the cache store.

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use reqwest::Client;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::cache::CacheStore;
use crate::error::{EngineError, ErrorKind, Result, cancelled, classify_transport};
use crate::retry::RetryPolicy;
use crate::validate::Validator;

/// Used when the URL carries no recognizable file extension.
const DEFAULT_EXTENSION: &str = ".jpg";

/// Snapshot of download progress, passed to the observer after each chunk.
#[derive(Debug, Clone, Copy)]
pub struct ProgressSample {
    pub bytes_received: u64,
    pub bytes_total: Option<u64>,
}

pub type ProgressObserver = dyn Fn(ProgressSample) + Send + Sync;

/// Extension of the URL's trailing path segment, without the dot.
/// Only short alphanumeric suffixes count; query strings and fragments are
/// already stripped by the URL parser.
pub(crate) fn url_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?.to_string();
    let (_, ext) = last_segment.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub struct ContentFetcher {
    client: Client,
    store: Arc<CacheStore>,
    validator: Validator,
    retry: RetryPolicy,
}

impl ContentFetcher {
    pub fn new(
        client: Client,
        store: Arc<CacheStore>,
        validator: Validator,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            store,
            validator,
            retry,
        }
    }

    /// Return a local path for the identifier's content, downloading it into
    /// the cache store unless it is already present.
    pub async fn fetch(
        &self,
        url: &str,
        identifier: &str,
        progress: Option<&ProgressObserver>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        if !self.validator.is_valid_resource_url(url) {
            return Err(EngineError::new(
                ErrorKind::InvalidOrUntrustedUrl,
                "invalid or untrusted content URL",
            )
            .with_context("url", url));
        }
        if !self.validator.is_valid_identifier(identifier) {
            return Err(
                EngineError::new(ErrorKind::InvalidIdentifier, "invalid identifier")
                    .with_context("identifier", identifier),
            );
        }

        // Cache hit: no network call, just refresh the access time.
        if let Some(path) = self.store.existing_path(identifier).await {
            info!(identifier = %identifier, path = ?path, "using cached content");
            self.store.touch(identifier);
            return Ok(path);
        }

        info!(identifier = %identifier, url = %url, "downloading content");
        let data = self
            .download_with_retries(url, progress, cancel)
            .await
            .map_err(|e| e.with_context("identifier", identifier))?;

        let extension = url_extension(url)
            .map(|ext| format!(".{ext}"))
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        let path = self.store.path_for(identifier, &extension)?;

        self.write_atomically(&path, &data).await?;
        self.store.touch(identifier);

        info!(
            identifier = %identifier,
            path = ?path,
            size = data.len(),
            "content downloaded"
        );
        Ok(path)
    }

    /// Write via a temp file and rename so a crash mid-write never leaves a
    /// truncated file that would later count as a cache hit.
    async fn write_atomically(&self, path: &std::path::Path, data: &[u8]) -> Result<()> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data).await.map_err(|e| {
            EngineError::with_source(ErrorKind::CacheError, "failed to write cache file", e)
                .with_context("path", tmp.display())
        })?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(
                EngineError::with_source(ErrorKind::CacheError, "failed to finalize cache file", e)
                    .with_context("path", path.display()),
            );
        }
        Ok(())
    }

    async fn download_with_retries(
        &self,
        url: &str,
        progress: Option<&ProgressObserver>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(cancelled("content download"));
            }

            let failure = match self.download_once(url, progress, cancel).await {
                Ok(data) => return Ok(data),
                Err(e) => e,
            };

            // Size violations, cancellation and validation failures are
            // terminal; only transient transport/API failures get retried.
            if !failure.is_retryable() || attempt > self.retry.max_retries() {
                return Err(failure.with_context("attempts", attempt));
            }

            let delay = self.retry.delay_for(attempt);
            warn!(
                attempt,
                delay_secs = delay.as_secs(),
                error = %failure,
                "download failed, retrying"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled("content download")),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn download_once(
        &self,
        url: &str,
        progress: Option<&ProgressObserver>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport(e, "content download", cancel.is_cancelled()))?;

        if !response.status().is_success() {
            return Err(EngineError::new(
                ErrorKind::ApiError,
                format!("content server returned status {}", response.status()),
            )
            .with_context("status", response.status().as_u16()));
        }

        let max = self.validator.max_file_size();
        let total = response.content_length();

        // Fail fast on the declared length, before reading a single byte.
        if let Some(declared) = total
            && declared > max
        {
            return Err(EngineError::new(
                ErrorKind::FileTooLarge,
                "declared content length exceeds the maximum file size",
            )
            .with_context("content_length", declared)
            .with_context("max_bytes", max));
        }

        let mut buffer = Vec::with_capacity(total.unwrap_or(0).min(max) as usize);
        let mut stream = response.bytes_stream();

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled("content download")),
                next = stream.next() => match next {
                    None => break,
                    Some(Ok(chunk)) => chunk,
                    Some(Err(e)) => {
                        return Err(classify_transport(e, "content download", cancel.is_cancelled()));
                    }
                },
            };

            buffer.extend_from_slice(&chunk);
            if let Some(observer) = progress {
                observer(ProgressSample {
                    bytes_received: buffer.len() as u64,
                    bytes_total: total,
                });
            }

            // The declared length may lie; enforce the cap mid-stream too.
            if buffer.len() as u64 > max {
                return Err(EngineError::new(
                    ErrorKind::FileTooLarge,
                    "download exceeded the maximum file size mid-stream",
                )
                .with_context("bytes_received", buffer.len())
                .with_context("max_bytes", max));
            }
        }

        Ok(buffer)
    }
}

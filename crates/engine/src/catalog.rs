//! Remote catalog client: resolves an identifier to a download URL and
//! picks random identifiers, with retry and response re-validation.

use rand::RngExt;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{EngineError, ErrorKind, Result, cancelled, classify_transport};
use crate::fetch::url_extension;
use crate::retry::RetryPolicy;
use crate::validate::Validator;

/// Download-reference field names tried in priority order; first match wins.
const URL_FIELDS: [&str; 3] = ["path", "url", "thumbnailUrl"];

/// Result of one catalog lookup. Not persisted; consumed immediately by the
/// fetcher.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub identifier: String,
    pub url: String,
    pub size_hint: Option<u64>,
    /// File format derived from the URL's trailing suffix, without the dot.
    pub format: Option<String>,
}

#[derive(Clone)]
pub struct CatalogClient {
    client: Client,
    base_url: String,
    validator: Validator,
    retry: RetryPolicy,
}

impl CatalogClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        validator: Validator,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            validator,
            retry,
        }
    }

    /// GET with the shared retry policy. Retries on any non-success status
    /// or transport failure; cancellation is checked before each attempt and
    /// is terminal. The final failure is classified: ApiError for a
    /// non-success status, Timeout or NetworkError for transport problems.
    async fn get_with_retries(
        &self,
        url: &str,
        what: &str,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(cancelled(what));
            }

            let failure = match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => EngineError::new(
                    ErrorKind::ApiError,
                    format!("{what} returned status {}", response.status()),
                )
                .with_context("status", response.status().as_u16()),
                Err(e) => classify_transport(e, what, cancel.is_cancelled()),
            };

            if !failure.is_retryable() || attempt > self.retry.max_retries() {
                return Err(failure.with_context("attempts", attempt));
            }

            let delay = self.retry.delay_for(attempt);
            warn!(
                attempt,
                delay_secs = delay.as_secs(),
                error = %failure,
                "{what} failed, retrying"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled(what)),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Resolve an identifier to a validated [`CatalogEntry`].
    pub async fn resolve(&self, identifier: &str, cancel: &CancellationToken) -> Result<CatalogEntry> {
        if !self.validator.is_valid_identifier(identifier) {
            return Err(
                EngineError::new(ErrorKind::InvalidIdentifier, "invalid identifier")
                    .with_context("identifier", identifier),
            );
        }

        let request_url = format!("{}/images/{}.json", self.base_url, identifier);
        debug!(identifier = %identifier, url = %request_url, "fetching catalog entry");

        let response = self
            .get_with_retries(&request_url, "catalog lookup", cancel)
            .await
            .map_err(|e| e.with_context("identifier", identifier))?;

        let body: serde_json::Value = response.json().await.map_err(|e| {
            EngineError::with_source(ErrorKind::ApiError, "invalid JSON in catalog response", e)
                .with_context("identifier", identifier)
        })?;

        let url = URL_FIELDS
            .iter()
            .find_map(|field| body.get(*field).and_then(|v| v.as_str()))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                EngineError::new(
                    ErrorKind::ApiError,
                    "no usable download reference in catalog response",
                )
                .with_context("identifier", identifier)
            })?;

        // A compromised or spoofed response must not redirect the fetch to
        // an untrusted origin.
        if !self.validator.is_valid_resource_url(url) {
            return Err(EngineError::new(
                ErrorKind::InvalidOrUntrustedUrl,
                "catalog returned an untrusted download URL",
            )
            .with_context("identifier", identifier)
            .with_context("url", url));
        }

        let size_hint = body
            .get("fileSize")
            .and_then(|v| v.as_u64())
            .or_else(|| body.get("size").and_then(|v| v.as_u64()))
            .filter(|size| *size > 0);

        info!(identifier = %identifier, url = %url, "resolved catalog entry");
        Ok(CatalogEntry {
            identifier: identifier.to_string(),
            url: url.to_string(),
            size_hint,
            format: url_extension(url),
        })
    }

    /// Fetch the list of available identifiers and pick one uniformly at
    /// random. An empty list is a hard failure.
    pub async fn pick_random(&self, cancel: &CancellationToken) -> Result<String> {
        let request_url = format!("{}/images.json", self.base_url);
        let response = self
            .get_with_retries(&request_url, "catalog list", cancel)
            .await?;

        let mut identifiers: Vec<String> = response.json().await.map_err(|e| {
            EngineError::with_source(ErrorKind::ApiError, "invalid JSON in catalog list", e)
        })?;

        if identifiers.is_empty() {
            return Err(EngineError::new(
                ErrorKind::NetworkError,
                "catalog returned an empty identifier list",
            ));
        }

        let index = rand::rng().random_range(0..identifiers.len());
        Ok(identifiers.swap_remove(index))
    }
}

//! HTTP client construction shared by the catalog client and the fetcher.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};

use crate::error::{EngineError, ErrorKind, Result};

const USER_AGENT: &str = concat!("wallshift/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a reqwest client with the given overall request timeout.
pub fn create_client(timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static("application/json, image/*;q=0.9, */*;q=0.8"),
    );

    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(10));

    if !timeout.is_zero() {
        builder = builder.timeout(timeout);
    }

    builder.build().map_err(|e| {
        EngineError::with_source(ErrorKind::ConfigurationError, "failed to build HTTP client", e)
    })
}

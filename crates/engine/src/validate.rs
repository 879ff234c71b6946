//! Input validation for identifiers, remote URLs and local cache paths.
//!
//! All checks are pure; the only state is the host allow-list and the size
//! ceiling injected at construction so tests can run independent instances.

use url::Url;

/// Hosts the engine is willing to download from. Everything else, including
/// loopback, link-local and metadata-service addresses, is rejected outright.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &["aiwp.me"];

/// Maximum downloaded file size (50 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

const MAX_IDENTIFIER_LEN: usize = 50;
const MAX_PATH_LEN: usize = 260;

#[derive(Debug, Clone)]
pub struct Validator {
    allowed_hosts: Vec<String>,
    max_file_size: u64,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(
            DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
            DEFAULT_MAX_FILE_SIZE,
        )
    }
}

impl Validator {
    pub fn new(allowed_hosts: Vec<String>, max_file_size: u64) -> Self {
        Self {
            allowed_hosts: allowed_hosts
                .into_iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            max_file_size,
        }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// An identifier is 1..=50 characters of `[A-Za-z0-9_-]`. Mixed case and
    /// leading zeros are fine; anything else (whitespace, quotes, slashes,
    /// control characters, non-ASCII digits) is not.
    pub fn is_valid_identifier(&self, identifier: &str) -> bool {
        if identifier.is_empty() || identifier.len() > MAX_IDENTIFIER_LEN {
            return false;
        }
        identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    /// A resource URL must be an absolute http(s) URL whose host equals, or
    /// is a subdomain of, an allow-listed host. Host allow-listing is the
    /// SSRF defense: no literal-IP form of an internal host can ever match.
    pub fn is_valid_resource_url(&self, url: &str) -> bool {
        if url.trim().is_empty() {
            return false;
        }
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.allowed_hosts
            .iter()
            .any(|allowed| host == *allowed || host.ends_with(&format!(".{allowed}")))
    }

    /// A local path is safe when it is non-empty, stays under the platform
    /// path-length ceiling, contains no parent-directory traversal segment
    /// and no characters illegal in a file name.
    pub fn is_valid_local_path(&self, path: &str) -> bool {
        if path.trim().is_empty() || path.len() > MAX_PATH_LEN {
            return false;
        }
        if path.contains("../") || path.contains("..\\") {
            return false;
        }
        if path.chars().any(|c| c.is_control()) {
            return false;
        }
        // Illegal-in-a-file-name characters are only checked on the final
        // component, so drive prefixes and network-share paths still pass.
        let file_name = path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(path);
        !file_name.contains(['<', '>', ':', '"', '|', '?', '*'])
    }
}

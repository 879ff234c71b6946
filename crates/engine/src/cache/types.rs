use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// One cached file, reconstructed from directory enumeration plus the
/// access index.
#[derive(Debug, Clone)]
pub struct CachedItem {
    pub identifier: String,
    pub file_path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
}

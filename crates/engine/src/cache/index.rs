//! Persisted identifier -> last-access-time mapping.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::warn;

/// File name of the persisted index inside the cache directory. Enumeration
/// and size accounting always skip it.
pub(crate) const INDEX_FILE_NAME: &str = "access-times.json";

/// In-memory access index. Durability is best-effort: the store flushes it
/// during cleanup, clear, or on demand. A missing or corrupt on-disk index
/// is treated as empty, never as a startup failure.
#[derive(Debug, Default)]
pub struct AccessIndex {
    entries: HashMap<String, DateTime<Utc>>,
}

impl AccessIndex {
    pub async fn load(path: &Path) -> Self {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Self::default();
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "failed to read access index, starting empty");
                return Self::default();
            }
        };
        match serde_json::from_slice::<HashMap<String, DateTime<Utc>>>(&raw) {
            Ok(entries) => Self { entries },
            Err(e) => {
                warn!(path = ?path, error = %e, "corrupt access index, starting empty");
                Self::default()
            }
        }
    }

    /// Write a snapshot to disk via a temp file and rename so readers never
    /// observe a half-written index.
    pub async fn persist(
        path: &Path,
        snapshot: &HashMap<String, DateTime<Utc>>,
    ) -> std::io::Result<()> {
        let json = serde_json::to_vec(snapshot)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &json).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    /// Record "now" as the identifier's last access time.
    pub fn touch(&mut self, identifier: &str) {
        self.entries.insert(identifier.to_string(), Utc::now());
    }

    pub fn set(&mut self, identifier: &str, when: DateTime<Utc>) {
        self.entries.insert(identifier.to_string(), when);
    }

    pub fn get(&self, identifier: &str) -> Option<DateTime<Utc>> {
        self.entries.get(identifier).copied()
    }

    pub fn remove(&mut self, identifier: &str) {
        self.entries.remove(identifier);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> HashMap<String, DateTime<Utc>> {
        self.entries.clone()
    }
}

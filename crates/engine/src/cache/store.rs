use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::cache::index::{AccessIndex, INDEX_FILE_NAME};
use crate::cache::types::CachedItem;
use crate::error::{EngineError, ErrorKind, Result};
use crate::validate::Validator;

/// Directory-backed content store with a persisted access index.
///
/// Read paths (existence checks, enumeration, size accounting) absorb
/// filesystem errors: they log and report "absent" or "skip". Cleanup and
/// clear run under a single async mutex so two maintenance passes never
/// interleave; downloads are deliberately outside that lock — cleanup works
/// on a snapshot and a file written mid-pass simply survives to the next one.
pub struct CacheStore {
    dir: PathBuf,
    validator: Validator,
    index: Mutex<AccessIndex>,
    maintenance: tokio::sync::Mutex<()>,
}

impl CacheStore {
    /// Open (creating if needed) the cache directory and load the index.
    pub async fn new(dir: impl Into<PathBuf>, validator: Validator) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            EngineError::with_source(ErrorKind::CacheError, "failed to create cache directory", e)
                .with_context("dir", dir.display())
        })?;
        let index = AccessIndex::load(&dir.join(INDEX_FILE_NAME)).await;
        Ok(Self {
            dir,
            validator,
            index: Mutex::new(index),
            maintenance: tokio::sync::Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE_NAME)
    }

    /// Deterministic path for an identifier and extension (with leading dot).
    pub fn path_for(&self, identifier: &str, extension: &str) -> Result<PathBuf> {
        if !self.validator.is_valid_identifier(identifier) {
            return Err(
                EngineError::new(ErrorKind::InvalidIdentifier, "invalid identifier")
                    .with_context("identifier", identifier),
            );
        }
        let path = self.dir.join(format!("{identifier}{extension}"));
        if !self.validator.is_valid_local_path(&path.to_string_lossy()) {
            return Err(
                EngineError::new(ErrorKind::CacheError, "resolved cache path is not safe")
                    .with_context("path", path.display()),
            );
        }
        Ok(path)
    }

    /// First cached file matching `identifier.*`, if any. Filesystem errors
    /// are logged and reported as absence.
    pub async fn existing_path(&self, identifier: &str) -> Option<PathBuf> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(identifier = %identifier, error = %e, "failed to read cache directory");
                return None;
            }
        };
        let prefix = format!("{identifier}.");
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name();
                    let name = name.to_string_lossy();
                    // Leftover .tmp files from an interrupted write are never
                    // a cache hit.
                    if name != INDEX_FILE_NAME
                        && !name.ends_with(".tmp")
                        && name.starts_with(&prefix)
                    {
                        return Some(entry.path());
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    warn!(identifier = %identifier, error = %e, "error while scanning cache directory");
                    return None;
                }
            }
        }
    }

    pub async fn is_cached(&self, identifier: &str) -> bool {
        self.existing_path(identifier).await.is_some()
    }

    /// Record "now" as the identifier's last access time. In-memory only;
    /// flushed during cleanup/clear or via [`Self::flush_index`].
    pub fn touch(&self, identifier: &str) {
        self.index.lock().touch(identifier);
    }

    pub fn set_access_time(&self, identifier: &str, when: DateTime<Utc>) {
        self.index.lock().set(identifier, when);
    }

    /// Persist the access index now. Failures are logged, not surfaced: a
    /// stale index degrades LRU ordering, it does not break the cache.
    pub async fn flush_index(&self) {
        let snapshot = self.index.lock().snapshot();
        if let Err(e) = AccessIndex::persist(&self.index_path(), &snapshot).await {
            warn!(error = %e, "failed to persist access index");
        }
    }

    /// Enumerate cached items. Last access comes from the index, falling back
    /// to filesystem metadata for identifiers the index does not know.
    pub async fn history(&self) -> Vec<CachedItem> {
        let mut items = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = ?self.dir, error = %e, "failed to enumerate cache directory");
                return items;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy().into_owned();
            if name == INDEX_FILE_NAME || name.ends_with(".tmp") {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = ?path, error = %e, "skipping unreadable cache entry");
                    continue;
                }
            };

            let identifier = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or(name);
            let created_at = metadata
                .created()
                .or_else(|_| metadata.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            let last_access_at = self.index.lock().get(&identifier).unwrap_or_else(|| {
                metadata
                    .accessed()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or(created_at)
            });

            items.push(CachedItem {
                identifier,
                file_path: path,
                size_bytes: metadata.len(),
                created_at,
                last_access_at,
            });
        }
        items
    }

    /// Total bytes occupied by cached content, excluding the index file.
    pub async fn total_size(&self) -> u64 {
        let mut total = 0u64;
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = ?self.dir, error = %e, "failed to compute cache size");
                return 0;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == INDEX_FILE_NAME || name.ends_with(".tmp") {
                continue;
            }
            // Unreadable entries are skipped, not fatal.
            if let Ok(metadata) = entry.metadata().await
                && metadata.is_file()
            {
                total += metadata.len();
            }
        }
        total
    }

    /// Evict least-recently-used items until the cache fits `max_bytes`.
    ///
    /// Runs under the maintenance lock. Items are sorted by ascending last
    /// access time (stable, so equal timestamps evict in encounter order) and
    /// deleted from the front until at least `current - max_bytes` has been
    /// freed. Deletion failures are logged and skipped; a partially
    /// successful pass is not an error. Persists the index at the end.
    pub async fn cleanup_to_limit(&self, max_bytes: u64) {
        let _guard = self.maintenance.lock().await;

        let current = self.total_size().await;
        if current <= max_bytes {
            debug!(current, max_bytes, "cache within limit, nothing to clean");
            return;
        }
        info!(current, max_bytes, "cache over limit, starting LRU cleanup");

        let mut items = self.history().await;
        items.sort_by_key(|item| item.last_access_at);

        let to_remove = current - max_bytes;
        let mut removed = 0u64;
        let mut files_removed = 0usize;

        for item in items {
            if removed >= to_remove {
                break;
            }
            match fs::remove_file(&item.file_path).await {
                Ok(()) => {
                    removed += item.size_bytes;
                    files_removed += 1;
                    self.index.lock().remove(&item.identifier);
                    debug!(identifier = %item.identifier, size = item.size_bytes, "evicted cached item");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // Raced with a clear or another cleanup; nothing to free.
                    self.index.lock().remove(&item.identifier);
                }
                Err(e) => {
                    warn!(path = ?item.file_path, error = %e, "failed to evict cached item, skipping");
                }
            }
        }

        info!(files_removed, bytes_freed = removed, "cache cleanup complete");
        self.flush_index().await;
    }

    /// Delete every file in the cache directory and reset the index.
    pub async fn clear_all(&self) {
        let _guard = self.maintenance.lock().await;

        let mut deleted = 0usize;
        match fs::read_dir(&self.dir).await {
            Ok(mut entries) => {
                while let Ok(Some(entry)) = entries.next_entry().await {
                    match fs::remove_file(entry.path()).await {
                        Ok(()) => deleted += 1,
                        Err(e) => {
                            warn!(path = ?entry.path(), error = %e, "failed to delete cache file");
                        }
                    }
                }
            }
            Err(e) => {
                warn!(dir = ?self.dir, error = %e, "failed to enumerate cache directory for clear");
            }
        }
        self.index.lock().clear();
        // The index file itself may have survived a failed deletion; writing
        // the empty index guarantees no stale entry outlives its file.
        self.flush_index().await;
        info!(deleted, "cache cleared");
    }
}

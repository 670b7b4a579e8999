//! src/services/file_cache.rs
//!
//! Local read-through cache of bucket objects.
//!
//! Each object is materialized at `<root>/<name>`. Misses download into
//! `<root>/.incoming/<uuid>` and are renamed into place only once complete, so a
//! reader never sees a partially written file at the canonical path. Entries are
//! never refreshed; eviction happens only under `CachePolicy::MaxBytes`.
//!
//! `resolve` hands back an open handle, so a file evicted after it was resolved
//! can still be read to the end by the caller holding it.

use crate::{
    models::object::check_object_name,
    services::blob_store::{BlobStore, StoreError},
};
use serde::Serialize;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};
use thiserror::Error;
use tokio::fs::{self, File};
use tracing::{debug, info, warn};
use uuid::Uuid;

const SCRATCH_DIR: &str = ".incoming";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid object name `{name}`: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Bound on the total size of cached files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Files accumulate forever.
    #[default]
    Unbounded,
    /// After each miss, drop least-recently-modified files until the total is within the limit.
    MaxBytes(u64),
}

impl CachePolicy {
    pub fn from_limit(limit: Option<u64>) -> Self {
        limit.map_or(Self::Unbounded, Self::MaxBytes)
    }
}

/// A cache lookup result.
#[derive(Debug)]
pub struct Resolved {
    pub path: PathBuf,
    /// True when the file was already on disk.
    pub hit: bool,
    /// Read handle opened before any eviction could remove `path`.
    pub file: File,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
}

#[derive(Clone)]
pub struct FileCache {
    root: PathBuf,
    scratch: PathBuf,
    store: Arc<dyn BlobStore>,
    policy: CachePolicy,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>, store: Arc<dyn BlobStore>, policy: CachePolicy) -> Self {
        let root = root.into();
        let scratch = root.join(SCRATCH_DIR);
        Self {
            root,
            scratch,
            store,
            policy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the cache root and scratch directory. Called once at startup.
    pub async fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.scratch).await?;
        info!(root = %self.root.display(), policy = ?self.policy, "cache initialized");
        Ok(())
    }

    /// Reject names that could escape the cache root or collide with the scratch area.
    pub fn validate_name(name: &str) -> CacheResult<()> {
        check_object_name(name).map_err(|reason| CacheError::InvalidName {
            name: name.to_string(),
            reason,
        })
    }

    /// Canonical local path for `name`, after validation.
    pub fn canonical_path(&self, name: &str) -> CacheResult<PathBuf> {
        Self::validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Open the local copy of `name`, downloading it first on a miss.
    ///
    /// Concurrent misses for the same name each download independently; the last
    /// rename wins and every caller ends up with a complete file. A failed download
    /// leaves the canonical path untouched.
    pub async fn resolve(&self, name: &str) -> CacheResult<Resolved> {
        let path = self.canonical_path(name)?;
        if let Some(file) = open_cached(&path).await? {
            debug!(name, "cache hit");
            return Ok(Resolved {
                path,
                hit: true,
                file,
            });
        }

        debug!(name, "cache miss");
        let scratch_path = self.scratch.join(Uuid::new_v4().to_string());
        if let Err(err) = self.store.get_to_file(name, &scratch_path).await {
            discard(&scratch_path).await;
            return Err(err.into());
        }
        // Opened before the rename so a concurrent eviction cannot take it away.
        let file = match File::open(&scratch_path).await {
            Ok(file) => file,
            Err(err) => {
                discard(&scratch_path).await;
                return Err(err.into());
            }
        };

        if let Err(err) = fs::rename(&scratch_path, &path).await {
            discard(&scratch_path).await;
            // Platforms that refuse to replace an existing file: another caller won.
            if !is_file(&path).await {
                return Err(err.into());
            }
        }
        info!(name, path = %path.display(), "cached object");

        if let CachePolicy::MaxBytes(limit) = self.policy {
            self.enforce_limit(limit, &path).await;
        }

        Ok(Resolved {
            path,
            hit: false,
            file,
        })
    }

    /// Summarize the files currently in the cache.
    pub async fn stats(&self) -> io::Result<CacheStats> {
        let entries = self.entries().await?;
        Ok(CacheStats {
            entries: entries.len(),
            total_bytes: entries.iter().map(|e| e.size).sum(),
        })
    }

    /// Evict oldest files until the cache fits in `limit`. `keep` is never removed.
    ///
    /// Returns the number of evicted files.
    pub async fn enforce_limit(&self, limit: u64, keep: &Path) -> usize {
        let mut entries = match self.entries().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "failed to scan cache for eviction");
                return 0;
            }
        };

        let mut total: u64 = entries.iter().map(|e| e.size).sum();
        if total <= limit {
            return 0;
        }

        entries.sort_by_key(|e| e.modified);
        let mut evicted = 0;
        for entry in entries {
            if total <= limit {
                break;
            }
            if entry.path == keep {
                continue;
            }
            match fs::remove_file(&entry.path).await {
                Ok(_) => {
                    total = total.saturating_sub(entry.size);
                    evicted += 1;
                    debug!(path = %entry.path.display(), size = entry.size, "evicted cache entry");
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    total = total.saturating_sub(entry.size);
                }
                Err(err) => {
                    warn!(path = %entry.path.display(), error = %err, "failed to evict cache entry");
                }
            }
        }

        if evicted > 0 {
            info!(evicted, total_bytes = total, limit, "cache trimmed");
        }
        evicted
    }

    async fn entries(&self) -> io::Result<Vec<CachedFile>> {
        let mut dir = fs::read_dir(&self.root).await?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            entries.push(CachedFile {
                path: entry.path(),
                size: meta.len(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        Ok(entries)
    }
}

struct CachedFile {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Open `path` if it holds a regular file. A missing path is a miss, not an error.
async fn open_cached(path: &Path) -> io::Result<Option<File>> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    if file.metadata().await?.is_file() {
        Ok(Some(file))
    } else {
        Ok(None)
    }
}

/// Best-effort removal of a scratch file.
async fn discard(path: &Path) {
    match fs::remove_file(path).await {
        Ok(_) => debug!(path = %path.display(), "discarded partial download"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "failed to discard partial download"),
    }
}

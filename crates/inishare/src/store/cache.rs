//! Parsed-document cache keyed by file path.
//!
//! Every access compares the stored freshness token (the file's mtime at the
//! last load or write) with the mtime on disk. Any difference reloads the
//! whole document. An in-memory change made through [`CacheStore::update`]
//! and not yet persisted with [`CacheStore::write`] is lost on that reload.
//!
//! A write always moves the mtime forward, even when the filesystem clock
//! has not ticked since the previous write, so a token is never reused.
//!
//! The cache does not lock files. Callers hold the
//! [`ProcessLock`](super::lock::ProcessLock) across a read-modify-write.
//! The internal mutex only protects the map itself, and it is shared with the
//! change watcher's callback thread.

use crate::codec::Codec;
use crate::error::{Result, StoreError};
use crate::model::Document;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, trace};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub document: Document,
    /// File mtime observed at the last successful load or write.
    pub modified: DateTime<Utc>,
    pub path: PathBuf,
}

struct CacheInner {
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
    codec: Arc<dyn Codec>,
}

/// Shared handle to the cache. Clones see the same entries.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<CacheInner>,
}

impl CacheStore {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                codec,
            }),
        }
    }

    /// A fresh copy of the document at `path`.
    pub fn get(&self, path: &Path) -> Result<Document> {
        self.read(path, Document::clone)
    }

    /// Run `f` against the fresh document at `path`.
    pub fn read<R>(&self, path: &Path, f: impl FnOnce(&Document) -> R) -> Result<R> {
        let key = normalize_path(path)?;
        let mut entries = self.inner.entries.lock();
        let entry = self.fresh_entry(&mut entries, &key)?;
        Ok(f(&entry.document))
    }

    /// Mutate the fresh document at `path` in memory only.
    pub fn update<R>(&self, path: &Path, f: impl FnOnce(&mut Document) -> R) -> Result<R> {
        let key = normalize_path(path)?;
        let mut entries = self.inner.entries.lock();
        let entry = self.fresh_entry(&mut entries, &key)?;
        Ok(f(&mut entry.document))
    }

    /// Serialize the cached document to disk and take the new mtime as token.
    pub fn write(&self, path: &Path) -> Result<()> {
        let key = normalize_path(path)?;
        let mut entries = self.inner.entries.lock();
        let entry = entries
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotCached(key.clone()))?;

        let bytes = self.inner.codec.serialize(&entry.document);
        atomic_write(&key, &bytes)?;
        entry.modified = advance_mtime(&key, entry.modified)?;
        trace!(path = %key.display(), modified = %entry.modified, "document written");
        Ok(())
    }

    /// Drop the entry for `path`. Returns whether one was cached.
    pub fn invalidate(&self, path: &Path) -> bool {
        let key = normalize_path(path).unwrap_or_else(|_| path.to_path_buf());
        let removed = self.inner.entries.lock().remove(&key).is_some();
        if removed {
            debug!(path = %key.display(), "cache entry dropped");
        }
        removed
    }

    /// Reload `path` if it is cached and its mtime moved. Paths that are not
    /// cached are left alone. A vanished or unreadable file drops the entry.
    ///
    /// Returns whether the entry changed.
    pub fn refresh_if_stale(&self, path: &Path) -> Result<bool> {
        let key = normalize_path(path)?;
        let mut entries = self.inner.entries.lock();
        let Some(cached) = entries.get(&key).map(|entry| entry.modified) else {
            return Ok(false);
        };

        let disk_modified = match modified_at(&key) {
            Ok(modified) => modified,
            Err(e) => {
                entries.remove(&key);
                return Err(e);
            }
        };
        if disk_modified == cached {
            return Ok(false);
        }

        debug!(path = %key.display(), "reloading changed file");
        match self.load(&key, disk_modified) {
            Ok(entry) => {
                entries.insert(key, entry);
                Ok(true)
            }
            Err(e) => {
                entries.remove(&key);
                Err(e)
            }
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        let key = normalize_path(path).unwrap_or_else(|_| path.to_path_buf());
        self.inner.entries.lock().contains_key(&key)
    }

    /// Freshness token of the cached entry, if any.
    pub fn modified(&self, path: &Path) -> Option<DateTime<Utc>> {
        let key = normalize_path(path).ok()?;
        self.inner.entries.lock().get(&key).map(|e| e.modified)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fresh_entry<'a>(
        &self,
        entries: &'a mut HashMap<PathBuf, CacheEntry>,
        key: &Path,
    ) -> Result<&'a mut CacheEntry> {
        let disk_modified = match modified_at(key) {
            Ok(modified) => modified,
            Err(e) => {
                entries.remove(key);
                return Err(e);
            }
        };

        let stale = match entries.get(key) {
            None => {
                trace!(path = %key.display(), "loading document");
                true
            }
            Some(entry) if entry.modified != disk_modified => {
                debug!(
                    path = %key.display(),
                    cached = %entry.modified,
                    disk = %disk_modified,
                    "cached document is stale"
                );
                true
            }
            Some(_) => false,
        };

        if stale {
            match self.load(key, disk_modified) {
                Ok(entry) => {
                    entries.insert(key.to_path_buf(), entry);
                }
                Err(e) => {
                    entries.remove(key);
                    return Err(e);
                }
            }
        }

        entries
            .get_mut(key)
            .ok_or_else(|| StoreError::NotCached(key.to_path_buf()))
    }

    fn load(&self, key: &Path, modified: DateTime<Utc>) -> Result<CacheEntry> {
        let bytes = fs::read(key)?;
        let document = self.inner.codec.parse(&bytes)?;
        Ok(CacheEntry {
            document,
            modified,
            path: key.to_path_buf(),
        })
    }
}

/// Canonical path when the file exists. For a missing file the parent is
/// canonicalized instead, so a deleted file keeps the key it was cached under.
pub fn normalize_path(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(StoreError::Validation("path is empty".to_string()));
    }
    if let Ok(canonical) = fs::canonicalize(path) {
        return Ok(canonical);
    }
    let absolute = std::path::absolute(path)?;
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => match fs::canonicalize(parent) {
            Ok(parent) => Ok(parent.join(name)),
            Err(_) => Ok(absolute),
        },
        _ => Ok(absolute),
    }
}

pub fn modified_at(path: &Path) -> Result<DateTime<Utc>> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(modified.into())
}

/// Make sure a fresh write leaves an mtime later than `previous`.
///
/// Two writes inside one filesystem clock tick get the same mtime, and a
/// reader holding the older token would miss the second one. Nudging the mtime
/// forward keeps tokens unique across writers that hold the process lock.
fn advance_mtime(path: &Path, previous: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let modified = modified_at(path)?;
    if modified > previous {
        return Ok(modified);
    }

    // Coarse filesystems round small steps away, so try bigger ones.
    for step in [
        TimeDelta::milliseconds(1),
        TimeDelta::seconds(1),
        TimeDelta::seconds(2),
    ] {
        let file = fs::File::options().write(true).open(path)?;
        file.set_modified(SystemTime::from(previous + step))?;
        let modified = modified_at(path)?;
        if modified > previous {
            return Ok(modified);
        }
    }
    modified_at(path)
}

/// Write to a temp file in the same directory, then rename over the target.
fn atomic_write(target: &Path, bytes: &[u8]) -> Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("store");
    let tmp_path = dir.join(format!(".{}-{}.tmp", name, Uuid::new_v4()));
    fs::write(&tmp_path, bytes)?;
    if let Err(e) = fs::rename(&tmp_path, target) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

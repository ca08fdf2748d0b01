//! Filesystem watcher that keeps the cache ahead of external writers.
//!
//! The cache already detects stale files on access by comparing mtimes. The
//! watcher adds a push path on top for one directory: when a cached file
//! changes it is reloaded right away, and when it disappears its entry is
//! dropped. Files outside the watched directory rely on the on-access check
//! alone.
//!
//! ```text
//! notify::RecommendedWatcher ──> FileEvent ──> ExtensionFilter ──> CacheStore
//!        (notify thread)                                      (shared mutex)
//! ```

use super::cache::CacheStore;
use crate::error::Result;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, trace};

/// Filesystem change relevant to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

impl FileEvent {
    /// Translate a raw notify event. Access and unknown events map to nothing.
    pub fn from_notify(event: &Event) -> Vec<FileEvent> {
        let paths = event.paths.iter().cloned();
        match &event.kind {
            EventKind::Create(_) => paths.map(FileEvent::Created).collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
                vec![FileEvent::Renamed {
                    from: event.paths[0].clone(),
                    to: event.paths[1].clone(),
                }]
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                paths.map(FileEvent::Deleted).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                paths.map(FileEvent::Created).collect()
            }
            EventKind::Modify(ModifyKind::Name(_)) => paths
                .map(|path| {
                    if path.exists() {
                        FileEvent::Modified(path)
                    } else {
                        FileEvent::Deleted(path)
                    }
                })
                .collect(),
            EventKind::Modify(_) => paths.map(FileEvent::Modified).collect(),
            EventKind::Remove(_) => paths.map(FileEvent::Deleted).collect(),
            _ => Vec::new(),
        }
    }
}

/// Accepts paths with the store's file extension, ignoring case.
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    ext: String,
}

impl ExtensionFilter {
    pub fn new(ext: &str) -> Self {
        Self {
            ext: ext.trim_start_matches('.').to_lowercase(),
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.to_lowercase() == self.ext)
    }
}

/// Applies [`FileEvent`]s to a [`CacheStore`].
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: CacheStore,
    filter: ExtensionFilter,
}

impl CacheInvalidator {
    pub fn new(cache: CacheStore, filter: ExtensionFilter) -> Self {
        Self { cache, filter }
    }

    pub fn handle(&self, event: &FileEvent) {
        match event {
            FileEvent::Created(path) | FileEvent::Modified(path) => self.refresh(path),
            FileEvent::Deleted(path) => self.drop_entry(path),
            FileEvent::Renamed { from, to } => {
                self.drop_entry(from);
                self.refresh(to);
            }
        }
    }

    fn refresh(&self, path: &Path) {
        if !self.filter.matches(path) {
            return;
        }
        match self.cache.refresh_if_stale(path) {
            Ok(true) => debug!(path = %path.display(), "reloaded after external change"),
            Ok(false) => {}
            Err(e) => debug!(path = %path.display(), error = %e, "dropped unreadable file from cache"),
        }
    }

    fn drop_entry(&self, path: &Path) {
        if !self.filter.matches(path) {
            return;
        }
        if self.cache.invalidate(path) {
            debug!(path = %path.display(), "file removed, cache entry dropped");
        }
    }
}

/// Running watcher. Watching stops when this is dropped.
pub struct ChangeWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl ChangeWatcher {
    pub fn start(
        root: &Path,
        recursive: bool,
        filter: ExtensionFilter,
        cache: CacheStore,
    ) -> Result<Self> {
        let root = fs::canonicalize(root)?;
        let invalidator = CacheInvalidator::new(cache, filter);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in FileEvent::from_notify(&event) {
                    trace!(?change, "file event");
                    invalidator.handle(&change);
                }
            }
            Err(e) => error!(error = %e, "file watcher error"),
        })?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&root, mode)?;
        debug!(root = %root.display(), recursive, "watching for external changes");

        Ok(Self {
            root,
            _watcher: watcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::IniCodec;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant, SystemTime};
    use tempfile::tempdir;

    fn cache() -> CacheStore {
        CacheStore::new(Arc::new(IniCodec::new()))
    }

    fn advance_mtime(path: &Path) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
    }

    #[test]
    fn test_from_notify_maps_kinds() {
        let p = PathBuf::from("/cfg/app.ini");
        let q = PathBuf::from("/cfg/new.ini");

        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(p.clone());
        assert_eq!(FileEvent::from_notify(&create), vec![FileEvent::Created(p.clone())]);

        let modify = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(p.clone());
        assert_eq!(FileEvent::from_notify(&modify), vec![FileEvent::Modified(p.clone())]);

        let remove = Event::new(EventKind::Remove(RemoveKind::File)).add_path(p.clone());
        assert_eq!(FileEvent::from_notify(&remove), vec![FileEvent::Deleted(p.clone())]);

        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(p.clone())
            .add_path(q.clone());
        assert_eq!(
            FileEvent::from_notify(&rename),
            vec![FileEvent::Renamed { from: p.clone(), to: q }]
        );

        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any)).add_path(p);
        assert!(FileEvent::from_notify(&access).is_empty());
    }

    #[test]
    fn test_extension_filter() {
        let filter = ExtensionFilter::new(".ini");
        assert!(filter.matches(Path::new("/a/b.ini")));
        assert!(filter.matches(Path::new("/a/B.INI")));
        assert!(!filter.matches(Path::new("/a/.b.ini-123.tmp")));
        assert!(!filter.matches(Path::new("/a/noext")));
    }

    #[test]
    fn test_delete_event_drops_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.ini");
        fs::write(&path, "[A]\nx=1\n").unwrap();
        let cache = cache();
        cache.get(&path).unwrap();

        let invalidator = CacheInvalidator::new(cache.clone(), ExtensionFilter::new(".ini"));
        fs::remove_file(&path).unwrap();
        invalidator.handle(&FileEvent::Deleted(path.clone()));

        assert!(!cache.contains(&path));
    }

    #[test]
    fn test_modify_event_reloads_cached_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.ini");
        fs::write(&path, "[A]\nx=1\n").unwrap();
        let cache = cache();
        cache.get(&path).unwrap();

        fs::write(&path, "[A]\nx=2\n").unwrap();
        advance_mtime(&path);
        let invalidator = CacheInvalidator::new(cache.clone(), ExtensionFilter::new("ini"));
        invalidator.handle(&FileEvent::Modified(path.clone()));

        assert_eq!(
            cache.modified(&path),
            Some(crate::store::cache::modified_at(&path).unwrap())
        );
        assert_eq!(cache.get(&path).unwrap().get_value("A", "x"), Some("2"));
    }

    #[test]
    fn test_events_for_uncached_or_foreign_files_are_ignored() {
        let dir = tempdir().unwrap();
        let ini = dir.path().join("other.ini");
        let txt = dir.path().join("notes.txt");
        fs::write(&ini, "[A]\n").unwrap();
        fs::write(&txt, "hello").unwrap();
        let cache = cache();

        let invalidator = CacheInvalidator::new(cache.clone(), ExtensionFilter::new(".ini"));
        invalidator.handle(&FileEvent::Created(ini));
        invalidator.handle(&FileEvent::Modified(txt));

        assert!(cache.is_empty());
    }

    #[test]
    fn test_rename_drops_source() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("old.ini");
        let to = dir.path().join("new.ini");
        fs::write(&from, "[A]\n").unwrap();
        let cache = cache();
        cache.get(&from).unwrap();

        fs::rename(&from, &to).unwrap();
        let invalidator = CacheInvalidator::new(cache.clone(), ExtensionFilter::new(".ini"));
        invalidator.handle(&FileEvent::Renamed {
            from: from.clone(),
            to: to.clone(),
        });

        assert!(!cache.contains(&from));
        assert!(!cache.contains(&to));
    }

    #[test]
    fn test_live_watcher_drops_deleted_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.ini");
        fs::write(&path, "[A]\nx=1\n").unwrap();
        let cache = cache();
        cache.get(&path).unwrap();

        let watcher = ChangeWatcher::start(
            dir.path(),
            false,
            ExtensionFilter::new(".ini"),
            cache.clone(),
        )
        .unwrap();
        assert_eq!(watcher.root(), fs::canonicalize(dir.path()).unwrap());

        fs::remove_file(&path).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while cache.contains(&path) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(!cache.contains(&path));
    }
}

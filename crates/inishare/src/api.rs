//! # API Facade
//!
//! [`IniStore`] is the single entry point for reading and writing store files.
//! It composes the section resolver, the process lock and the cache:
//!
//! ```text
//! validate ─> acquire lock ─> bootstrap file ─> resolve section
//!          ─> read / update cache ─> write if changed ─> release lock
//! ```
//!
//! ## Errors Stay Inside
//!
//! Internally everything returns [`crate::error::Result`]. The public methods
//! never return errors: failures are logged and turned into `false` (writes),
//! the caller's default (reads) or an empty list (listings).
//!
//! ## Reads Write Defaults
//!
//! [`IniStore::get`] on a missing key stores the default it was given and
//! returns it. The first reader of a key therefore decides its value for every
//! later reader.
//!
//! ## Instances
//!
//! A store is an ordinary value with its own cache. Two stores in one process
//! behave like two processes: they share only the files and the lock.

use crate::codec::{Codec, IniCodec};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::sections::{Resolve, SectionResolver};
use crate::store::cache::{normalize_path, CacheStore};
use crate::store::lock::ProcessLock;
use crate::store::watcher::{ChangeWatcher, ExtensionFilter};
use crate::value::{FromIni, ToIni};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

pub struct IniStore {
    config: StoreConfig,
    cache: CacheStore,
    lock: ProcessLock,
    resolver: SectionResolver,
    blacklist: Vec<PathBuf>,
    watcher: Option<ChangeWatcher>,
}

impl IniStore {
    pub fn new(config: StoreConfig) -> Self {
        let codec = IniCodec::new().with_bom(config.write_bom);
        Self::with_codec(config, Arc::new(codec))
    }

    /// Build a store with a custom file format.
    ///
    /// A watcher that fails to start is logged; the store then relies on the
    /// on-access mtime check alone.
    pub fn with_codec(config: StoreConfig, codec: Arc<dyn Codec>) -> Self {
        let cache = CacheStore::new(codec);
        let lock = ProcessLock::from_config(&config);
        let resolver = SectionResolver::from_config(&config);
        let blacklist = config
            .smart_section_blacklist
            .iter()
            .filter_map(|p| normalize_path(p).ok())
            .collect();

        let watcher = config.watch_dir.as_deref().and_then(|dir| {
            match ChangeWatcher::start(
                dir,
                config.watch_recursive,
                ExtensionFilter::new(&config.file_ext()),
                cache.clone(),
            ) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    error!(dir = %dir.display(), error = %e, "failed to start file watcher");
                    None
                }
            }
        });

        Self {
            config,
            cache,
            lock,
            resolver,
            blacklist,
            watcher,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Store `value` under `key` in the section `section` resolves to.
    pub fn set<V: ToIni>(&self, path: impl AsRef<Path>, section: &str, key: &str, value: V) -> bool {
        self.set_with(path, section, key, value, Resolve::Smart)
    }

    pub fn set_with<V: ToIni>(
        &self,
        path: impl AsRef<Path>,
        section: &str,
        key: &str,
        value: V,
        mode: Resolve,
    ) -> bool {
        let path = path.as_ref();
        let text = value.to_ini();
        debug!(path = %path.display(), section, key, value = %text, "set");

        match self.try_set(path, section, key, &text, mode) {
            Ok(()) => true,
            Err(e) => {
                error!(path = %path.display(), section, key, error = %e, "set failed");
                false
            }
        }
    }

    /// Read `key`, storing and returning `default` when it is missing.
    ///
    /// Stored text that does not convert to `T` also yields `default`.
    pub fn get<T: FromIni>(&self, path: impl AsRef<Path>, section: &str, key: &str, default: T) -> T {
        self.get_with(path, section, key, default, Resolve::Smart)
    }

    pub fn get_with<T: FromIni>(
        &self,
        path: impl AsRef<Path>,
        section: &str,
        key: &str,
        default: T,
        mode: Resolve,
    ) -> T {
        let path = path.as_ref();
        debug!(path = %path.display(), section, key, "get");

        match self.try_get(path, section, key, &default, mode) {
            Ok(value) => value,
            Err(e) => {
                error!(path = %path.display(), section, key, error = %e, "get failed, using default");
                default
            }
        }
    }

    /// Remove the section named exactly `section`. No name resolution applies.
    pub fn delete_section(&self, path: impl AsRef<Path>, section: &str) -> bool {
        let path = path.as_ref();
        if section.trim().is_empty() || !path.is_file() {
            return false;
        }

        let mut token = self.lock.acquire();
        let result = self.locked_delete(path, section);
        self.lock.release(&mut token);

        match result {
            Ok(removed) => removed,
            Err(e) => {
                error!(path = %path.display(), section, error = %e, "delete section failed");
                false
            }
        }
    }

    pub fn list_sections(&self, path: impl AsRef<Path>) -> Vec<String> {
        let path = path.as_ref();
        self.locked_read(path, |store| store.cache.read(path, |doc| doc.section_names()))
    }

    /// Keys of the section named exactly `section`.
    pub fn list_keys(&self, path: impl AsRef<Path>, section: &str) -> Vec<String> {
        let path = path.as_ref();
        self.locked_read(path, |store| store.cache.read(path, |doc| doc.keys(section)))
    }

    /// Forget the cached copy of `path`.
    pub fn invalidate(&self, path: impl AsRef<Path>) -> bool {
        self.cache.invalidate(path.as_ref())
    }

    fn try_set(&self, path: &Path, section: &str, key: &str, text: &str, mode: Resolve) -> Result<()> {
        validate_path(path)?;
        validate_section(section)?;
        validate_key(key)?;
        validate_value(text)?;

        let mut token = self.lock.acquire();
        let result = self
            .prepare_file(path)
            .and_then(|()| self.resolve_section(path, section, mode))
            .and_then(|name| self.write_value(path, &name, key, text));
        self.lock.release(&mut token);
        result
    }

    fn try_get<T: FromIni>(
        &self,
        path: &Path,
        section: &str,
        key: &str,
        default: &T,
        mode: Resolve,
    ) -> Result<T> {
        validate_path(path)?;
        validate_section(section)?;
        validate_key(key)?;

        let mut token = self.lock.acquire();
        let result = self.locked_get(path, section, key, default, mode);
        self.lock.release(&mut token);
        result
    }

    fn locked_get<T: FromIni>(
        &self,
        path: &Path,
        section: &str,
        key: &str,
        default: &T,
        mode: Resolve,
    ) -> Result<T> {
        self.prepare_file(path)?;
        let name = self.resolve_section(path, section, mode)?;
        let stored = self
            .cache
            .read(path, |doc| doc.get_value(&name, key).map(str::to_string))?;

        let Some(text) = stored else {
            debug!(path = %path.display(), section = %name, key, "key missing, storing default");
            let default_text = default.to_ini();
            // Already under the lock, so write directly rather than through `set`.
            if let Err(e) = validate_value(&default_text)
                .and_then(|()| self.write_value(path, &name, key, &default_text))
            {
                warn!(path = %path.display(), section = %name, key, error = %e, "could not store default");
            }
            return Ok(default.clone());
        };

        match T::from_ini_or(&text, default) {
            Ok(value) => {
                trace!(path = %path.display(), section = %name, key, value = %text, "get result");
                Ok(value)
            }
            Err(e) => {
                warn!(path = %path.display(), section = %name, key, error = %e, "conversion failed, using default");
                Ok(default.clone())
            }
        }
    }

    fn locked_delete(&self, path: &Path, section: &str) -> Result<bool> {
        let removed = self.cache.update(path, |doc| doc.remove_section(section))?;
        if removed {
            self.persist(path)?;
            debug!(path = %path.display(), section, "section deleted");
        } else {
            debug!(path = %path.display(), section, "section not found, nothing deleted");
        }
        Ok(removed)
    }

    fn locked_read(&self, path: &Path, f: impl FnOnce(&Self) -> Result<Vec<String>>) -> Vec<String> {
        if let Err(e) = validate_path(path) {
            error!(error = %e, "listing failed");
            return Vec::new();
        }
        if !path.is_file() {
            return Vec::new();
        }

        let mut token = self.lock.acquire();
        let result = f(self);
        self.lock.release(&mut token);

        result.unwrap_or_else(|e| {
            error!(path = %path.display(), error = %e, "listing failed");
            Vec::new()
        })
    }

    /// Set one value in the cached document and persist it when it changed.
    /// Caller holds the lock.
    fn write_value(&self, path: &Path, section: &str, key: &str, text: &str) -> Result<()> {
        let changed = self
            .cache
            .update(path, |doc| doc.set_value(section, key, text))?;
        if !changed {
            trace!(path = %path.display(), section, key, "value unchanged, skipping write");
            return Ok(());
        }
        self.persist(path)
    }

    fn persist(&self, path: &Path) -> Result<()> {
        if let Err(e) = self.cache.write(path) {
            // The in-memory edit never reached disk; reload next time.
            self.cache.invalidate(path);
            return Err(e);
        }
        Ok(())
    }

    fn resolve_section(&self, path: &Path, section: &str, mode: Resolve) -> Result<String> {
        let mode = if self.is_blacklisted(path) {
            Resolve::Literal
        } else {
            mode
        };
        if mode == Resolve::Literal || !self.resolver.is_enabled() {
            return Ok(section.to_string());
        }

        let resolution = self
            .cache
            .read(path, |doc| self.resolver.resolve(section, doc, mode))?;
        trace!(section, resolved = %resolution.name, "section resolved");
        Ok(resolution.name)
    }

    fn is_blacklisted(&self, path: &Path) -> bool {
        if self.blacklist.is_empty() {
            return false;
        }
        normalize_path(path).is_ok_and(|p| self.blacklist.contains(&p))
    }

    /// Create an empty file when it is missing and bootstrapping is on.
    fn prepare_file(&self, path: &Path) -> Result<()> {
        if path.is_file() || !self.config.create_missing {
            return Ok(());
        }
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(_) => {
                // A copy cached before the file vanished may share its mtime.
                self.cache.invalidate(path);
                debug!(path = %path.display(), "created empty store file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(StoreError::Validation("path is empty".to_string()));
    }
    Ok(())
}

/// The header parser trims the name and stops at the first `]`.
fn validate_section(section: &str) -> Result<()> {
    if section.contains(&['\n', '\r', ']'][..]) {
        return Err(StoreError::Validation(format!(
            "section {:?} contains ']' or a line break",
            section
        )));
    }
    if section.trim() != section {
        return Err(StoreError::Validation(format!(
            "section {:?} has surrounding whitespace",
            section
        )));
    }
    Ok(())
}

/// Keys must survive a round trip through the file: the codec reads a line
/// starting with a non-alphanumeric character as a comment.
fn validate_key(key: &str) -> Result<()> {
    let Some(first) = key.chars().next() else {
        return Err(StoreError::Validation("key is empty".to_string()));
    };
    if !first.is_alphanumeric() {
        return Err(StoreError::Validation(format!(
            "key {:?} must start with a letter or digit",
            key
        )));
    }
    if key.contains(&['=', '\n', '\r'][..]) {
        return Err(StoreError::Validation(format!(
            "key {:?} contains '=' or a line break",
            key
        )));
    }
    if key.trim_end() != key {
        return Err(StoreError::Validation(format!(
            "key {:?} has trailing whitespace",
            key
        )));
    }
    Ok(())
}

/// Values are stored unquoted, so anything the parser would cut off on the
/// way back is refused: `#`, a `;` after whitespace, surrounding whitespace.
fn validate_value(text: &str) -> Result<()> {
    if text.contains(&['\n', '\r'][..]) {
        return Err(StoreError::Validation(
            "value contains a line break".to_string(),
        ));
    }
    if text.trim() != text {
        return Err(StoreError::Validation(format!(
            "value {:?} has surrounding whitespace",
            text
        )));
    }
    if text.contains('#') || starts_inline_comment(text) {
        return Err(StoreError::Validation(format!(
            "value {:?} would be read back as a comment",
            text
        )));
    }
    Ok(())
}

fn starts_inline_comment(text: &str) -> bool {
    text.chars()
        .zip(text.chars().skip(1))
        .any(|(prev, ch)| prev.is_whitespace() && ch == ';')
}

//! Systemwide advisory lock.
//!
//! One lock file serializes every operation of every participating process,
//! whatever file the operation targets. The lock is an OS advisory lock
//! (`flock` on Unix, `LockFileEx` on Windows) taken through `fs4`; the OS
//! drops it when the holding process exits or crashes, so an abandoned lock
//! never blocks the others.
//!
//! Each acquisition opens its own handle on the lock file. Advisory locks
//! belong to the handle, so two threads of the same process exclude each other
//! exactly like two processes do.
//!
//! Acquisition has no timeout.

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use fs4::fs_std::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{error, trace};

#[derive(Debug, Clone)]
pub struct ProcessLock {
    path: PathBuf,
    enabled: bool,
}

impl ProcessLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            enabled: true,
        }
    }

    /// A lock whose operations do nothing and always succeed.
    pub fn disabled() -> Self {
        Self {
            path: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        if config.use_lock {
            Self::new(config.lock_path())
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the lock is held.
    ///
    /// A disabled lock returns an unheld token immediately.
    pub fn try_acquire(&self) -> Result<LockToken> {
        if !self.enabled {
            trace!("locking disabled, skipping lock");
            return Ok(LockToken::unheld());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Lock(format!(
                        "cannot create lock directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| {
                StoreError::Lock(format!(
                    "cannot open lock file {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        trace!(lock = %self.path.display(), "waiting for lock");
        FileExt::lock_exclusive(&file).map_err(|e| {
            StoreError::Lock(format!("cannot lock {}: {}", self.path.display(), e))
        })?;
        trace!(lock = %self.path.display(), "lock acquired");

        Ok(LockToken {
            file: Some(file),
            held: true,
        })
    }

    /// Like [`ProcessLock::try_acquire`], but a failure is logged and the
    /// caller carries on without the lock.
    pub fn acquire(&self) -> LockToken {
        match self.try_acquire() {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "failed to acquire store lock, continuing unlocked");
                LockToken::unheld()
            }
        }
    }

    pub fn release(&self, token: &mut LockToken) {
        token.release();
    }
}

/// Proof of one acquisition. Dropping the token releases the lock.
#[derive(Debug)]
pub struct LockToken {
    file: Option<File>,
    held: bool,
}

impl LockToken {
    fn unheld() -> Self {
        Self {
            file: None,
            held: false,
        }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Release the lock if this token holds it. Safe to call repeatedly.
    pub fn release(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                // Closing the handle below still drops the lock.
                error!(error = %e, "failed to unlock store lock");
            }
            trace!("lock released");
        }
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        self.release();
    }
}

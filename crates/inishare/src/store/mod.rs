//! # Storage Layer
//!
//! Three pieces keep many processes working on the same files consistent:
//!
//! 1. [`cache::CacheStore`]: parsed documents keyed by path, reloaded whenever
//!    the file's mtime differs from the one recorded at load time.
//! 2. [`watcher::ChangeWatcher`]: pushes external changes in one directory into
//!    the cache as they happen.
//! 3. [`lock::ProcessLock`]: one systemwide advisory lock around every
//!    read-modify-write.
//!
//! ## Philosophy
//!
//! - **Files are Truth**: the cache is a copy. A newer mtime on disk always wins,
//!   even over in-memory edits that were not written yet.
//! - **Lazy Reconciliation**: staleness is checked on every access; the watcher
//!   only makes that check cheaper.
//! - **Atomic Writes**: documents are written to a temp file and renamed over the
//!   target, so readers never see half a file.
//!
//! ## Lock Scope
//!
//! The lock is not per file. Every operation on every file of every
//! participating process goes through the same lock, which bounds throughput
//! but makes cross-file ordering trivial.

pub mod cache;
pub mod lock;
pub mod watcher;

pub use cache::{CacheEntry, CacheStore};
pub use lock::{LockToken, ProcessLock};
pub use watcher::{ChangeWatcher, ExtensionFilter, FileEvent};

//! # Configuration
//!
//! Store settings are loaded with [`confique`] from environment variables, an
//! optional TOML file and compiled defaults.
//!
//! ## Resolution Order
//!
//! 1. **Environment variables**: `INISHARE_USE_LOCK`, `INISHARE_LOCK_DIR`, etc.
//! 2. **Config file**: `inishare.toml` in the OS config directory (via `directories`).
//! 3. **Compiled defaults**: `#[config(default = ...)]` below.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `use_lock` | `true` | Serialize every operation through the systemwide lock |
//! | `lock_name` | `inishare.lock` | Name of the lock file shared by all processes |
//! | `lock_dir` | temp dir | Directory holding the lock file |
//! | `smart_sections` | `true` | Automatic section namespacing |
//! | `namespace_root` | `Software\Shared` | Prefix for namespaced sections |
//! | `well_known_sections` | `["General"]` | Sections that always prefer their namespaced form |
//! | `smart_section_blacklist` | `[]` | Files that never use namespacing |
//! | `file_ext` | `.ini` | Extension the change watcher reacts to |
//! | `watch_dir` | unset | Directory observed for external changes |
//! | `watch_recursive` | `false` | Watch subdirectories too |
//! | `write_bom` | `false` | Write files as UTF-8 with BOM |
//! | `create_missing` | `true` | Create missing files on first access |
//!
//! Every process sharing a set of files must agree on `lock_dir` and
//! `lock_name`, otherwise they do not exclude each other.

use crate::error::Result;
use confique::Config;
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "inishare.toml";

static PROJECT_DIRS: Lazy<Option<ProjectDirs>> = Lazy::new(|| ProjectDirs::from("", "", "inishare"));

/// Configuration for an [`crate::api::IniStore`].
#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Use the systemwide advisory lock. Turn off only for single-process deployments.
    #[config(default = true, env = "INISHARE_USE_LOCK")]
    pub use_lock: bool,

    /// Name of the lock file. One lock covers every file of the store.
    #[config(default = "inishare.lock", env = "INISHARE_LOCK_NAME")]
    pub lock_name: String,

    /// Directory holding the lock file. Defaults to the system temp dir.
    #[config(env = "INISHARE_LOCK_DIR")]
    pub lock_dir: Option<PathBuf>,

    /// Automatic section namespacing.
    #[config(default = true, env = "INISHARE_SMART_SECTIONS")]
    pub smart_sections: bool,

    /// Prefix prepended to namespaced section names.
    #[config(default = "Software\\Shared", env = "INISHARE_NAMESPACE_ROOT")]
    pub namespace_root: String,

    /// Section names that always prefer their namespaced form.
    #[config(default = ["General"])]
    pub well_known_sections: Vec<String>,

    /// Files for which namespacing is always disabled.
    #[config(default = [])]
    pub smart_section_blacklist: Vec<PathBuf>,

    /// Extension of store files (e.g. ".ini", ".cfg").
    #[config(default = ".ini", env = "INISHARE_FILE_EXT")]
    pub file_ext: String,

    /// Directory observed by the change watcher. No watcher when absent.
    #[config(env = "INISHARE_WATCH_DIR")]
    pub watch_dir: Option<PathBuf>,

    #[config(default = false, env = "INISHARE_WATCH_RECURSIVE")]
    pub watch_recursive: bool,

    /// Write a UTF-8 BOM at the start of every file.
    #[config(default = false, env = "INISHARE_WRITE_BOM")]
    pub write_bom: bool,

    /// Create missing files (empty) on first access.
    #[config(default = true, env = "INISHARE_CREATE_MISSING")]
    pub create_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            use_lock: true,
            lock_name: "inishare.lock".to_string(),
            lock_dir: None,
            smart_sections: true,
            namespace_root: "Software\\Shared".to_string(),
            well_known_sections: vec!["General".to_string()],
            smart_section_blacklist: Vec::new(),
            file_ext: ".ini".to_string(),
            watch_dir: None,
            watch_recursive: false,
            write_bom: false,
            create_missing: true,
        }
    }
}

impl StoreConfig {
    /// Load from the environment and the global `inishare.toml`, if any.
    pub fn load() -> Result<Self> {
        let mut builder = Self::builder().env();
        if let Some(path) = Self::global_config_path() {
            builder = builder.file(path);
        }
        Ok(builder.load()?)
    }

    /// Load from the environment and an explicit TOML file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::builder().env().file(path.as_ref()).load()?)
    }

    /// Location of the global config file for this OS.
    pub fn global_config_path() -> Option<PathBuf> {
        PROJECT_DIRS
            .as_ref()
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Get the file extension, normalized to start with a dot.
    pub fn file_ext(&self) -> String {
        if self.file_ext.starts_with('.') {
            self.file_ext.clone()
        } else {
            format!(".{}", self.file_ext)
        }
    }

    /// Full path of the lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.lock_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
            .join(&self.lock_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert!(config.use_lock);
        assert!(config.smart_sections);
        assert_eq!(config.namespace_root, "Software\\Shared");
        assert_eq!(config.well_known_sections, vec!["General"]);
        assert_eq!(config.file_ext(), ".ini");
        assert!(config.watch_dir.is_none());
    }

    #[test]
    fn test_file_ext_normalization_without_dot() {
        let config = StoreConfig {
            file_ext: "cfg".to_string(),
            ..Default::default()
        };
        assert_eq!(config.file_ext(), ".cfg");
    }

    #[test]
    fn test_lock_path_uses_lock_dir() {
        let config = StoreConfig {
            lock_dir: Some(PathBuf::from("/var/lock/app")),
            lock_name: "shared.lock".to_string(),
            ..Default::default()
        };
        assert_eq!(config.lock_path(), PathBuf::from("/var/lock/app/shared.lock"));
    }

    #[test]
    fn test_lock_path_defaults_to_temp_dir() {
        let config = StoreConfig::default();
        assert_eq!(
            config.lock_path(),
            std::env::temp_dir().join("inishare.lock")
        );
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let overrides = toml::toml! {
            namespace_root = "Root"
            well_known_sections = ["General", "Acquisition"]
            watch_recursive = true
        };
        std::fs::write(&path, overrides.to_string()).unwrap();

        let config = StoreConfig::load_from(&path).unwrap();
        assert_eq!(config.namespace_root, "Root");
        assert_eq!(config.well_known_sections, vec!["General", "Acquisition"]);
        assert!(config.watch_recursive);
        assert_eq!(config.lock_name, "inishare.lock");
    }
}

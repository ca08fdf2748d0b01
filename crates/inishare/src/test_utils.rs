use crate::api::IniStore;
use crate::config::StoreConfig;
use std::path::PathBuf;
use tempfile::TempDir;

/// Isolated store over a temp dir. The lock file lives in the same temp dir,
/// so tests never contend with each other or with real deployments.
pub struct TestEnv {
    // We keep _temp_dir to ensure the directory is not dropped until the test is done
    pub _temp_dir: TempDir,
    pub store: IniStore,
    pub root: PathBuf,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = temp_dir
            .path()
            .canonicalize()
            .expect("failed to resolve temp dir");
        let store = IniStore::new(Self::config_for(&root));
        Self {
            _temp_dir: temp_dir,
            store,
            root,
        }
    }

    /// Config shared by every store of this environment.
    pub fn config(&self) -> StoreConfig {
        Self::config_for(&self.root)
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// A second, independent store over the same files and lock.
    pub fn other_store(&self) -> IniStore {
        IniStore::new(self.config())
    }

    fn config_for(root: &std::path::Path) -> StoreConfig {
        StoreConfig {
            lock_dir: Some(root.to_path_buf()),
            namespace_root: "Root".to_string(),
            well_known_sections: vec!["General".to_string()],
            ..Default::default()
        }
    }
}

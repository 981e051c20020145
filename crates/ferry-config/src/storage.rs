//! On-disk locations for engine state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

fn default_db_path() -> String {
    ".ferry/ferry.db".to_string()
}

fn default_lock_path() -> String {
    ".ferry/engine.lock".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// libSQL database file. Relative paths resolve against the project root.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Pid lock file held while the engine runs.
    #[serde(default = "default_lock_path")]
    pub lock_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            lock_path: default_lock_path(),
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub fn db_path_in(&self, project_root: &Path) -> PathBuf {
        resolve(project_root, &self.db_path)
    }

    #[must_use]
    pub fn lock_path_in(&self, project_root: &Path) -> PathBuf {
        resolve(project_root, &self.lock_path)
    }
}

fn resolve(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

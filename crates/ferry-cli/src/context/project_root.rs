use std::path::{Path, PathBuf};

/// Per-project state directory (database, lock file, config).
pub const STATE_DIR: &str = ".ferry";

/// Walk upwards from `start` until a `.ferry` directory is found.
#[must_use]
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(STATE_DIR).is_dir() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::find_project_root;

    #[test]
    fn finds_project_root_in_current_directory() {
        let temp = TempDir::new().expect("tempdir should create");
        std::fs::create_dir(temp.path().join(".ferry")).expect(".ferry should create");

        let found = find_project_root(temp.path());
        assert_eq!(found.as_deref(), Some(temp.path()));
    }

    #[test]
    fn finds_project_root_in_ancestor() {
        let temp = TempDir::new().expect("tempdir should create");
        std::fs::create_dir(temp.path().join(".ferry")).expect(".ferry should create");
        std::fs::create_dir_all(temp.path().join("mappings/contacts")).expect("dirs should create");

        let found = find_project_root(&temp.path().join("mappings/contacts"));
        assert_eq!(found.as_deref(), Some(temp.path()));
    }

    #[test]
    fn a_file_named_like_the_state_dir_does_not_count() {
        let temp = TempDir::new().expect("tempdir should create");
        std::fs::create_dir_all(temp.path().join("a")).expect("dirs should create");
        std::fs::write(temp.path().join("a/.ferry"), "").expect("file should write");

        let found = find_project_root(&temp.path().join("a"));
        assert_ne!(found.as_deref(), Some(temp.path().join("a").as_path()));
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::StorageConfig;

use super::error::StoreError;
use super::tables::{Persistence, TableStore, Tables};

/// Writes the tables as one JSON document after every mutation.
///
/// ```text
/// project/.testwatch/
///   store.json          # projects, suites, testers, tests, runs, queue
/// ```
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the tables back, or empty tables if nothing was written yet.
    fn load(&self) -> Result<Tables, StoreError> {
        if !self.path.exists() {
            return Ok(Tables::default());
        }

        let json = fs::read_to_string(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Ensures the parent directory exists.
    fn ensure_parent_dir(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
            }
        }
        Ok(())
    }
}

impl Persistence for JsonFile {
    fn save(&self, tables: &Tables) -> Result<(), StoreError> {
        self.ensure_parent_dir()?;

        let json = serde_json::to_string_pretty(tables)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::io(&self.path, e))?;

        Ok(())
    }
}

/// Store persisted to a JSON file.
pub type FileStore = TableStore<JsonFile>;

impl FileStore {
    /// Opens the store at `path`, loading any previously written state.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let file = JsonFile::new(path);
        let tables = file.load()?;
        Ok(TableStore::with_tables(tables, file))
    }

    /// Opens the store at the location given by the storage configuration.
    pub fn with_config(config: &StorageConfig) -> Result<Self, StoreError> {
        Self::open(config.store_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewProject;
    use crate::store::Store;
    use tempfile::TempDir;

    #[test]
    fn test_state_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("store.json");

        let store = FileStore::open(&path).unwrap();
        let project = store
            .upsert_project(NewProject {
                name: "app".to_string(),
                path: temp.path().to_path_buf(),
                ..NewProject::default()
            })
            .unwrap();
        store.set_project_enabled(project.id, false).unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        let loaded = reopened.get_project(project.id).unwrap().unwrap();
        assert_eq!(loaded.name, "app");
        assert!(!loaded.enabled);
    }

    #[test]
    fn test_ids_keep_increasing_after_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");

        let store = FileStore::open(&path).unwrap();
        let first = store
            .upsert_project(NewProject {
                name: "a".to_string(),
                ..NewProject::default()
            })
            .unwrap();
        drop(store);

        let store = FileStore::open(&path).unwrap();
        let second = store
            .upsert_project(NewProject {
                name: "b".to_string(),
                ..NewProject::default()
            })
            .unwrap();
        assert!(second.id > first.id);
    }

    #[test]
    fn test_missing_file_opens_empty() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path().join("absent.json")).unwrap();
        assert!(store.list_projects().unwrap().is_empty());
    }
}

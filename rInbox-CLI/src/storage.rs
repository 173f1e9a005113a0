//! File-backed session storage for the CLI.

use rinbox::error::{Error, Result};
use rinbox::SessionStorage;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Stores every key in one JSON object on disk.
///
/// The file is rewritten on each change, which is fine for the handful of
/// keys the inbox keeps.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    data: RwLock<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open the storage file, starting empty if it is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable storage file {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        tracing::debug!("opened storage {} with {} keys", path.display(), data.len());

        Self {
            path,
            data: RwLock::new(data),
        }
    }

    /// Location of the storage file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, String>> {
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, String>> {
        self.data.write().unwrap_or_else(|e| e.into_inner())
    }

    fn flush(&self, data: &BTreeMap<String, String>) -> Result<()> {
        let content = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, content)
            .map_err(|e| Error::storage(format!("{}: {}", self.path.display(), e)))
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut data = self.write();
        data.insert(key.to_string(), value.to_string());
        self.flush(&data)
    }

    fn remove(&self, key: &str) {
        let mut data = self.write();
        if data.remove(key).is_some() {
            if let Err(e) = self.flush(&data) {
                tracing::warn!("failed to remove {}: {}", key, e);
            }
        }
    }

    fn clear(&self) {
        let mut data = self.write();
        data.clear();
        if let Err(e) = self.flush(&data) {
            tracing::warn!("failed to clear storage: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rinbox-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_values_survive_reopen() {
        let path = temp_path("reopen");
        let storage = FileStorage::open(&path);
        storage.set("inbox:a", "[1]").unwrap();
        storage.set("other", "x").unwrap();

        let reopened = FileStorage::open(&path);
        assert_eq!(reopened.get("inbox:a").as_deref(), Some("[1]"));
        assert_eq!(reopened.get("other").as_deref(), Some("x"));

        reopened.clear();
        assert!(FileStorage::open(&path).get("other").is_none());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_unreadable_file_starts_empty() {
        let path = temp_path("garbage");
        fs::write(&path, "not json").unwrap();
        let storage = FileStorage::open(&path);
        assert!(storage.get("anything").is_none());
        let _ = fs::remove_file(&path);
    }
}

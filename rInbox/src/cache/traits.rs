//! Durable storage trait definitions.

use crate::error::{Error, Result};

/// Trait for reload-durable key/value storage backends.
///
/// The inbox only ever stores small JSON documents here, so values are
/// plain strings.
pub trait SessionStorage: Send + Sync + std::fmt::Debug {
    /// Get a value by key.
    fn get(&self, key: &str) -> Option<String>;

    /// Set a value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value by key.
    fn remove(&self, key: &str);

    /// Clear all stored values.
    fn clear(&self);
}

/// Extension trait for storage with typed operations.
pub trait SessionStorageExt: SessionStorage {
    /// Get a JSON-deserialized value. Missing or malformed values are `None`.
    fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let data = self.get(key)?;
        serde_json::from_str(&data).ok()
    }

    /// Set a JSON-serialized value.
    fn set_json<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let data = serde_json::to_string(value).map_err(Error::Json)?;
        self.set(key, &data)
    }
}

// Blanket implementation
impl<T: SessionStorage + ?Sized> SessionStorageExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStorage;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct TestData {
        value: String,
    }

    #[test]
    fn test_storage_ext() {
        let storage = MemoryStorage::new();
        let key = "test";
        let value = TestData {
            value: "hello".into(),
        };

        storage.set_json(key, &value).unwrap();
        let result: Option<TestData> = storage.get_json(key);
        assert_eq!(result, Some(value));
    }

    #[test]
    fn test_get_json_malformed() {
        let storage = MemoryStorage::new();
        storage.set("bad", "{not json").unwrap();
        assert_eq!(storage.get_json::<TestData>("bad"), None);
    }
}

//! `window.localStorage` implementation for WebAssembly.

use super::{BoxFuture, SnapshotStore, StorageError, StorageResult};
use crate::codec::Snapshot;

/// Stores snapshot data URLs in the browser's local storage.
#[derive(Default)]
pub struct LocalStorageStore {
    /// Prefix prepended to every key.
    prefix: String,
}

impl LocalStorageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespace keys, e.g. per room.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    fn storage() -> StorageResult<web_sys::Storage> {
        let window = web_sys::window()
            .ok_or_else(|| StorageError::Unavailable("No window object".to_string()))?;
        window
            .local_storage()
            .map_err(|e| StorageError::Unavailable(format!("{:?}", e)))?
            .ok_or_else(|| StorageError::Unavailable("localStorage not available".to_string()))
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

impl SnapshotStore for LocalStorageStore {
    fn save(&self, key: &str, snapshot: &Snapshot) -> BoxFuture<'_, StorageResult<()>> {
        let key = self.full_key(key);
        let value = snapshot.as_str().to_string();
        Box::pin(async move {
            Self::storage()?
                .set_item(&key, &value)
                .map_err(|e| StorageError::Io(format!("Failed to write {}: {:?}", key, e)))
        })
    }

    fn load(&self, key: &str) -> BoxFuture<'_, StorageResult<Option<Snapshot>>> {
        let key = self.full_key(key);
        Box::pin(async move {
            let value = Self::storage()?
                .get_item(&key)
                .map_err(|e| StorageError::Io(format!("Failed to read {}: {:?}", key, e)))?;
            // An empty slot is treated like a missing one.
            Ok(value.filter(|v| !v.is_empty()).map(Snapshot::from_data_url))
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, StorageResult<()>> {
        let key = self.full_key(key);
        Box::pin(async move {
            Self::storage()?
                .remove_item(&key)
                .map_err(|e| StorageError::Io(format!("Failed to delete {}: {:?}", key, e)))
        })
    }
}

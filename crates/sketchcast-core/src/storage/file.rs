//! File-based storage implementation for native platforms.

use super::{BoxFuture, SnapshotStore, StorageError, StorageResult};
use crate::codec::{self, Snapshot};
use std::fs;
use std::path::PathBuf;

/// File-based storage for native platforms.
///
/// Stores each snapshot as a PNG file in a specified directory.
pub struct FileStore {
    /// Base directory for snapshot storage.
    base_path: PathBuf,
}

impl FileStore {
    /// Create a new file store with the given base directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                StorageError::Io(format!("Failed to create storage directory: {}", e))
            })?;
        }
        Ok(Self { base_path })
    }

    /// Create file storage in the default location.
    ///
    /// On Unix: `~/.local/share/sketchcast/snapshots/`
    /// On Windows: `%LOCALAPPDATA%\sketchcast\snapshots\`
    pub fn default_location() -> StorageResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Io("Could not determine home directory".to_string()))?;

        Self::new(base.join("sketchcast").join("snapshots"))
    }

    /// Get the file path for a key.
    fn snapshot_path(&self, key: &str) -> PathBuf {
        let safe_key: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_path.join(format!("{}.png", safe_key))
    }

    /// Get the base path.
    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }
}

impl SnapshotStore for FileStore {
    fn save(&self, key: &str, snapshot: &Snapshot) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.snapshot_path(key);
        let png = codec::png_bytes(snapshot).map_err(|e| StorageError::Serialization(e.to_string()));

        Box::pin(async move {
            let png = png?;
            fs::write(&path, png).map_err(|e| {
                StorageError::Io(format!("Failed to write {}: {}", path.display(), e))
            })
        })
    }

    fn load(&self, key: &str) -> BoxFuture<'_, StorageResult<Option<Snapshot>>> {
        let path = self.snapshot_path(key);

        Box::pin(async move {
            if !path.exists() {
                return Ok(None);
            }
            let png = fs::read(&path).map_err(|e| {
                StorageError::Io(format!("Failed to read {}: {}", path.display(), e))
            })?;
            Ok(Some(codec::from_png_bytes(&png)))
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.snapshot_path(key);

        Box::pin(async move {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    StorageError::Io(format!("Failed to delete {}: {}", path.display(), e))
                })?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DRAWING_KEY, block_on};
    use crate::surface::{PixelSurface, RasterSurface};
    use kurbo::Point;
    use tempfile::tempdir;

    fn drawn_snapshot() -> Snapshot {
        let mut surface = PixelSurface::new(32, 32);
        surface.stroke_segment(Point::new(2.0, 2.0), Point::new(30.0, 30.0), &Default::default());
        codec::encode(&surface).unwrap()
    }

    #[test]
    fn test_file_store_save_load() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        let snapshot = drawn_snapshot();

        block_on(store.save(DRAWING_KEY, &snapshot)).unwrap();
        assert!(dir.path().join("drawing.png").exists());

        let loaded = block_on(store.load(DRAWING_KEY)).unwrap();
        assert_eq!(loaded, Some(snapshot));
    }

    #[test]
    fn test_file_store_missing_key() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(block_on(store.load("nonexistent")).unwrap(), None);
    }

    #[test]
    fn test_file_store_rejects_clear_sentinel() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        let result = block_on(store.save(DRAWING_KEY, &Snapshot::clear()));
        assert!(matches!(result, Err(StorageError::Serialization(_))));
    }

    #[test]
    fn test_file_store_delete() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();

        block_on(store.save(DRAWING_KEY, &drawn_snapshot())).unwrap();
        block_on(store.delete(DRAWING_KEY)).unwrap();
        assert_eq!(block_on(store.load(DRAWING_KEY)).unwrap(), None);
    }

    #[test]
    fn test_file_store_sanitizes_key() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).unwrap();
        let snapshot = drawn_snapshot();

        block_on(store.save("../escape:attempt", &snapshot)).unwrap();
        assert!(dir.path().join("___escape_attempt.png").exists());
        let loaded = block_on(store.load("../escape:attempt")).unwrap();
        assert_eq!(loaded, Some(snapshot));
    }
}

//! Durable homes for built snapshots.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::VecError;
use crate::forest::Forest;
use crate::forest_io;

/// SnapshotStore persists the most recently published snapshot of one index.
///
/// `save` must either fully replace the previous snapshot or leave it
/// untouched; `load` returns whatever was last saved successfully.
pub trait SnapshotStore: Send + Sync {
    /// Return the last saved snapshot, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<Forest>, VecError>;

    /// Persist `forest`, replacing the previous snapshot.
    fn save(&self, forest: &Forest) -> Result<(), VecError>;
}

/// Stores the snapshot as a single file, replaced via write-to-temp and
/// rename so a crash mid-write never leaves a torn snapshot behind.
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<Forest>, VecError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.path).map_err(|e| VecError::Io(e.to_string()))?;
        forest_io::load(&mut file).map(Some)
    }

    fn save(&self, forest: &Forest) -> Result<(), VecError> {
        let persist_err = |e: std::io::Error| VecError::Persistence(e.to_string());

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(persist_err)?;
            }
        }

        let tmp = self.temp_path();
        let result = (|| {
            let mut file = File::create(&tmp).map_err(persist_err)?;
            forest_io::save(forest, &mut file)
                .map_err(|e| VecError::Persistence(e.to_string()))?;
            file.flush().map_err(persist_err)?;
            file.sync_all().map_err(persist_err)?;
            fs::rename(&tmp, &self.path).map_err(persist_err)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }
}

/// Keeps the serialized snapshot in memory. Data is lost on restart.
/// Intended for testing; it still goes through the binary codec.
#[derive(Default)]
pub struct MemorySnapshotStore {
    data: Mutex<Option<Vec<u8>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<Forest>, VecError> {
        match self.data.lock().as_ref() {
            Some(bytes) => forest_io::load(&mut bytes.as_slice()).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, forest: &Forest) -> Result<(), VecError> {
        let mut buf = Vec::new();
        forest_io::save(forest, &mut buf).map_err(|e| VecError::Persistence(e.to_string()))?;
        *self.data.lock() = Some(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::IndexConfig;
    use tempfile::tempdir;

    fn forest() -> Forest {
        Forest::build(
            IndexConfig::with_dim(2),
            vec![(1, vec![1.0, 0.0]), (2, vec![0.0, 1.0])],
        )
        .unwrap()
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("nested").join("face.ann"));
        assert!(store.load().unwrap().is_none());

        store.save(&forest()).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.ids(), &[1, 2]);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_file_store_replaces() {
        let dir = tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("voice.ann"));
        store.save(&forest()).unwrap();
        store
            .save(&Forest::empty(IndexConfig::with_dim(2)))
            .unwrap();
        assert!(store.load().unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.ann");
        fs::write(&path, b"garbage").unwrap();
        assert!(FileSnapshotStore::new(path).load().is_err());
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySnapshotStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&forest()).unwrap();
        assert_eq!(store.load().unwrap().unwrap().len(), 2);
    }
}

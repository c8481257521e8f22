//! Redb-backed durable [`VectorStore`].

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use tracing::debug;

use crate::error::VecError;
use crate::store::{IdentityId, VectorStore, check_dim};

fn store_err(e: impl std::fmt::Display) -> VecError {
    VecError::Store(e.to_string())
}

/// A durable vector store backed by one redb table.
///
/// Keys are identity IDs; values are little-endian f32 bytes. Every
/// mutation commits its own write transaction, so a returned `Ok` is
/// durable.
pub struct RedbVectorStore {
    db: Arc<Database>,
    table: String,
    dim: usize,
}

impl RedbVectorStore {
    /// Open or create a store at `path` using table `table`.
    pub fn open<P: AsRef<Path>>(path: P, table: &str, dim: usize) -> Result<Self, VecError> {
        let db = Database::create(path.as_ref()).map_err(store_err)?;
        Self::with_database(Arc::new(db), table, dim)
    }

    /// Use an already-open database. Several stores (one per modality) may
    /// share a database as long as their table names differ.
    pub fn with_database(db: Arc<Database>, table: &str, dim: usize) -> Result<Self, VecError> {
        if dim == 0 {
            return Err(VecError::Store("store dim must be positive".into()));
        }
        let store = Self {
            db,
            table: table.to_string(),
            dim,
        };

        // Create the table if it doesn't exist.
        let tx = store.db.begin_write().map_err(store_err)?;
        {
            let _ = tx.open_table(store.def()).map_err(store_err)?;
        }
        tx.commit().map_err(store_err)?;

        debug!(table = %store.table, dim, "opened redb vector store");
        Ok(store)
    }

    fn def(&self) -> TableDefinition<'_, u64, &'static [u8]> {
        TableDefinition::new(&self.table)
    }

    fn decode(&self, id: IdentityId, bytes: &[u8]) -> Result<Vec<f32>, VecError> {
        if bytes.len() != self.dim * 4 {
            return Err(VecError::InvalidFormat(format!(
                "vector {id} has {} bytes, want {}",
                bytes.len(),
                self.dim * 4
            )));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

fn encode(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

impl VectorStore for RedbVectorStore {
    fn dim(&self) -> usize {
        self.dim
    }

    fn put(&self, id: IdentityId, vector: &[f32]) -> Result<(), VecError> {
        check_dim(vector, self.dim)?;
        let bytes = encode(vector);
        let tx = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = tx.open_table(self.def()).map_err(store_err)?;
            table.insert(id, bytes.as_slice()).map_err(store_err)?;
        }
        tx.commit().map_err(store_err)?;
        Ok(())
    }

    fn get(&self, id: IdentityId) -> Result<Option<Vec<f32>>, VecError> {
        let tx = self.db.begin_read().map_err(store_err)?;
        let table = tx.open_table(self.def()).map_err(store_err)?;
        match table.get(id).map_err(store_err)? {
            Some(value) => Ok(Some(self.decode(id, value.value())?)),
            None => Ok(None),
        }
    }

    fn remove(&self, id: IdentityId) -> Result<(), VecError> {
        let tx = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = tx.open_table(self.def()).map_err(store_err)?;
            table.remove(id).map_err(store_err)?;
        }
        tx.commit().map_err(store_err)?;
        Ok(())
    }

    fn all_ids(&self) -> Result<HashSet<IdentityId>, VecError> {
        let tx = self.db.begin_read().map_err(store_err)?;
        let table = tx.open_table(self.def()).map_err(store_err)?;
        let mut ids = HashSet::new();
        for item in table.iter().map_err(store_err)? {
            let (key, _) = item.map_err(store_err)?;
            ids.insert(key.value());
        }
        Ok(ids)
    }

    fn entries(&self) -> Result<Vec<(IdentityId, Vec<f32>)>, VecError> {
        let tx = self.db.begin_read().map_err(store_err)?;
        let table = tx.open_table(self.def()).map_err(store_err)?;
        let mut out = Vec::new();
        for item in table.iter().map_err(store_err)? {
            let (key, value) = item.map_err(store_err)?;
            let id = key.value();
            out.push((id, self.decode(id, value.value())?));
        }
        Ok(out)
    }

    fn len(&self) -> Result<usize, VecError> {
        let tx = self.db.begin_read().map_err(store_err)?;
        let table = tx.open_table(self.def()).map_err(store_err)?;
        Ok(table.len().map_err(store_err)? as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_redb_basic() {
        let dir = tempdir().unwrap();
        let store = RedbVectorStore::open(dir.path().join("face.redb"), "face", 3).unwrap();

        store.put(7, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(store.get(7).unwrap(), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(store.len().unwrap(), 1);

        store.remove(7).unwrap();
        assert_eq!(store.get(7).unwrap(), None);
        store.remove(7).unwrap();
    }

    #[test]
    fn test_redb_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("voice.redb");
        {
            let store = RedbVectorStore::open(&path, "voice", 2).unwrap();
            store.put(1, &[0.5, -0.5]).unwrap();
            store.put(2, &[1.0, 0.0]).unwrap();
        }

        let store = RedbVectorStore::open(&path, "voice", 2).unwrap();
        assert_eq!(store.all_ids().unwrap(), HashSet::from([1, 2]));
        let mut entries = store.entries().unwrap();
        entries.sort_by_key(|(id, _)| *id);
        assert_eq!(entries[0], (1, vec![0.5, -0.5]));
    }

    #[test]
    fn test_redb_shared_database() {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::create(dir.path().join("both.redb")).unwrap());
        let face = RedbVectorStore::with_database(db.clone(), "face", 3).unwrap();
        let voice = RedbVectorStore::with_database(db, "voice", 2).unwrap();

        face.put(1, &[1.0, 0.0, 0.0]).unwrap();
        voice.put(1, &[0.0, 1.0]).unwrap();
        assert_eq!(face.len().unwrap(), 1);
        assert_eq!(voice.get(1).unwrap(), Some(vec![0.0, 1.0]));
    }

    #[test]
    fn test_redb_dimension_mismatch() {
        let dir = tempdir().unwrap();
        let store = RedbVectorStore::open(dir.path().join("x.redb"), "x", 3).unwrap();
        assert!(store.put(1, &[1.0]).unwrap_err().is_dimension_mismatch());
        assert!(store.is_empty().unwrap());
    }
}

//! Redb-backed durable [`IdentityStore`].

use std::path::Path;
use std::sync::Arc;

use biogate_vecstore::IdentityId;
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::EngineError;
use crate::identity::{IdentityRecord, IdentityStore, IdentityUpdate};

const RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("identities");
const META: TableDefinition<&str, u64> = TableDefinition::new("identity_meta");
const NEXT_ID_KEY: &str = "next_id";

fn store_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Identity(e.to_string())
}

/// A persistent identity store backed by redb.
///
/// Records are stored as JSON. The ID counter lives in its own table and is
/// advanced in the same write transaction that reads it.
pub struct RedbIdentityStore {
    db: Arc<Database>,
}

impl RedbIdentityStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let db = Database::create(path.as_ref()).map_err(store_err)?;
        Self::with_database(Arc::new(db))
    }

    /// Use an already-open database.
    pub fn with_database(db: Arc<Database>) -> Result<Self, EngineError> {
        // Create the tables if they don't exist
        let tx = db.begin_write().map_err(store_err)?;
        {
            let _ = tx.open_table(RECORDS).map_err(store_err)?;
            let _ = tx.open_table(META).map_err(store_err)?;
        }
        tx.commit().map_err(store_err)?;
        Ok(Self { db })
    }
}

impl IdentityStore for RedbIdentityStore {
    fn next_id(&self) -> Result<IdentityId, EngineError> {
        let tx = self.db.begin_write().map_err(store_err)?;
        let id = {
            let records = tx.open_table(RECORDS).map_err(store_err)?;
            let after_last = match records.last().map_err(store_err)? {
                Some((key, _)) => key.value() + 1,
                None => 1,
            };

            let mut meta = tx.open_table(META).map_err(store_err)?;
            let next = meta
                .get(NEXT_ID_KEY)
                .map_err(store_err)?
                .map_or(1, |v| v.value());
            let id = next.max(after_last);
            meta.insert(NEXT_ID_KEY, id + 1).map_err(store_err)?;
            id
        };
        tx.commit().map_err(store_err)?;
        Ok(id)
    }

    fn create_identity(&self, id: IdentityId) -> Result<IdentityRecord, EngineError> {
        let record = IdentityRecord::new(id);
        let bytes = serde_json::to_vec(&record)?;

        let tx = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = tx.open_table(RECORDS).map_err(store_err)?;
            if table.get(id).map_err(store_err)?.is_some() {
                return Err(EngineError::IdentityExists(id));
            }
            table.insert(id, bytes.as_slice()).map_err(store_err)?;
        }
        tx.commit().map_err(store_err)?;
        Ok(record)
    }

    fn get_identity(&self, id: IdentityId) -> Result<Option<IdentityRecord>, EngineError> {
        let tx = self.db.begin_read().map_err(store_err)?;
        let table = tx.open_table(RECORDS).map_err(store_err)?;
        match table.get(id).map_err(store_err)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn update_identity(
        &self,
        id: IdentityId,
        update: &IdentityUpdate,
    ) -> Result<Option<IdentityRecord>, EngineError> {
        let tx = self.db.begin_write().map_err(store_err)?;
        let updated = {
            let mut table = tx.open_table(RECORDS).map_err(store_err)?;
            let current: Option<IdentityRecord> = match table.get(id).map_err(store_err)? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };
            match current {
                Some(mut record) => {
                    record.apply(update);
                    let bytes = serde_json::to_vec(&record)?;
                    table.insert(id, bytes.as_slice()).map_err(store_err)?;
                    Some(record)
                }
                None => None,
            }
        };
        tx.commit().map_err(store_err)?;
        Ok(updated)
    }

    fn delete_identity(&self, id: IdentityId) -> Result<bool, EngineError> {
        let tx = self.db.begin_write().map_err(store_err)?;
        let existed = {
            let mut table = tx.open_table(RECORDS).map_err(store_err)?;
            let removed = table.remove(id).map_err(store_err)?;
            removed.is_some()
        };
        tx.commit().map_err(store_err)?;
        Ok(existed)
    }

    fn list_identities(&self) -> Result<Vec<IdentityRecord>, EngineError> {
        let tx = self.db.begin_read().map_err(store_err)?;
        let table = tx.open_table(RECORDS).map_err(store_err)?;
        let mut out = Vec::new();
        for item in table.iter().map_err(store_err)? {
            let (_, value) = item.map_err(store_err)?;
            out.push(serde_json::from_slice(value.value())?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn redb_identity_lifecycle() {
        let dir = tempdir().unwrap();
        let store = RedbIdentityStore::open(dir.path().join("ids.redb")).unwrap();

        let id = store.next_id().unwrap();
        assert_eq!(id, 1);
        store.create_identity(id).unwrap();
        assert!(matches!(
            store.create_identity(id),
            Err(EngineError::IdentityExists(1))
        ));

        let rec = store
            .update_identity(
                id,
                &IdentityUpdate {
                    firstname: Some("Grace".into()),
                    lastname: Some("Hopper".into()),
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(rec.lastname.as_deref(), Some("Hopper"));
        assert_eq!(store.get_identity(id).unwrap(), Some(rec));

        assert!(store.delete_identity(id).unwrap());
        assert!(!store.delete_identity(id).unwrap());
        assert!(store.list_identities().unwrap().is_empty());
    }

    #[test]
    fn redb_counter_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ids.redb");
        {
            let store = RedbIdentityStore::open(&path).unwrap();
            let a = store.next_id().unwrap();
            let b = store.next_id().unwrap();
            store.create_identity(a).unwrap();
            store.create_identity(b).unwrap();
        }

        let store = RedbIdentityStore::open(&path).unwrap();
        assert_eq!(store.next_id().unwrap(), 3);
        let ids: Vec<_> = store.list_identities().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}

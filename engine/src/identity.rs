use std::collections::BTreeMap;

use biogate_vecstore::IdentityId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A registered person. Biometric vectors live in the modality indexes;
/// this record only carries the descriptive attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: IdentityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl IdentityRecord {
    pub fn new(id: IdentityId) -> Self {
        Self {
            id,
            firstname: None,
            lastname: None,
            created_at: Utc::now(),
        }
    }

    /// Apply the non-empty fields of `update`.
    pub(crate) fn apply(&mut self, update: &IdentityUpdate) {
        if let Some(first) = update.firstname.as_deref().filter(|s| !s.is_empty()) {
            self.firstname = Some(first.to_string());
        }
        if let Some(last) = update.lastname.as_deref().filter(|s| !s.is_empty()) {
            self.lastname = Some(last.to_string());
        }
    }
}

/// Attribute changes for an existing identity. `None` or empty fields are
/// left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityUpdate {
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
}

/// IdentityStore allocates identity IDs and holds identity records.
///
/// `next_id` must never return the same ID twice, including across
/// concurrent callers, and must return an ID above every existing record.
///
/// Implementations must be safe for concurrent use.
pub trait IdentityStore: Send + Sync {
    /// Reserve a fresh, unused identity ID.
    fn next_id(&self) -> Result<IdentityId, EngineError>;

    /// Create the record for `id`. Fails if it already exists.
    fn create_identity(&self, id: IdentityId) -> Result<IdentityRecord, EngineError>;

    fn get_identity(&self, id: IdentityId) -> Result<Option<IdentityRecord>, EngineError>;

    /// Update attributes; returns `None` if `id` does not exist.
    fn update_identity(
        &self,
        id: IdentityId,
        update: &IdentityUpdate,
    ) -> Result<Option<IdentityRecord>, EngineError>;

    /// Delete the record. Returns false if it did not exist.
    fn delete_identity(&self, id: IdentityId) -> Result<bool, EngineError>;

    /// All records, ascending by ID.
    fn list_identities(&self) -> Result<Vec<IdentityRecord>, EngineError>;
}

/// In-memory [`IdentityStore`]. Data is lost on restart.
#[derive(Default)]
pub struct MemoryIdentityStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    records: BTreeMap<IdentityId, IdentityRecord>,
    next: IdentityId,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn next_id(&self) -> Result<IdentityId, EngineError> {
        let mut inner = self.inner.lock();
        let after_last = inner.records.keys().next_back().map_or(1, |&id| id + 1);
        let id = inner.next.max(after_last).max(1);
        inner.next = id + 1;
        Ok(id)
    }

    fn create_identity(&self, id: IdentityId) -> Result<IdentityRecord, EngineError> {
        let mut inner = self.inner.lock();
        if inner.records.contains_key(&id) {
            return Err(EngineError::IdentityExists(id));
        }
        let record = IdentityRecord::new(id);
        inner.records.insert(id, record.clone());
        Ok(record)
    }

    fn get_identity(&self, id: IdentityId) -> Result<Option<IdentityRecord>, EngineError> {
        Ok(self.inner.lock().records.get(&id).cloned())
    }

    fn update_identity(
        &self,
        id: IdentityId,
        update: &IdentityUpdate,
    ) -> Result<Option<IdentityRecord>, EngineError> {
        let mut inner = self.inner.lock();
        Ok(inner.records.get_mut(&id).map(|record| {
            record.apply(update);
            record.clone()
        }))
    }

    fn delete_identity(&self, id: IdentityId) -> Result<bool, EngineError> {
        Ok(self.inner.lock().records.remove(&id).is_some())
    }

    fn list_identities(&self) -> Result<Vec<IdentityRecord>, EngineError> {
        Ok(self.inner.lock().records.values().cloned().collect())
    }
}

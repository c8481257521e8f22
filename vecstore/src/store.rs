use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::error::VecError;

/// IdentityId keys a vector in every modality store and index.
pub type IdentityId = u64;

/// VectorStore is the durable source of truth mapping identity IDs to
/// feature vectors for one modality.
///
/// All vectors in one store share the dimensionality returned by
/// [`VectorStore::dim`]. Once `put`/`remove` return `Ok`, the change must
/// survive a process restart (for durable implementations).
///
/// All implementations must be safe for concurrent use (Send + Sync).
pub trait VectorStore: Send + Sync {
    /// Dimensionality every stored vector must have.
    fn dim(&self) -> usize;

    /// Add or replace the vector for `id`.
    fn put(&self, id: IdentityId, vector: &[f32]) -> Result<(), VecError>;

    /// Return the vector for `id`, if present.
    fn get(&self, id: IdentityId) -> Result<Option<Vec<f32>>, VecError>;

    /// Remove `id`. No error if it does not exist.
    fn remove(&self, id: IdentityId) -> Result<(), VecError>;

    /// Return every stored ID. No ordering guarantee.
    fn all_ids(&self) -> Result<HashSet<IdentityId>, VecError>;

    /// Return every stored `(id, vector)` pair. No ordering guarantee.
    fn entries(&self) -> Result<Vec<(IdentityId, Vec<f32>)>, VecError>;

    /// Return the number of stored vectors.
    fn len(&self) -> Result<usize, VecError> {
        Ok(self.all_ids()?.len())
    }

    /// Return true if the store holds no vectors.
    fn is_empty(&self) -> Result<bool, VecError> {
        Ok(self.len()? == 0)
    }
}

pub(crate) fn check_dim(vector: &[f32], want: usize) -> Result<(), VecError> {
    if vector.len() != want {
        return Err(VecError::DimensionMismatch {
            got: vector.len(),
            want,
        });
    }
    Ok(())
}

/// In-memory [`VectorStore`]. Data is lost on restart.
/// Intended for testing and ephemeral use.
pub struct MemoryVectorStore {
    dim: usize,
    vectors: RwLock<HashMap<IdentityId, Vec<f32>>>,
}

impl MemoryVectorStore {
    /// Creates an empty store. Panics if `dim` is 0.
    pub fn new(dim: usize) -> Self {
        assert!(dim > 0, "vecstore: store dim must be positive");
        Self {
            dim,
            vectors: RwLock::new(HashMap::new()),
        }
    }
}

impl VectorStore for MemoryVectorStore {
    fn dim(&self) -> usize {
        self.dim
    }

    fn put(&self, id: IdentityId, vector: &[f32]) -> Result<(), VecError> {
        check_dim(vector, self.dim)?;
        self.vectors.write().insert(id, vector.to_vec());
        Ok(())
    }

    fn get(&self, id: IdentityId) -> Result<Option<Vec<f32>>, VecError> {
        Ok(self.vectors.read().get(&id).cloned())
    }

    fn remove(&self, id: IdentityId) -> Result<(), VecError> {
        self.vectors.write().remove(&id);
        Ok(())
    }

    fn all_ids(&self) -> Result<HashSet<IdentityId>, VecError> {
        Ok(self.vectors.read().keys().copied().collect())
    }

    fn entries(&self) -> Result<Vec<(IdentityId, Vec<f32>)>, VecError> {
        Ok(self
            .vectors
            .read()
            .iter()
            .map(|(&id, v)| (id, v.clone()))
            .collect())
    }

    fn len(&self) -> Result<usize, VecError> {
        Ok(self.vectors.read().len())
    }
}

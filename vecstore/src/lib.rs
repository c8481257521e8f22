//! Per-modality vector storage and approximate nearest-neighbor search.
//!
//! An [`IndexManager`] pairs a durable [`VectorStore`] (the source of truth)
//! with an immutable [`Forest`] snapshot built over it. Forests cannot be
//! updated in place, so every insert or delete builds a fresh snapshot from
//! the store plus the change, persists it through a [`SnapshotStore`], and
//! swaps it in atomically. Readers never observe a half-applied mutation.

pub mod distance;
pub mod error;
pub mod forest;
pub mod forest_io;
pub mod manager;
pub mod persist;
pub mod redb_store;
pub mod store;

pub use distance::{Metric, cosine_distance, cosine_similarity};
pub use error::VecError;
pub use forest::{Forest, IndexConfig, MAX_DIM, Neighbor};
pub use forest_io::{load as load_forest, save as save_forest};
pub use manager::IndexManager;
pub use persist::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use redb_store::RedbVectorStore;
pub use store::{IdentityId, MemoryVectorStore, VectorStore};

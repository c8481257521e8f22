use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::VecError;
use crate::forest::{Forest, IndexConfig, Neighbor};
use crate::persist::SnapshotStore;
use crate::store::{IdentityId, VectorStore, check_dim};

/// IndexManager owns one modality's authoritative [`VectorStore`] and the
/// currently published [`Forest`] snapshot built over it.
///
/// Reads (`query`, `vector_of`) run against whichever snapshot is published
/// when they start and never block. Mutations are serialized and follow a
/// rebuild-and-swap protocol:
///
/// 1. compute the candidate set from the store plus the change,
/// 2. build a new snapshot out of place,
/// 3. write the store change and persist the snapshot,
/// 4. publish the snapshot with a single pointer swap.
///
/// A failure at any step leaves the published snapshot and the store as
/// they were before the call.
pub struct IndexManager {
    name: String,
    cfg: IndexConfig,
    store: Box<dyn VectorStore>,
    snapshots: Box<dyn SnapshotStore>,
    active: ArcSwap<Forest>,
    write_lock: Mutex<()>,
}

impl IndexManager {
    /// Open an index over `store`, reusing the last persisted snapshot when
    /// it still matches the store contents and `cfg`.
    ///
    /// When the store is empty but a snapshot exists, the snapshot's items
    /// seed the store. Any other disagreement is resolved in favor of the
    /// store by rebuilding.
    pub fn open(
        name: impl Into<String>,
        mut cfg: IndexConfig,
        store: Box<dyn VectorStore>,
        snapshots: Box<dyn SnapshotStore>,
    ) -> Result<Self, VecError> {
        let name = name.into();
        cfg.set_defaults();
        cfg.validate()?;
        if store.dim() != cfg.dim {
            return Err(VecError::DimensionMismatch {
                got: store.dim(),
                want: cfg.dim,
            });
        }

        let loaded = match snapshots.load() {
            Ok(s) => s,
            Err(e) => {
                warn!("index {name}: ignoring unreadable snapshot: {e}");
                None
            }
        };

        let mut entries = store.entries()?;
        if entries.is_empty() {
            if let Some(snap) = &loaded {
                if snap.config().dim == cfg.dim && !snap.is_empty() {
                    info!(
                        "index {name}: seeding empty store with {} vectors from snapshot",
                        snap.len()
                    );
                    entries = snap.entries();
                    for (id, v) in &entries {
                        store.put(*id, v)?;
                    }
                }
            }
        }

        let reusable = loaded.filter(|snap| snapshot_matches(snap, &cfg, &entries));
        let active = match reusable {
            Some(snap) => {
                info!("index {name}: loaded snapshot with {} vectors", snap.len());
                snap
            }
            None => {
                let started = Instant::now();
                let snap = Forest::build(cfg.clone(), entries)?;
                snapshots.save(&snap)?;
                info!(
                    "index {name}: rebuilt snapshot with {} vectors in {:?}",
                    snap.len(),
                    started.elapsed()
                );
                snap
            }
        };

        Ok(Self {
            name,
            cfg,
            store,
            snapshots,
            active: ArcSwap::from_pointee(active),
            write_lock: Mutex::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &IndexConfig {
        &self.cfg
    }

    pub fn dim(&self) -> usize {
        self.cfg.dim
    }

    /// The currently published snapshot. Holding it pins that version;
    /// later mutations publish new snapshots without affecting it.
    pub fn snapshot(&self) -> Arc<Forest> {
        self.active.load_full()
    }

    /// Return up to `k` nearest neighbors of `vector`, closest first.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>, VecError> {
        self.active.load().query(vector, k)
    }

    /// Return a copy of the stored vector for `id` from the published
    /// snapshot.
    pub fn vector_of(&self, id: IdentityId) -> Option<Vec<f32>> {
        self.active.load().vector_of(id).map(|v| v.to_vec())
    }

    pub fn contains(&self, id: IdentityId) -> bool {
        self.active.load().contains(id)
    }

    pub fn len(&self) -> usize {
        self.active.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every ID in the authoritative store.
    pub fn all_ids(&self) -> Result<HashSet<IdentityId>, VecError> {
        self.store.all_ids()
    }

    /// Add or replace the vector for `id`.
    pub fn insert(&self, id: IdentityId, vector: &[f32]) -> Result<(), VecError> {
        check_dim(vector, self.cfg.dim)?;

        let _guard = self.write_lock.lock();
        let started = Instant::now();

        let previous = self.store.get(id)?;
        let mut candidate = self.store.entries()?;
        candidate.retain(|(k, _)| *k != id);
        candidate.push((id, vector.to_vec()));

        let next = self.build(candidate)?;

        self.store
            .put(id, vector)
            .map_err(|e| VecError::Persistence(e.to_string()))?;
        if let Err(e) = self.snapshots.save(&next) {
            self.restore(id, previous.as_deref());
            return Err(persistence(e));
        }

        self.publish(next);
        debug!(
            "index {}: inserted {id} in {:?}",
            self.name,
            started.elapsed()
        );
        Ok(())
    }

    /// Remove `id`. Removing an absent ID is a successful no-op.
    pub fn delete(&self, id: IdentityId) -> Result<(), VecError> {
        let _guard = self.write_lock.lock();

        let previous = self.store.get(id)?;
        if previous.is_none() && !self.contains(id) {
            return Ok(());
        }

        let started = Instant::now();
        let mut candidate = self.store.entries()?;
        candidate.retain(|(k, _)| *k != id);

        let next = self.build(candidate)?;

        self.store
            .remove(id)
            .map_err(|e| VecError::Persistence(e.to_string()))?;
        if let Err(e) = self.snapshots.save(&next) {
            self.restore(id, previous.as_deref());
            return Err(persistence(e));
        }

        self.publish(next);
        debug!(
            "index {}: deleted {id} in {:?}",
            self.name,
            started.elapsed()
        );
        Ok(())
    }

    /// Rebuild and republish the snapshot from the store as it is now.
    pub fn rebuild(&self) -> Result<(), VecError> {
        let _guard = self.write_lock.lock();
        let next = self.build(self.store.entries()?)?;
        self.snapshots.save(&next).map_err(persistence)?;
        self.publish(next);
        Ok(())
    }

    fn build(&self, candidate: Vec<(IdentityId, Vec<f32>)>) -> Result<Forest, VecError> {
        Forest::build(self.cfg.clone(), candidate).map_err(|e| {
            warn!("index {}: snapshot build failed: {e}", self.name);
            match e {
                VecError::DimensionMismatch { .. } | VecError::Build(_) => e,
                other => VecError::Build(other.to_string()),
            }
        })
    }

    fn publish(&self, next: Forest) {
        let items = next.len();
        self.active.store(Arc::new(next));
        info!("index {}: published snapshot with {items} vectors", self.name);
    }

    /// Undo a store write after the snapshot could not be persisted.
    fn restore(&self, id: IdentityId, previous: Option<&[f32]>) {
        let undo = match previous {
            Some(v) => self.store.put(id, v),
            None => self.store.remove(id),
        };
        if let Err(e) = undo {
            error!(
                "index {}: failed to restore store entry {id} after persistence failure: {e}",
                self.name
            );
        }
    }
}

fn persistence(e: VecError) -> VecError {
    match e {
        VecError::Persistence(_) => e,
        other => VecError::Persistence(other.to_string()),
    }
}

fn snapshot_matches(snap: &Forest, cfg: &IndexConfig, entries: &[(IdentityId, Vec<f32>)]) -> bool {
    snap.config() == cfg
        && snap.len() == entries.len()
        && entries
            .iter()
            .all(|(id, v)| snap.vector_of(*id) == Some(v.as_slice()))
}

impl std::fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexManager")
            .field("name", &self.name)
            .field("dim", &self.cfg.dim)
            .field("metric", &self.cfg.metric)
            .field("items", &self.len())
            .finish()
    }
}

use std::collections::{BinaryHeap, HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::distance::{Metric, normalized};
use crate::error::VecError;
use crate::store::IdentityId;

/// Attempts at finding a hyperplane that puts items on both sides before a
/// node is turned into an (oversized) leaf.
const MAX_SPLIT_ATTEMPTS: usize = 8;

/// Largest supported vector dimension.
pub const MAX_DIM: usize = 65_536;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// IndexConfig fixes the build-time shape of every snapshot of one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Vector dimension. Required; must be positive.
    pub dim: usize,
    /// Distance metric. Default: angular.
    #[serde(default)]
    pub metric: Metric,
    /// Number of random-projection trees. Default: 10.
    #[serde(default)]
    pub num_trees: usize,
    /// A node holding at most this many items becomes a leaf.
    /// Default: 16.
    #[serde(default)]
    pub leaf_size: usize,
    /// Number of candidates collected before ranking a query.
    /// 0 means `k * num_trees`.
    #[serde(default)]
    pub search_k: usize,
    /// Seed for hyperplane sampling. The same seed and item set always
    /// produce the same snapshot.
    #[serde(default)]
    pub seed: u64,
}

impl IndexConfig {
    /// Config with the given dimension and every other field defaulted.
    pub fn with_dim(dim: usize) -> Self {
        let mut cfg = Self {
            dim,
            metric: Metric::default(),
            num_trees: 0,
            leaf_size: 0,
            search_k: 0,
            seed: 0,
        };
        cfg.set_defaults();
        cfg
    }

    pub fn set_defaults(&mut self) {
        if self.num_trees == 0 {
            self.num_trees = 10;
        }
        if self.leaf_size == 0 {
            self.leaf_size = 16;
        }
        if self.seed == 0 {
            self.seed = 42;
        }
    }

    pub fn validate(&self) -> Result<(), VecError> {
        if self.dim == 0 {
            return Err(VecError::Build("dim must be positive".into()));
        }
        if self.dim > MAX_DIM {
            return Err(VecError::Build(format!(
                "dim {} exceeds maximum {MAX_DIM}",
                self.dim
            )));
        }
        // Snapshots store these as u32.
        for (field, value) in [
            ("num_trees", self.num_trees),
            ("leaf_size", self.leaf_size),
            ("search_k", self.search_k),
        ] {
            if u32::try_from(value).is_err() {
                return Err(VecError::Build(format!("{field} {value} is out of range")));
            }
        }
        Ok(())
    }

    fn effective_search_k(&self, k: usize) -> usize {
        if self.search_k > 0 {
            self.search_k.max(k)
        } else {
            k.saturating_mul(self.num_trees).max(k)
        }
    }
}

// ---------------------------------------------------------------------------
// Internal priority-queue type
// ---------------------------------------------------------------------------

/// Max-heap on priority: the node whose path has the largest margin first.
struct Pending {
    priority: f32,
    node: u32,
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .partial_cmp(&other.priority)
            .unwrap_or(std::cmp::Ordering::Equal)
    }
}
impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.node == other.node
    }
}
impl Eq for Pending {}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

pub(crate) enum Node {
    /// Items whose margin is positive go right, the rest go left.
    Split {
        normal: Vec<f32>,
        offset: f32,
        left: u32,
        right: u32,
    },
    Leaf {
        items: Vec<u32>,
    },
}

fn margin(normal: &[f32], offset: f32, v: &[f32]) -> f32 {
    let dot: f64 = normal
        .iter()
        .zip(v.iter())
        .map(|(&a, &b)| a as f64 * b as f64)
        .sum();
    (dot + offset as f64) as f32
}

/// Neighbor is a single result from a nearest-neighbor query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// Identity of the matched vector.
    pub id: IdentityId,

    /// Distance between the query and the matched vector under the
    /// snapshot's metric. Lower values indicate higher similarity.
    pub distance: f32,
}

// ---------------------------------------------------------------------------
// Forest
// ---------------------------------------------------------------------------

/// Forest is an immutable random-projection forest over a fixed set of
/// `(IdentityId, vector)` pairs.
///
/// It is built once and never mutated; changing the item set means building
/// a new forest. Safe to share across threads without locking.
pub struct Forest {
    pub(crate) cfg: IndexConfig,
    pub(crate) ids: Vec<IdentityId>,
    pub(crate) vectors: Vec<Vec<f32>>,
    pub(crate) id_map: HashMap<IdentityId, u32>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) roots: Vec<u32>,
}

impl Forest {
    /// An empty forest. Queries return no neighbors.
    pub fn empty(cfg: IndexConfig) -> Self {
        Self {
            cfg,
            ids: Vec::new(),
            vectors: Vec::new(),
            id_map: HashMap::new(),
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Build a forest over `items`.
    ///
    /// Items are ordered by ID before building, so the result depends only
    /// on the item set and `cfg`. A later duplicate ID replaces an earlier
    /// one. Fails on a wrong-length or non-finite vector.
    pub fn build(cfg: IndexConfig, items: Vec<(IdentityId, Vec<f32>)>) -> Result<Self, VecError> {
        cfg.validate()?;

        let mut by_id: HashMap<IdentityId, Vec<f32>> = HashMap::with_capacity(items.len());
        for (id, v) in items {
            if v.len() != cfg.dim {
                return Err(VecError::DimensionMismatch {
                    got: v.len(),
                    want: cfg.dim,
                });
            }
            if v.iter().any(|x| !x.is_finite()) {
                return Err(VecError::Build(format!(
                    "vector {id} has a non-finite component"
                )));
            }
            by_id.insert(id, v);
        }

        let mut sorted: Vec<(IdentityId, Vec<f32>)> = by_id.into_iter().collect();
        sorted.sort_by_key(|(id, _)| *id);

        let mut forest = Self::empty(cfg);
        for (i, (id, v)) in sorted.into_iter().enumerate() {
            forest.id_map.insert(id, i as u32);
            forest.ids.push(id);
            forest.vectors.push(v);
        }

        if !forest.ids.is_empty() {
            forest.grow_trees();
        }
        Ok(forest)
    }

    fn grow_trees(&mut self) {
        let mut rng = StdRng::seed_from_u64(self.cfg.seed);
        let split_vectors: Vec<Vec<f32>> = if self.cfg.metric.is_directional() {
            self.vectors.iter().map(|v| normalized(v)).collect()
        } else {
            self.vectors.clone()
        };
        let all: Vec<u32> = (0..self.ids.len() as u32).collect();

        for _ in 0..self.cfg.num_trees {
            let root = self.nodes.len() as u32;
            self.nodes.push(Node::Leaf { items: Vec::new() });
            self.roots.push(root);

            // Iterative to keep degenerate trees off the call stack.
            let mut work = vec![(root, all.clone())];
            while let Some((slot, items)) = work.pop() {
                match self.split(&split_vectors, &items, &mut rng) {
                    Some((normal, offset, left_items, right_items)) => {
                        let left = self.nodes.len() as u32;
                        self.nodes.push(Node::Leaf { items: Vec::new() });
                        let right = self.nodes.len() as u32;
                        self.nodes.push(Node::Leaf { items: Vec::new() });
                        self.nodes[slot as usize] = Node::Split {
                            normal,
                            offset,
                            left,
                            right,
                        };
                        work.push((left, left_items));
                        work.push((right, right_items));
                    }
                    None => self.nodes[slot as usize] = Node::Leaf { items },
                }
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn split(
        &self,
        split_vectors: &[Vec<f32>],
        items: &[u32],
        rng: &mut StdRng,
    ) -> Option<(Vec<f32>, f32, Vec<u32>, Vec<u32>)> {
        if items.len() <= self.cfg.leaf_size {
            return None;
        }

        for _ in 0..MAX_SPLIT_ATTEMPTS {
            let i = rng.gen_range(0..items.len());
            let mut j = rng.gen_range(0..items.len() - 1);
            if j >= i {
                j += 1;
            }
            let p = &split_vectors[items[i] as usize];
            let q = &split_vectors[items[j] as usize];

            let normal: Vec<f32> = p.iter().zip(q.iter()).map(|(a, b)| a - b).collect();
            if normal.iter().all(|&x| x == 0.0) {
                continue;
            }
            let offset = if self.cfg.metric.is_directional() {
                0.0
            } else {
                let mid: Vec<f32> = p.iter().zip(q.iter()).map(|(a, b)| (a + b) / 2.0).collect();
                -margin(&normal, 0.0, &mid)
            };

            let (right, left): (Vec<u32>, Vec<u32>) = items
                .iter()
                .copied()
                .partition(|&it| margin(&normal, offset, &split_vectors[it as usize]) > 0.0);
            if !left.is_empty() && !right.is_empty() {
                return Some((normal, offset, left, right));
            }
        }
        None
    }

    /// Return up to `k` nearest neighbors of `query`, ordered by ascending
    /// distance (closest first). Ties are broken by ascending ID.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, VecError> {
        if query.len() != self.cfg.dim {
            return Err(VecError::DimensionMismatch {
                got: query.len(),
                want: self.cfg.dim,
            });
        }
        if self.ids.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let search_k = self.cfg.effective_search_k(k);
        let probe = if self.cfg.metric.is_directional() {
            normalized(query)
        } else {
            query.to_vec()
        };

        let mut heap: BinaryHeap<Pending> = self
            .roots
            .iter()
            .map(|&node| Pending {
                priority: f32::INFINITY,
                node,
            })
            .collect();
        let mut candidates: HashSet<u32> = HashSet::with_capacity(search_k);

        while candidates.len() < search_k {
            let Some(top) = heap.pop() else { break };
            match &self.nodes[top.node as usize] {
                Node::Leaf { items } => candidates.extend(items.iter().copied()),
                Node::Split {
                    normal,
                    offset,
                    left,
                    right,
                } => {
                    let m = margin(normal, *offset, &probe);
                    heap.push(Pending {
                        priority: top.priority.min(m),
                        node: *right,
                    });
                    heap.push(Pending {
                        priority: top.priority.min(-m),
                        node: *left,
                    });
                }
            }
        }

        let metric = self.cfg.metric;
        let mut results: Vec<Neighbor> = candidates
            .into_iter()
            .map(|i| Neighbor {
                id: self.ids[i as usize],
                distance: metric.distance(query, &self.vectors[i as usize]),
            })
            .collect();
        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        results.truncate(k);
        Ok(results)
    }

    /// Return the stored vector for `id`, if present.
    pub fn vector_of(&self, id: IdentityId) -> Option<&[f32]> {
        self.id_map
            .get(&id)
            .map(|&i| self.vectors[i as usize].as_slice())
    }

    pub fn contains(&self, id: IdentityId) -> bool {
        self.id_map.contains_key(&id)
    }

    /// Return every ID in the forest, ascending.
    pub fn ids(&self) -> &[IdentityId] {
        &self.ids
    }

    /// Return every `(id, vector)` pair, ascending by ID.
    pub fn entries(&self) -> Vec<(IdentityId, Vec<f32>)> {
        self.ids
            .iter()
            .copied()
            .zip(self.vectors.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn config(&self) -> &IndexConfig {
        &self.cfg
    }

    pub fn metric(&self) -> Metric {
        self.cfg.metric
    }

    /// Number of tree nodes across all trees.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl std::fmt::Debug for Forest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forest")
            .field("dim", &self.cfg.dim)
            .field("metric", &self.cfg.metric)
            .field("items", &self.ids.len())
            .field("trees", &self.roots.len())
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

use std::collections::HashMap;
use std::io::{BufReader, BufWriter, Read, Write};

use crate::distance::Metric;
use crate::error::VecError;
use crate::forest::{Forest, IndexConfig, MAX_DIM, Node};

const FOREST_MAGIC: [u8; 4] = [b'R', b'P', b'F', b'S'];
const FOREST_VERSION: u32 = 1;

const NODE_LEAF: u8 = 0;
const NODE_SPLIT: u8 = 1;

/// Upper bound on capacity reserved from a count read off the wire.
/// Larger collections grow as their elements are actually read.
const MAX_PREALLOC: usize = 4096;

/// Save serializes a forest to a writer in a compact binary format:
///
/// ```text
/// [4B magic "RPFS"] [4B version=1]
/// [4B dim] [1B metric] [4B numTrees] [4B leafSize] [4B searchK] [8B seed]
/// [4B itemCount]
/// For each item:
///   [8B id] [dim x 4B float32 vector]
/// [4B nodeCount]
/// For each node:
///   [1B kind]
///   kind 0 (leaf):  [4B n] [n x 4B item index]
///   kind 1 (split): [dim x 4B normal] [4B offset] [4B left] [4B right]
/// [4B rootCount] [rootCount x 4B node index]
/// ```
///
/// All multi-byte values are little-endian.
pub fn save(f: &Forest, w: &mut dyn Write) -> Result<(), VecError> {
    let mut bw = BufWriter::new(w);
    let write_err = |e: std::io::Error| VecError::Io(e.to_string());

    // Header.
    bw.write_all(&FOREST_MAGIC).map_err(write_err)?;
    bw.write_all(&FOREST_VERSION.to_le_bytes()).map_err(write_err)?;

    // Config.
    let cfg = &f.cfg;
    bw.write_all(&(cfg.dim as u32).to_le_bytes()).map_err(write_err)?;
    bw.write_all(&[cfg.metric.tag()]).map_err(write_err)?;
    bw.write_all(&(cfg.num_trees as u32).to_le_bytes()).map_err(write_err)?;
    bw.write_all(&(cfg.leaf_size as u32).to_le_bytes()).map_err(write_err)?;
    bw.write_all(&(cfg.search_k as u32).to_le_bytes()).map_err(write_err)?;
    bw.write_all(&cfg.seed.to_le_bytes()).map_err(write_err)?;

    // Items.
    bw.write_all(&(f.ids.len() as u32).to_le_bytes()).map_err(write_err)?;
    for (id, vector) in f.ids.iter().zip(f.vectors.iter()) {
        bw.write_all(&id.to_le_bytes()).map_err(write_err)?;
        for &v in vector {
            bw.write_all(&v.to_le_bytes()).map_err(write_err)?;
        }
    }

    // Nodes.
    bw.write_all(&(f.nodes.len() as u32).to_le_bytes()).map_err(write_err)?;
    for node in &f.nodes {
        match node {
            Node::Leaf { items } => {
                bw.write_all(&[NODE_LEAF]).map_err(write_err)?;
                bw.write_all(&(items.len() as u32).to_le_bytes()).map_err(write_err)?;
                for &it in items {
                    bw.write_all(&it.to_le_bytes()).map_err(write_err)?;
                }
            }
            Node::Split {
                normal,
                offset,
                left,
                right,
            } => {
                bw.write_all(&[NODE_SPLIT]).map_err(write_err)?;
                for &v in normal {
                    bw.write_all(&v.to_le_bytes()).map_err(write_err)?;
                }
                bw.write_all(&offset.to_le_bytes()).map_err(write_err)?;
                bw.write_all(&left.to_le_bytes()).map_err(write_err)?;
                bw.write_all(&right.to_le_bytes()).map_err(write_err)?;
            }
        }
    }

    // Roots.
    bw.write_all(&(f.roots.len() as u32).to_le_bytes()).map_err(write_err)?;
    for &r in &f.roots {
        bw.write_all(&r.to_le_bytes()).map_err(write_err)?;
    }

    bw.flush().map_err(write_err)?;
    Ok(())
}

/// Load deserializes a forest from a reader.
///
/// The binary format must match what `save` produces. Item and node
/// references are bounds-checked; a forest that loads is safe to query.
pub fn load(r: &mut dyn Read) -> Result<Forest, VecError> {
    let mut br = BufReader::new(r);
    let read_err = |e: std::io::Error| VecError::Io(e.to_string());

    let mut buf4 = [0u8; 4];

    // Magic.
    br.read_exact(&mut buf4).map_err(read_err)?;
    if buf4 != FOREST_MAGIC {
        return Err(VecError::InvalidFormat(format!("invalid magic {:?}", buf4)));
    }

    // Version.
    br.read_exact(&mut buf4).map_err(read_err)?;
    let version = u32::from_le_bytes(buf4);
    if version != FOREST_VERSION {
        return Err(VecError::InvalidFormat(format!(
            "unsupported version {version} (want {FOREST_VERSION})"
        )));
    }

    let read_u32 = |br: &mut BufReader<&mut dyn Read>| -> Result<u32, VecError> {
        let mut buf = [0u8; 4];
        br.read_exact(&mut buf).map_err(|e| VecError::Io(e.to_string()))?;
        Ok(u32::from_le_bytes(buf))
    };
    let read_f32 = |br: &mut BufReader<&mut dyn Read>| -> Result<f32, VecError> {
        let mut buf = [0u8; 4];
        br.read_exact(&mut buf).map_err(|e| VecError::Io(e.to_string()))?;
        Ok(f32::from_le_bytes(buf))
    };
    let read_u64 = |br: &mut BufReader<&mut dyn Read>| -> Result<u64, VecError> {
        let mut buf = [0u8; 8];
        br.read_exact(&mut buf).map_err(|e| VecError::Io(e.to_string()))?;
        Ok(u64::from_le_bytes(buf))
    };

    // Config.
    let dim = read_u32(&mut br)? as usize;
    if dim == 0 || dim > MAX_DIM {
        return Err(VecError::InvalidFormat(format!("invalid dimension {dim}")));
    }
    let mut tag = [0u8; 1];
    br.read_exact(&mut tag).map_err(read_err)?;
    let metric = Metric::from_tag(tag[0])
        .ok_or_else(|| VecError::InvalidFormat(format!("unknown metric tag {}", tag[0])))?;
    let num_trees = read_u32(&mut br)? as usize;
    let leaf_size = read_u32(&mut br)? as usize;
    let search_k = read_u32(&mut br)? as usize;
    let seed = read_u64(&mut br)?;

    // Items.
    let item_count = read_u32(&mut br)? as usize;
    let mut ids = Vec::with_capacity(item_count.min(MAX_PREALLOC));
    let mut vectors = Vec::with_capacity(item_count.min(MAX_PREALLOC));
    let mut id_map = HashMap::with_capacity(item_count.min(MAX_PREALLOC));
    for i in 0..item_count {
        let id = read_u64(&mut br)?;
        if id_map.insert(id, i as u32).is_some() {
            return Err(VecError::InvalidFormat(format!("duplicate item id {id}")));
        }
        let mut vector = vec![0.0f32; dim];
        for v in &mut vector {
            *v = read_f32(&mut br)?;
        }
        ids.push(id);
        vectors.push(vector);
    }

    // Nodes.
    let node_count = read_u32(&mut br)? as usize;
    let mut nodes = Vec::with_capacity(node_count.min(MAX_PREALLOC));
    for idx in 0..node_count {
        let mut kind = [0u8; 1];
        br.read_exact(&mut kind).map_err(read_err)?;
        match kind[0] {
            NODE_LEAF => {
                let n = read_u32(&mut br)? as usize;
                let mut items = Vec::with_capacity(n.min(MAX_PREALLOC));
                for _ in 0..n {
                    let it = read_u32(&mut br)?;
                    if it as usize >= item_count {
                        return Err(VecError::InvalidFormat(format!(
                            "leaf item {it} out of bounds (itemCount={item_count})"
                        )));
                    }
                    items.push(it);
                }
                nodes.push(Node::Leaf { items });
            }
            NODE_SPLIT => {
                let mut normal = vec![0.0f32; dim];
                for v in &mut normal {
                    *v = read_f32(&mut br)?;
                }
                let offset = read_f32(&mut br)?;
                let left = read_u32(&mut br)?;
                let right = read_u32(&mut br)?;
                // Children always follow their parent, which keeps trees acyclic.
                for child in [left, right] {
                    if child as usize >= node_count || child as usize <= idx {
                        return Err(VecError::InvalidFormat(format!(
                            "child node {child} of node {idx} out of bounds (nodeCount={node_count})"
                        )));
                    }
                }
                nodes.push(Node::Split {
                    normal,
                    offset,
                    left,
                    right,
                });
            }
            other => {
                return Err(VecError::InvalidFormat(format!("unknown node kind {other}")));
            }
        }
    }

    // Roots.
    let root_count = read_u32(&mut br)? as usize;
    let mut roots = Vec::with_capacity(root_count.min(MAX_PREALLOC));
    for _ in 0..root_count {
        let root = read_u32(&mut br)?;
        if root as usize >= node_count {
            return Err(VecError::InvalidFormat(format!(
                "root node {root} out of bounds (nodeCount={node_count})"
            )));
        }
        roots.push(root);
    }

    Ok(Forest {
        cfg: IndexConfig {
            dim,
            metric,
            num_trees,
            leaf_size,
            search_k,
            seed,
        },
        ids,
        vectors,
        id_map,
        nodes,
        roots,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Forest {
        let items = (1..=40u64)
            .map(|id| {
                let x = id as f32;
                (id, vec![x.sin(), x.cos(), (x * 0.5).sin(), 1.0])
            })
            .collect();
        Forest::build(
            IndexConfig {
                leaf_size: 3,
                ..IndexConfig::with_dim(4)
            },
            items,
        )
        .unwrap()
    }

    #[test]
    fn test_save_load() {
        let f = sample();

        let mut buf = Vec::new();
        save(&f, &mut buf).unwrap();

        let f2 = load(&mut buf.as_slice()).unwrap();
        assert_eq!(f2.len(), f.len());
        assert_eq!(f2.config(), f.config());
        assert_eq!(f2.node_count(), f.node_count());

        let query = [0.3f32, 0.9, 0.1, 1.0];
        assert_eq!(f.query(&query, 5).unwrap(), f2.query(&query, 5).unwrap());
        assert_eq!(f2.vector_of(3), f.vector_of(3));
    }

    #[test]
    fn test_save_load_empty() {
        let f = Forest::empty(IndexConfig::with_dim(4));

        let mut buf = Vec::new();
        save(&f, &mut buf).unwrap();

        let f2 = load(&mut buf.as_slice()).unwrap();
        assert!(f2.is_empty());
        assert!(f2.query(&[1.0, 0.0, 0.0, 0.0], 1).unwrap().is_empty());
    }

    #[test]
    fn test_load_invalid_magic() {
        let bad = b"NOPE";
        assert!(load(&mut bad.as_slice()).is_err());
    }

    fn header(dim: u32, item_count: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&FOREST_MAGIC);
        buf.extend_from_slice(&FOREST_VERSION.to_le_bytes());
        buf.extend_from_slice(&dim.to_le_bytes());
        buf.push(Metric::Angular.tag());
        buf.extend_from_slice(&10u32.to_le_bytes());
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&42u64.to_le_bytes());
        buf.extend_from_slice(&item_count.to_le_bytes());
        buf
    }

    #[test]
    fn test_load_rejects_huge_dimension() {
        let mut buf = header(u32::MAX, 1);
        buf.extend_from_slice(&7u64.to_le_bytes());
        buf.extend_from_slice(&1.0f32.to_le_bytes());
        assert!(matches!(
            load(&mut buf.as_slice()),
            Err(VecError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_load_huge_counts_fail_on_short_input() {
        // Claims 4 billion items but carries one.
        let mut buf = header(2, u32::MAX);
        buf.extend_from_slice(&7u64.to_le_bytes());
        buf.extend_from_slice(&1.0f32.to_le_bytes());
        buf.extend_from_slice(&0.0f32.to_le_bytes());
        assert!(matches!(load(&mut buf.as_slice()), Err(VecError::Io(_))));
    }

    #[test]
    fn test_load_truncated() {
        let mut buf = Vec::new();
        save(&sample(), &mut buf).unwrap();
        buf.truncate(buf.len() / 2);
        assert!(matches!(load(&mut buf.as_slice()), Err(VecError::Io(_))));
    }
}

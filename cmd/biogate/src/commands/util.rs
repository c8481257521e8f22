//! Utility functions for CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use biogate_engine::{EngineContext, MatchEngine, RedbIdentityStore};
use biogate_vecstore::{FileSnapshotStore, IndexManager, RedbVectorStore};
use redb::Database;
use tracing::warn;

use crate::Cli;
use crate::config::{ModalityConfig, load_config};

/// Database file holding both vector tables and the identity records.
pub const DB_FILE: &str = "biogate.redb";

/// Opens the engine over the data directory selected by `cli`.
pub fn open_engine(cli: &Cli) -> anyhow::Result<MatchEngine> {
    let cfg = load_config(cli.config.as_deref())?;
    let data_dir = cfg.resolve_data_dir(cli.data_dir.as_deref())?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("create data directory {}", data_dir.display()))?;

    let db_path = data_dir.join(DB_FILE);
    let db = Arc::new(
        Database::create(&db_path).with_context(|| format!("open {}", db_path.display()))?,
    );

    let ctx = EngineContext {
        face: open_index("face", &cfg.face, &db, &data_dir)?,
        voice: open_index("voice", &cfg.voice, &db, &data_dir)?,
        identities: Box::new(
            RedbIdentityStore::with_database(db.clone()).context("open identity store")?,
        ),
    };
    Ok(MatchEngine::new(
        ctx,
        Box::new(cfg.face.verifier),
        Box::new(cfg.voice.verifier),
    ))
}

fn open_index(
    name: &str,
    modality: &ModalityConfig,
    db: &Arc<Database>,
    data_dir: &Path,
) -> anyhow::Result<IndexManager> {
    let store = RedbVectorStore::with_database(db.clone(), name, modality.index.dim)
        .with_context(|| format!("open {name} vector store"))?;
    let snapshots = FileSnapshotStore::new(data_dir.join(format!("{name}.ann")));
    IndexManager::open(
        name,
        modality.index.clone(),
        Box::new(store),
        Box::new(snapshots),
    )
    .with_context(|| format!("open {name} index"))
}

/// Reads a feature vector stored as a JSON array of numbers.
pub fn read_vector(path: &Path) -> anyhow::Result<Vec<f32>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let vector: Vec<f32> =
        serde_json::from_str(&content).with_context(|| format!("parse {}", path.display()))?;
    if vector.is_empty() {
        anyhow::bail!("{}: empty vector", path.display());
    }
    Ok(vector)
}

/// Feature extractor over precomputed JSON vectors.
pub fn json_extractor(path: &Path) -> Option<Vec<f32>> {
    match read_vector(path) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("feature extraction failed: {e:#}");
            None
        }
    }
}

/// Prints a value as pretty JSON on stdout.
pub fn output_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

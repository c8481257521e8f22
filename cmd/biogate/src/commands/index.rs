//! Index maintenance commands.

use anyhow::Context as _;
use biogate_vecstore::{IndexManager, Metric};
use clap::{Args, ValueEnum};
use serde::Serialize;

use super::{open_engine, output_json};
use crate::Cli;

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Modality {
    Face,
    Voice,
    Both,
}

/// Rebuild index snapshots from their vector stores.
#[derive(Args)]
pub struct IndexCommand {
    /// Which index to rebuild
    #[arg(long, value_enum, default_value = "both")]
    modality: Modality,
}

impl IndexCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let engine = open_engine(cli)?;
        let ctx = engine.context();
        if self.modality != Modality::Voice {
            ctx.face.rebuild().context("rebuild face index")?;
        }
        if self.modality != Modality::Face {
            ctx.voice.rebuild().context("rebuild voice index")?;
        }
        output_json(&Stats {
            face: IndexStats::of(&ctx.face),
            voice: IndexStats::of(&ctx.voice),
            identities: ctx.identities.list_identities()?.len(),
        })
    }
}

#[derive(Serialize)]
struct IndexStats {
    dim: usize,
    metric: Metric,
    trees: usize,
    nodes: usize,
    vectors: usize,
}

impl IndexStats {
    fn of(index: &IndexManager) -> Self {
        let snapshot = index.snapshot();
        Self {
            dim: index.dim(),
            metric: index.config().metric,
            trees: index.config().num_trees,
            nodes: snapshot.node_count(),
            vectors: snapshot.len(),
        }
    }
}

#[derive(Serialize)]
struct Stats {
    face: IndexStats,
    voice: IndexStats,
    identities: usize,
}

pub fn stats(cli: &Cli) -> anyhow::Result<()> {
    let engine = open_engine(cli)?;
    let ctx = engine.context();
    output_json(&Stats {
        face: IndexStats::of(&ctx.face),
        voice: IndexStats::of(&ctx.voice),
        identities: ctx
            .identities
            .list_identities()
            .context("list identities")?
            .len(),
    })
}

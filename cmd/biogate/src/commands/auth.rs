//! Authentication command.

use std::path::PathBuf;

use anyhow::Context as _;
use biogate_engine::{IdentityRecord, MatchOutcome};
use clap::Args;
use serde::Serialize;

use super::{json_extractor, open_engine, output_json};
use crate::Cli;

/// Authorize or enroll using precomputed face and voice vectors.
#[derive(Args)]
pub struct AuthCommand {
    /// Face vector file (JSON array)
    #[arg(long)]
    face: PathBuf,
    /// Voice vector file (JSON array)
    #[arg(long)]
    voice: PathBuf,
}

#[derive(Serialize)]
struct AuthReport {
    #[serde(flatten)]
    outcome: MatchOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity: Option<IdentityRecord>,
}

impl AuthCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let engine = open_engine(cli)?
            .with_extractors(Box::new(json_extractor), Box::new(json_extractor));

        let outcome = engine.authenticate_media(&self.face, &self.voice);
        let identity = match outcome.identity() {
            Some(id) => engine.identity(id).context("load identity record")?,
            None => None,
        };
        output_json(&AuthReport { outcome, identity })
    }
}

//! Identity record commands.

use anyhow::Context as _;
use biogate_engine::{IdentityRecord, IdentityUpdate};
use clap::Args;
use serde::Serialize;

use super::{open_engine, output_json};
use crate::Cli;

/// Update the name of an identity.
#[derive(Args)]
pub struct IdentityCommand {
    /// Identity ID
    id: u64,
    /// First name
    #[arg(long)]
    firstname: Option<String>,
    /// Last name
    #[arg(long)]
    lastname: Option<String>,
}

impl IdentityCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let engine = open_engine(cli)?;
        let update = IdentityUpdate {
            firstname: self.firstname.clone(),
            lastname: self.lastname.clone(),
        };
        let record = engine
            .context()
            .identities
            .update_identity(self.id, &update)
            .context("update identity")?
            .ok_or_else(|| anyhow::anyhow!("identity {} not found", self.id))?;
        output_json(&record)
    }
}

#[derive(Serialize)]
struct IdentityReport {
    #[serde(flatten)]
    record: IdentityRecord,
    in_face_index: bool,
    in_voice_index: bool,
}

pub fn remove(cli: &Cli, id: u64) -> anyhow::Result<()> {
    let engine = open_engine(cli)?;
    engine
        .remove_identity(id)
        .with_context(|| format!("remove identity {id}"))?;
    output_json(&serde_json::json!({ "removed": id }))
}

pub fn list(cli: &Cli) -> anyhow::Result<()> {
    let engine = open_engine(cli)?;
    let records = engine
        .context()
        .identities
        .list_identities()
        .context("list identities")?;
    output_json(&records)
}

pub fn show(cli: &Cli, id: u64) -> anyhow::Result<()> {
    let engine = open_engine(cli)?;
    let record = engine
        .identity(id)
        .context("load identity record")?
        .ok_or_else(|| anyhow::anyhow!("identity {id} not found"))?;
    let ctx = engine.context();
    output_json(&IdentityReport {
        record,
        in_face_index: ctx.face.contains(id),
        in_voice_index: ctx.voice.contains(id),
    })
}

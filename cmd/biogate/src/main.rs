//! biogate - face and voice identity matching from the command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{AuthCommand, IdentityCommand, IndexCommand};

/// biogate - authorize or enroll people by face and voice.
///
/// Feature vectors are read from JSON files (a flat array of numbers).
/// Data lives in ~/.biogate/data unless --data-dir or the config file
/// says otherwise.
#[derive(Parser)]
#[command(name = "biogate")]
#[command(about = "Dual-modal (face + voice) identity matching")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.biogate/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory (overrides the config file)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Authorize a person, or enroll them if nobody matches
    Auth(AuthCommand),
    /// Remove an identity from both indexes and the identity store
    Remove {
        /// Identity ID
        id: u64,
    },
    /// List registered identities
    List,
    /// Show one identity
    Show {
        /// Identity ID
        id: u64,
    },
    /// Set the name of an identity
    Update(IdentityCommand),
    /// Rebuild both index snapshots from their stores
    Rebuild(IndexCommand),
    /// Print index and identity counts
    Stats,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Auth(cmd) => cmd.run(&cli),
        Commands::Remove { id } => commands::remove(&cli, *id),
        Commands::List => commands::list(&cli),
        Commands::Show { id } => commands::show(&cli, *id),
        Commands::Update(cmd) => cmd.run(&cli),
        Commands::Rebuild(cmd) => cmd.run(&cli),
        Commands::Stats => commands::stats(&cli),
    }
}

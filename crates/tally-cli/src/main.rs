//! `tally`: audit and maintenance tool for the Tally guarantee ledger.
//!
//! # Usage
//!
//! ```text
//! tally events 42
//! tally state 42 --before 1017
//! tally append 42 --type status_change --subtype status_change --state live.json
//! tally import-legacy archive.jsonl
//! ```

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use tally_core::{Ledger, provider::MemorySnapshotProvider};
use tally_store_sqlite::SqliteLedgerStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::{commands::Command, config::TallyConfig};

#[derive(Parser, Debug)]
#[command(name = "tally", author, version, about = "Audit and maintenance tool for the Tally guarantee ledger")]
struct Cli {
  /// Path to the TOML configuration file (default: ./tally.toml if present).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let cfg = TallyConfig::load(cli.config.as_deref())?;

  let store_path = cfg.resolved_store_path();
  if let Some(parent) = store_path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  let store = SqliteLedgerStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let ledger = Ledger::new(store, MemorySnapshotProvider::new(), cfg.policy());
  cli.command.run(&ledger).await
}

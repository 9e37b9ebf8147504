//! `tally.toml` layered with `TALLY_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use tally_core::policy::{AnchorPolicy, DEFAULT_ANCHOR_INTERVAL};

const DEFAULT_CONFIG_FILE: &str = "tally.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TallyConfig {
  /// SQLite file holding the ledger. A leading `~/` is expanded.
  #[serde(default = "default_store_path")]
  pub store_path:      PathBuf,
  /// Every n-th event of an aggregate is stored as a full snapshot; `0`
  /// disables periodic anchors.
  #[serde(default = "default_anchor_interval")]
  pub anchor_interval: u32,
}

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/tally/ledger.sqlite3") }

fn default_anchor_interval() -> u32 { DEFAULT_ANCHOR_INTERVAL }

impl TallyConfig {
  /// Read configuration. An explicit `path` must exist; the default
  /// `tally.toml` is optional.
  pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
    let file = match path {
      Some(path) => config::File::from(path).required(true),
      None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };
    Self::from_sources(
      config::Config::builder()
        .add_source(file)
        .add_source(config::Environment::with_prefix("TALLY")),
    )
  }

  fn from_sources(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
  ) -> anyhow::Result<Self> {
    builder
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise TallyConfig")
  }

  pub fn policy(&self) -> AnchorPolicy { AnchorPolicy::with_interval(self.anchor_interval) }

  pub fn resolved_store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

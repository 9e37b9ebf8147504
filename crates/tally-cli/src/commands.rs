//! Subcommand implementations.

use std::{
  io::{self, Read as _},
  path::{Path, PathBuf},
};

use anyhow::{Context as _, bail};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::Deserialize;
use serde_json::Value;
use tally_core::{
  AppendRequest, Ledger,
  event::{AggregateId, Encoding, EventId, EventKind, EventSubtype, EventType, NewHistoryEvent},
  legacy,
  provider::MemorySnapshotProvider,
  state::AggregateState,
};
use tally_store_sqlite::SqliteLedgerStore;
use tracing::{info, warn};

pub type CliLedger = Ledger<SqliteLedgerStore, MemorySnapshotProvider>;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// List the events of a guarantee, newest first, as JSON lines.
  Events { aggregate: AggregateId },

  /// Print one event as pretty JSON.
  Show { event: EventId },

  /// Reconstruct the state of a guarantee.
  State {
    aggregate: AggregateId,
    /// State after this event.
    #[arg(long, value_name = "EVENT", conflicts_with = "before")]
    up_to:     Option<EventId>,
    /// State immediately before this event.
    #[arg(long, value_name = "EVENT")]
    before:    Option<EventId>,
  },

  /// Record an event.
  Append {
    aggregate:    AggregateId,
    #[arg(long = "type", value_name = "TYPE")]
    event_type:   String,
    #[arg(long)]
    subtype:      Option<String>,
    /// JSON object with the state to record (`-` reads stdin).
    #[arg(long, value_name = "FILE")]
    state:        PathBuf,
    /// Document to store verbatim with the event.
    #[arg(long, value_name = "FILE")]
    artifact:     Option<PathBuf>,
    /// Free-form JSON details.
    #[arg(long, value_name = "JSON")]
    details:      Option<String>,
    #[arg(long)]
    force_anchor: bool,
    #[arg(long = "by", value_name = "ACTOR")]
    created_by:   Option<String>,
  },

  /// Import a JSON-lines archive of pre-hybrid history rows.
  ImportLegacy { file: PathBuf },

  /// Recompute the digest of an event's stored artifact.
  VerifyArtifact { event: EventId },
}

impl Command {
  pub async fn run(self, ledger: &CliLedger) -> anyhow::Result<()> {
    match self {
      Self::Events { aggregate } => {
        for event in ledger.list_events(aggregate).await? {
          println!("{}", serde_json::to_string(&event)?);
        }
      }

      Self::Show { event } => {
        let Some(event) = ledger.get_event(event).await? else {
          bail!("event {event} not found");
        };
        println!("{}", serde_json::to_string_pretty(&event)?);
      }

      Self::State { aggregate, up_to, before } => {
        let state = match (up_to, before) {
          (Some(id), _) => ledger.state_up_to(aggregate, id).await?,
          (None, Some(id)) => ledger.state_before(aggregate, id).await?,
          (None, None) => ledger.current_state(aggregate).await?,
        };
        println!("{}", serde_json::to_string_pretty(&state)?);
      }

      Self::Append {
        aggregate,
        event_type,
        subtype,
        state,
        artifact,
        details,
        force_anchor,
        created_by,
      } => {
        let kind = EventKind::new(
          EventType::from(event_type),
          subtype.map(EventSubtype::from),
        );
        let mut request = AppendRequest::new(aggregate, kind).with_state(read_state(&state)?);
        if let Some(path) = artifact {
          request.artifact = Some(
            std::fs::read_to_string(&path)
              .with_context(|| format!("reading artifact {}", path.display()))?,
          );
        }
        if let Some(details) = details {
          request.details = serde_json::from_str(&details).context("parsing --details")?;
        }
        request.force_anchor = force_anchor;
        request.created_by = created_by;

        let event = ledger.append(request).await?;
        println!("{}", serde_json::to_string(&event)?);
      }

      Self::ImportLegacy { file } => import_legacy(ledger, &file).await?,

      Self::VerifyArtifact { event } => {
        let Some(stored) = ledger.get_event(event).await? else {
          bail!("event {event} not found");
        };
        let Some(artifact) = stored.artifact else {
          bail!("event {event} has no artifact");
        };
        if !artifact.verify() {
          bail!("artifact of event {event} does not match its digest {}", artifact.sha256);
        }
        println!("ok {}", artifact.sha256);
      }
    }
    Ok(())
  }
}

fn read_state(path: &Path) -> anyhow::Result<AggregateState> {
  let text = if path == Path::new("-") {
    let mut text = String::new();
    io::stdin().read_to_string(&mut text)?;
    text
  } else {
    std::fs::read_to_string(path).with_context(|| format!("reading state {}", path.display()))?
  };
  serde_json::from_str(&text).context("state must be a flat JSON object of scalars")
}

// ─── Legacy import ───────────────────────────────────────────────────────────

/// One line of a legacy archive.
#[derive(Debug, Deserialize)]
struct LegacyRecord {
  aggregate_id:  AggregateId,
  event_type:    String,
  #[serde(default)]
  event_subtype: Option<String>,
  snapshot:      Value,
  #[serde(default)]
  details:       Value,
  created_at:    DateTime<Utc>,
  #[serde(default)]
  created_by:    Option<String>,
}

impl LegacyRecord {
  fn into_new_event(self) -> NewHistoryEvent {
    NewHistoryEvent {
      aggregate_id: self.aggregate_id,
      kind:         EventKind::new(
        EventType::from(self.event_type),
        self.event_subtype.map(EventSubtype::from),
      ),
      details:      self.details,
      encoding:     Encoding::LegacyBeforeState { raw_snapshot: self.snapshot },
      artifact:     None,
      created_by:   self.created_by,
    }
  }
}

fn read_archive(reader: impl io::BufRead) -> anyhow::Result<Vec<LegacyRecord>> {
  let mut records = Vec::new();
  for (index, line) in reader.lines().enumerate() {
    let line = line?;
    if line.trim().is_empty() {
      continue;
    }
    let record: LegacyRecord = serde_json::from_str(&line)
      .with_context(|| format!("line {}: not a legacy record", index + 1))?;
    records.push(record);
  }
  // Ids are assigned in insertion order, so insert oldest first. The sort is
  // stable, keeping archive order for equal timestamps.
  records.sort_by_key(|r| r.created_at);
  Ok(records)
}

async fn import_legacy(ledger: &CliLedger, path: &Path) -> anyhow::Result<()> {
  let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
  let records = read_archive(io::BufReader::new(file))?;

  let mut issues = 0;
  for record in records {
    let normalized = legacy::normalize(&record.snapshot, &record.details);
    issues += normalized.skipped.len();
    for issue in &normalized.skipped {
      warn!(aggregate_id = %record.aggregate_id, %issue, "legacy row will be partially normalised");
    }

    let (aggregate_id, created_at) = (record.aggregate_id, record.created_at);
    ledger
      .import_archived(record.into_new_event(), created_at)
      .await
      .with_context(|| format!("importing legacy row of aggregate {aggregate_id}"))?;
  }

  info!(path = %path.display(), issues, "legacy archive imported");
  Ok(())
}

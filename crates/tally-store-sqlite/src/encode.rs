//! Encoding and decoding helpers between ledger types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings. States, patches and details are compact
//! JSON. Codes (event type, subtype, anchor reason) are their snake_case
//! names.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tally_core::{
  artifact::Artifact,
  event::{
    AggregateId, Encoding, EventId, EventKind, EventSubtype, EventType, HistoryEvent,
    NewHistoryEvent,
  },
  patch::Patch,
  policy::AnchorReason,
  state::AggregateState,
};
use tracing::warn;

use crate::{Error, Result};

/// Column list shared by every `SELECT` that produces a [`RawHistoryEvent`].
pub const EVENT_COLUMNS: &str = "id, aggregate_id, event_type, event_subtype, details, \
   anchor_snapshot, patch, legacy_snapshot, anchor_reason, artifact, artifact_sha256, \
   created_at, created_by";

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Free-form JSON ──────────────────────────────────────────────────────────

/// Old rows may hold text that is not JSON at all; keep it as a string so
/// nothing is lost.
fn decode_lenient(s: String) -> Value {
  serde_json::from_str(&s).unwrap_or(Value::String(s))
}

// ─── Insert ──────────────────────────────────────────────────────────────────

/// Column values for one `INSERT INTO history_events`.
pub struct EncodedEvent {
  pub aggregate_id:    i64,
  pub event_type:      String,
  pub event_subtype:   Option<String>,
  pub details:         String,
  pub anchor_snapshot: Option<String>,
  pub patch:           Option<String>,
  pub legacy_snapshot: Option<String>,
  pub is_anchor:       bool,
  pub anchor_reason:   Option<&'static str>,
  pub artifact:        Option<String>,
  pub artifact_sha256: Option<String>,
  pub created_at:      String,
  pub created_by:      Option<String>,
}

impl EncodedEvent {
  pub fn new(event: &NewHistoryEvent, created_at: DateTime<Utc>) -> Result<Self> {
    let (anchor_snapshot, patch, legacy_snapshot, anchor_reason) = match &event.encoding {
      Encoding::Anchor { snapshot, reason } => {
        (Some(serde_json::to_string(snapshot)?), None, None, Some(reason.as_str()))
      }
      Encoding::Patch { ops } => (
        None,
        Some(serde_json::to_string(ops)?),
        None,
        Some(AnchorReason::PatchOnly.as_str()),
      ),
      Encoding::LegacyBeforeState { raw_snapshot } => {
        (None, None, Some(serde_json::to_string(raw_snapshot)?), None)
      }
    };

    Ok(Self {
      aggregate_id: event.aggregate_id.0,
      event_type: event.kind.event_type.as_str().to_owned(),
      event_subtype: event.kind.subtype.as_ref().map(|s| s.as_str().to_owned()),
      details: serde_json::to_string(&event.details)?,
      is_anchor: anchor_snapshot.is_some(),
      anchor_snapshot,
      patch,
      legacy_snapshot,
      anchor_reason,
      artifact: event.artifact.as_ref().map(|a| a.content.clone()),
      artifact_sha256: event.artifact.as_ref().map(|a| a.sha256.clone()),
      created_at: encode_dt(created_at),
      created_by: event.created_by.clone(),
    })
  }

  /// Insert the row and return its assigned id.
  pub fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<i64> {
    conn.execute(
      "INSERT INTO history_events (
         aggregate_id, event_type, event_subtype, details,
         anchor_snapshot, patch, legacy_snapshot, is_anchor, anchor_reason,
         artifact, artifact_sha256, created_at, created_by
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
      rusqlite::params![
        self.aggregate_id,
        self.event_type,
        self.event_subtype,
        self.details,
        self.anchor_snapshot,
        self.patch,
        self.legacy_snapshot,
        self.is_anchor,
        self.anchor_reason,
        self.artifact,
        self.artifact_sha256,
        self.created_at,
        self.created_by,
      ],
    )?;
    Ok(conn.last_insert_rowid())
  }
}

// ─── Row type ────────────────────────────────────────────────────────────────

/// Raw values read directly from a `history_events` row, in
/// [`EVENT_COLUMNS`] order.
pub struct RawHistoryEvent {
  pub id:              i64,
  pub aggregate_id:    i64,
  pub event_type:      String,
  pub event_subtype:   Option<String>,
  pub details:         String,
  pub anchor_snapshot: Option<String>,
  pub patch:           Option<String>,
  pub legacy_snapshot: Option<String>,
  pub anchor_reason:   Option<String>,
  pub artifact:        Option<String>,
  pub artifact_sha256: Option<String>,
  pub created_at:      String,
  pub created_by:      Option<String>,
}

impl RawHistoryEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(0)?,
      aggregate_id:    row.get(1)?,
      event_type:      row.get(2)?,
      event_subtype:   row.get(3)?,
      details:         row.get(4)?,
      anchor_snapshot: row.get(5)?,
      patch:           row.get(6)?,
      legacy_snapshot: row.get(7)?,
      anchor_reason:   row.get(8)?,
      artifact:        row.get(9)?,
      artifact_sha256: row.get(10)?,
      created_at:      row.get(11)?,
      created_by:      row.get(12)?,
    })
  }

  fn decode_error(&self, message: impl Into<String>) -> Error {
    Error::Decode { event_id: self.id, message: message.into() }
  }

  fn decode_encoding(&mut self) -> Result<Encoding> {
    if let Some(snapshot) = self.anchor_snapshot.take() {
      if self.patch.is_some() || self.legacy_snapshot.is_some() {
        warn!(event_id = self.id, "row carries more than one encoding; using the anchor");
      }
      let snapshot: AggregateState = serde_json::from_str(&snapshot)?;
      let reason = self
        .anchor_reason
        .as_deref()
        .ok_or_else(|| self.decode_error("anchor without anchor_reason"))?
        .parse::<AnchorReason>()
        .map_err(|e| self.decode_error(format!("anchor_reason: {e}")))?;
      return Ok(Encoding::Anchor { snapshot, reason });
    }

    if let Some(ops) = self.patch.take() {
      let ops: Patch = serde_json::from_str(&ops)?;
      return Ok(Encoding::Patch { ops });
    }

    if let Some(raw) = self.legacy_snapshot.take() {
      return Ok(Encoding::LegacyBeforeState { raw_snapshot: decode_lenient(raw) });
    }

    warn!(event_id = self.id, "row carries no encoding; treating it as an empty patch");
    Ok(Encoding::Patch { ops: Patch::default() })
  }

  pub fn into_event(mut self) -> Result<HistoryEvent> {
    let encoding = self.decode_encoding()?;

    let artifact = match (self.artifact, self.artifact_sha256) {
      (Some(content), Some(sha256)) => Some(Artifact { content, sha256 }),
      (None, None) => None,
      _ => {
        return Err(Error::Decode {
          event_id: self.id,
          message:  "artifact without digest".into(),
        });
      }
    };

    Ok(HistoryEvent {
      id: EventId(self.id),
      aggregate_id: AggregateId(self.aggregate_id),
      kind: EventKind::new(
        EventType::from(self.event_type),
        self.event_subtype.map(EventSubtype::from),
      ),
      details: decode_lenient(self.details),
      encoding,
      artifact,
      created_at: decode_dt(&self.created_at)?,
      created_by: self.created_by,
    })
  }
}

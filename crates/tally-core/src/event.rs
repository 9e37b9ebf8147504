//! History events, the immutable rows of the ledger.
//!
//! Every event carries exactly one [`Encoding`]: a full anchor snapshot, a
//! patch against the previous known state, or a legacy snapshot that predates
//! the hybrid format. Reconstruction matches on it exhaustively.

use std::{fmt, num::ParseIntError, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::EnumString;

use crate::{
  artifact::Artifact,
  patch::Patch,
  policy::AnchorReason,
  state::AggregateState,
  Result,
};

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// The guarantee an event belongs to.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AggregateId(pub i64);

/// Store-assigned event id. Strictly increasing; gaps are allowed.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl fmt::Display for AggregateId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

impl fmt::Display for EventId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

impl FromStr for AggregateId {
  type Err = ParseIntError;

  fn from_str(s: &str) -> Result<Self, Self::Err> { s.parse().map(Self) }
}

impl FromStr for EventId {
  type Err = ParseIntError;

  fn from_str(s: &str) -> Result<Self, Self::Err> { s.parse().map(Self) }
}

// ─── Classification ──────────────────────────────────────────────────────────

/// Coarse event classification. Unrecognised codes from old rows are kept
/// verbatim in [`EventType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(from = "String", into = "String")]
pub enum EventType {
  Import,
  Modified,
  StatusChange,
  Release,
  Reopened,
  #[strum(default)]
  Other(String),
}

impl EventType {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Import => "import",
      Self::Modified => "modified",
      Self::StatusChange => "status_change",
      Self::Release => "release",
      Self::Reopened => "reopened",
      Self::Other(code) => code,
    }
  }
}

/// Fine-grained event classification.
#[derive(Debug, Clone, PartialEq, Eq, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(from = "String", into = "String")]
pub enum EventSubtype {
  Excel,
  Manual,
  SmartPaste,
  DuplicateImport,
  Extension,
  Reduction,
  Release,
  Reopened,
  ManualOverride,
  SupplierChange,
  BankChange,
  StatusChange,
  AutoMatch,
  #[strum(default)]
  Other(String),
}

impl EventSubtype {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Excel => "excel",
      Self::Manual => "manual",
      Self::SmartPaste => "smart_paste",
      Self::DuplicateImport => "duplicate_import",
      Self::Extension => "extension",
      Self::Reduction => "reduction",
      Self::Release => "release",
      Self::Reopened => "reopened",
      Self::ManualOverride => "manual_override",
      Self::SupplierChange => "supplier_change",
      Self::BankChange => "bank_change",
      Self::StatusChange => "status_change",
      Self::AutoMatch => "auto_match",
      Self::Other(code) => code,
    }
  }
}

macro_rules! string_codec {
  ($ty:ident) => {
    impl From<String> for $ty {
      fn from(code: String) -> Self {
        code.parse().unwrap_or(Self::Other(code))
      }
    }

    impl From<$ty> for String {
      fn from(value: $ty) -> Self {
        match value {
          $ty::Other(code) => code,
          known => known.as_str().to_owned(),
        }
      }
    }

    impl fmt::Display for $ty {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
    }
  };
}

string_codec!(EventType);
string_codec!(EventSubtype);

/// The type/subtype pair of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventKind {
  pub event_type: EventType,
  pub subtype:    Option<EventSubtype>,
}

impl EventKind {
  pub fn new(event_type: EventType, subtype: impl Into<Option<EventSubtype>>) -> Self {
    Self { event_type, subtype: subtype.into() }
  }

  /// Milestones are always stored as anchors regardless of cadence.
  pub fn is_milestone(&self) -> bool {
    let type_is_milestone = matches!(
      self.event_type,
      EventType::Import | EventType::Release | EventType::Reopened
    );
    let subtype_is_milestone = matches!(
      self.subtype,
      Some(
        EventSubtype::DuplicateImport
          | EventSubtype::Extension
          | EventSubtype::Reduction
          | EventSubtype::Release
          | EventSubtype::Reopened
          | EventSubtype::ManualOverride
      )
    );
    type_is_milestone || subtype_is_milestone
  }
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.subtype {
      Some(subtype) => write!(f, "{}/{}", self.event_type, subtype),
      None => write!(f, "{}", self.event_type),
    }
  }
}

// ─── Encoding ────────────────────────────────────────────────────────────────

/// How an event records the aggregate's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum Encoding {
  /// A complete, self-sufficient snapshot of the state after this event.
  Anchor {
    snapshot: AggregateState,
    reason:   AnchorReason,
  },
  /// The fields that changed since the previous known state.
  Patch { ops: Patch },
  /// A pre-hybrid row: an ambiguous snapshot, normalised on read to the
  /// state immediately before the event.
  LegacyBeforeState { raw_snapshot: Value },
}

impl Encoding {
  /// Whether replaying this event discards the running state entirely.
  pub fn replaces_state(&self) -> bool {
    matches!(self, Self::Anchor { .. } | Self::LegacyBeforeState { .. })
  }
}

// ─── Details ─────────────────────────────────────────────────────────────────

/// One field-level change as recorded in an event's `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
  pub field:     String,
  pub old_value: Value,
  pub new_value: Value,
  /// What caused the change, e.g. `"manual"`, `"import"`, `"auto_match"`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub trigger:   Option<String>,
}

impl FieldChange {
  pub fn new(
    field: impl Into<String>,
    old_value: impl Into<Value>,
    new_value: impl Into<Value>,
  ) -> Self {
    Self {
      field:     field.into(),
      old_value: old_value.into(),
      new_value: new_value.into(),
      trigger:   None,
    }
  }

  pub fn triggered_by(mut self, trigger: impl Into<String>) -> Self {
    self.trigger = Some(trigger.into());
    self
  }
}

/// The `{id, name}` shape used for supplier and bank references in details.
pub fn reference_value(id: Option<i64>, name: Option<&str>) -> Value {
  serde_json::json!({ "id": id, "name": name })
}

/// Producer-side builder for an event's free-form `details`.
///
/// Reconstruction of hybrid rows never reads details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDetails {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub changes: Vec<FieldChange>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reason:  Option<String>,
  #[serde(flatten)]
  pub extra:   serde_json::Map<String, Value>,
}

impl EventDetails {
  pub fn new() -> Self { Self::default() }

  pub fn with_change(mut self, change: FieldChange) -> Self {
    self.changes.push(change);
    self
  }

  pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
    self.reason = Some(reason.into());
    self
  }

  pub fn into_value(self) -> Result<Value> { Ok(serde_json::to_value(self)?) }
}

// ─── HistoryEvent ────────────────────────────────────────────────────────────

/// An immutable, stored ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
  pub id:           EventId,
  pub aggregate_id: AggregateId,
  pub kind:         EventKind,
  pub details:      Value,
  pub encoding:     Encoding,
  pub artifact:     Option<Artifact>,
  /// Store-assigned; never changes after creation.
  pub created_at:   DateTime<Utc>,
  pub created_by:   Option<String>,
}

impl HistoryEvent {
  pub fn is_anchor(&self) -> bool { matches!(self.encoding, Encoding::Anchor { .. }) }

  pub fn is_legacy(&self) -> bool {
    matches!(self.encoding, Encoding::LegacyBeforeState { .. })
  }

  /// Why this row was or was not stored as an anchor. Legacy rows predate the
  /// policy and report `None`.
  pub fn anchor_reason(&self) -> Option<AnchorReason> {
    match &self.encoding {
      Encoding::Anchor { reason, .. } => Some(*reason),
      Encoding::Patch { .. } => Some(AnchorReason::PatchOnly),
      Encoding::LegacyBeforeState { .. } => None,
    }
  }
}

/// Input to [`crate::store::LedgerStore`] writes. The id and `created_at` are
/// always assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEvent {
  pub aggregate_id: AggregateId,
  pub kind:         EventKind,
  pub details:      Value,
  pub encoding:     Encoding,
  pub artifact:     Option<Artifact>,
  pub created_by:   Option<String>,
}

impl NewHistoryEvent {
  pub fn into_event(self, id: EventId, created_at: DateTime<Utc>) -> HistoryEvent {
    HistoryEvent {
      id,
      aggregate_id: self.aggregate_id,
      kind: self.kind,
      details: self.details,
      encoding: self.encoding,
      artifact: self.artifact,
      created_at,
      created_by: self.created_by,
    }
  }
}

//! Error types for `tally-core`.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::event::AggregateId;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// The snapshot provider has no live state for the aggregate and the caller
  /// did not supply one explicitly.
  #[error("aggregate {0} has no live state")]
  AggregateNotFound(AggregateId),

  /// The event could not be persisted. The caller's domain mutation must be
  /// rolled back.
  #[error("failed to persist history event: {0}")]
  StorageWrite(#[source] BoxError),

  #[error("failed to read history: {0}")]
  StorageRead(#[source] BoxError),

  /// An archived row would land after history it predates, and would then
  /// replace newer state on replay.
  #[error(
    "archived row of aggregate {aggregate_id} dated {created_at} predates its newest event ({newest})"
  )]
  ImportOutOfOrder {
    aggregate_id: AggregateId,
    created_at:   DateTime<Utc>,
    newest:       DateTime<Utc>,
  },

  #[error("state snapshot provider failed: {0}")]
  SnapshotProvider(#[source] BoxError),

  #[error("artifact rendering failed: {0}")]
  Render(#[source] BoxError),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A legacy row that could not be fully normalised.
///
/// These are never propagated: the normaliser skips the offending field and
/// reports the issue alongside its best-effort result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedState {
  #[error("legacy snapshot is not a JSON object")]
  SnapshotNotObject,

  #[error("legacy snapshot field {field:?} is not a scalar")]
  NonScalarSnapshotField { field: String },

  #[error("legacy details are not valid JSON")]
  UnreadableDetails,

  #[error("details.changes is not a list")]
  ChangesNotList,

  #[error("change #{index} is not an object with a string `field`")]
  UnreadableChange { index: usize },

  #[error("change #{index} on {field:?} has no `old_value`")]
  MissingOldValue { index: usize, field: String },

  #[error("change #{index} targets {field:?}, which is absent from the legacy snapshot")]
  FieldNotInSnapshot { index: usize, field: String },

  #[error("change #{index} on {field:?} has an unsupported old_value shape")]
  UnsupportedShape { index: usize, field: String },
}

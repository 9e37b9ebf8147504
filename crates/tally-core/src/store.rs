//! The `LedgerStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `tally-store-sqlite`).
//! [`crate::Ledger`] depends on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  event::{AggregateId, EventId, HistoryEvent, NewHistoryEvent},
  reconstruct,
  state::AggregateState,
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Which events of an aggregate a replay covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRange {
  All,
  /// Events with id ≤ the given id.
  UpTo(EventId),
  /// Events with id < the given id.
  Before(EventId),
}

impl EventRange {
  pub fn contains(&self, id: EventId) -> bool {
    match self {
      Self::All => true,
      Self::UpTo(bound) => id <= *bound,
      Self::Before(bound) => id < *bound,
    }
  }

  /// Inclusive upper bound on event ids.
  pub fn upper_bound(&self) -> i64 {
    match self {
      Self::All => i64::MAX,
      Self::UpTo(bound) => bound.0,
      Self::Before(bound) => bound.0.saturating_sub(1),
    }
  }
}

/// What an append sees of the aggregate's existing history.
#[derive(Debug, Clone, Default)]
pub struct PriorHistory {
  /// Number of events already stored for the aggregate.
  pub event_count: u64,
  /// Ascending replay window covering the whole history.
  pub replay:      Vec<HistoryEvent>,
}

impl PriorHistory {
  /// The most recent known state; empty when there is no history.
  pub fn latest_state(&self) -> AggregateState { reconstruct::replay(&self.replay) }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a ledger storage backend.
///
/// Rows are append-only: no method updates or deletes an event. Each event is
/// written as one atomic unit, and every read observes a consistent prefix of
/// the event sequence.
pub trait LedgerStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Append one event built from the aggregate's prior history.
  ///
  /// The backend reads the history, calls `build`, and inserts the result as
  /// a single unit so no other append to the same store interleaves.
  fn append_with<F>(
    &self,
    aggregate_id: AggregateId,
    build: F,
  ) -> impl Future<Output = Result<HistoryEvent, Self::Error>> + Send + '_
  where
    F: FnOnce(PriorHistory) -> NewHistoryEvent + Send + 'static;

  /// Insert an archived row verbatim, keeping its original timestamp. Used to
  /// bring legacy history into the ledger.
  fn import_event(
    &self,
    event: NewHistoryEvent,
    created_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<HistoryEvent, Self::Error>> + Send + '_;

  /// Ascending events in `range` needed to replay it. Backends may omit rows
  /// before the last anchor or legacy row in range.
  fn replay_window(
    &self,
    aggregate_id: AggregateId,
    range: EventRange,
  ) -> impl Future<Output = Result<Vec<HistoryEvent>, Self::Error>> + Send + '_;

  /// All events of an aggregate, newest first.
  fn list_events(
    &self,
    aggregate_id: AggregateId,
  ) -> impl Future<Output = Result<Vec<HistoryEvent>, Self::Error>> + Send + '_;

  /// Retrieve an event by id. Returns `None` if not found.
  fn get_event(
    &self,
    event_id: EventId,
  ) -> impl Future<Output = Result<Option<HistoryEvent>, Self::Error>> + Send + '_;
}

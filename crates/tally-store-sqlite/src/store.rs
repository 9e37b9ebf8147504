//! [`SqliteLedgerStore`], the SQLite implementation of [`LedgerStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use tally_core::{
  event::{AggregateId, EventId, HistoryEvent, NewHistoryEvent},
  store::{EventRange, LedgerStore, PriorHistory},
};

use crate::{
  encode::{EncodedEvent, RawHistoryEvent, EVENT_COLUMNS},
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A ledger backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteLedgerStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteLedgerStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn insert(&self, event: NewHistoryEvent, created_at: DateTime<Utc>) -> Result<HistoryEvent> {
    let encoded = EncodedEvent::new(&event, created_at)?;
    let id = self.conn.call(move |conn| Ok(encoded.insert(conn)?)).await?;
    Ok(event.into_event(EventId(id), created_at))
  }
}

// ─── Queries ─────────────────────────────────────────────────────────────────

fn decode_all(rows: Vec<RawHistoryEvent>) -> Result<Vec<HistoryEvent>> {
  rows.into_iter().map(RawHistoryEvent::into_event).collect()
}

/// Ascending rows of `aggregate_id` with `id <= upper`, starting at the last
/// anchor or legacy row in that range.
fn query_window(
  conn: &rusqlite::Connection,
  aggregate_id: AggregateId,
  upper: i64,
) -> rusqlite::Result<Vec<RawHistoryEvent>> {
  let sql = format!(
    "SELECT {EVENT_COLUMNS} FROM history_events
     WHERE aggregate_id = ?1 AND id <= ?2
       AND id >= COALESCE((
         SELECT MAX(id) FROM history_events
         WHERE aggregate_id = ?1 AND id <= ?2
           AND (anchor_snapshot IS NOT NULL OR legacy_snapshot IS NOT NULL)
       ), 0)
     ORDER BY id ASC"
  );
  let mut stmt = conn.prepare_cached(&sql)?;
  let rows = stmt
    .query_map(rusqlite::params![aggregate_id.0, upper], RawHistoryEvent::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

fn count_events(conn: &rusqlite::Connection, aggregate_id: AggregateId) -> rusqlite::Result<u64> {
  let count: i64 = conn.query_row(
    "SELECT COUNT(*) FROM history_events WHERE aggregate_id = ?1",
    rusqlite::params![aggregate_id.0],
    |r| r.get(0),
  )?;
  Ok(u64::try_from(count).unwrap_or_default())
}

// ─── LedgerStore impl ────────────────────────────────────────────────────────

impl LedgerStore for SqliteLedgerStore {
  type Error = Error;

  async fn append_with<F>(&self, aggregate_id: AggregateId, build: F) -> Result<HistoryEvent>
  where
    F: FnOnce(PriorHistory) -> NewHistoryEvent + Send + 'static,
  {
    let event = self
      .conn
      .call(move |conn| {
        // IMMEDIATE: the write lock is held from the history read to the insert.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let event_count = count_events(&tx, aggregate_id)?;
        let replay = decode_all(query_window(&tx, aggregate_id, i64::MAX)?)?;
        let event = build(PriorHistory { event_count, replay });

        let created_at = Utc::now();
        let id = EncodedEvent::new(&event, created_at)?.insert(&tx)?;
        tx.commit()?;

        Ok(event.into_event(EventId(id), created_at))
      })
      .await?;
    Ok(event)
  }

  async fn import_event(
    &self,
    event: NewHistoryEvent,
    created_at: DateTime<Utc>,
  ) -> Result<HistoryEvent> {
    self.insert(event, created_at).await
  }

  async fn replay_window(
    &self,
    aggregate_id: AggregateId,
    range: EventRange,
  ) -> Result<Vec<HistoryEvent>> {
    let upper = range.upper_bound();
    let rows = self
      .conn
      .call(move |conn| Ok(query_window(conn, aggregate_id, upper)?))
      .await?;
    decode_all(rows)
  }

  async fn list_events(&self, aggregate_id: AggregateId) -> Result<Vec<HistoryEvent>> {
    let rows = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {EVENT_COLUMNS} FROM history_events
           WHERE aggregate_id = ?1
           ORDER BY id DESC"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![aggregate_id.0], RawHistoryEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    decode_all(rows)
  }

  async fn get_event(&self, event_id: EventId) -> Result<Option<HistoryEvent>> {
    let row = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM history_events WHERE id = ?1");
        Ok(
          conn
            .query_row(&sql, rusqlite::params![event_id.0], RawHistoryEvent::from_row)
            .optional()?,
        )
      })
      .await?;
    row.map(RawHistoryEvent::into_event).transpose()
  }
}

//! Integration tests for `SqliteLedgerStore` against an in-memory database.

use chrono::{TimeZone as _, Utc};
use serde_json::json;
use tally_core::{
  event::{AggregateId, Encoding, EventId, EventKind, EventSubtype, EventType, NewHistoryEvent},
  patch::{Patch, PatchOp},
  policy::{AnchorPolicy, AnchorReason},
  provider::MemorySnapshotProvider,
  state::{AggregateState, FieldKey},
  store::{EventRange, LedgerStore},
  AppendRequest, Error as CoreError, Ledger,
};

use crate::SqliteLedgerStore;

const GUARANTEE: AggregateId = AggregateId(42);

async fn store() -> SqliteLedgerStore {
  SqliteLedgerStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn ledger() -> Ledger<SqliteLedgerStore, MemorySnapshotProvider> {
  Ledger::new(store().await, MemorySnapshotProvider::new(), AnchorPolicy::default())
}

fn import() -> EventKind { EventKind::new(EventType::Import, EventSubtype::Excel) }

fn status_change() -> EventKind {
  EventKind::new(EventType::StatusChange, EventSubtype::StatusChange)
}

fn manual() -> EventKind { EventKind::new(EventType::Modified, EventSubtype::Manual) }

// ─── Reconstruction ──────────────────────────────────────────────────────────

#[tokio::test]
async fn concrete_scenario() {
  let ledger = ledger().await;
  let s1 = AggregateState::new()
    .with(FieldKey::SupplierName, "A")
    .with(FieldKey::Amount, 100);
  let s2 = s1.clone().with(FieldKey::Amount, 150);
  let s3 = s2.clone().with(FieldKey::BankId, 7);

  let e1 = ledger
    .append(AppendRequest::new(GUARANTEE, import()).with_state(s1.clone()).forced())
    .await
    .unwrap();
  let e2 = ledger
    .append(AppendRequest::new(GUARANTEE, manual()).with_state(s2.clone()))
    .await
    .unwrap();
  let e3 = ledger
    .append(AppendRequest::new(GUARANTEE, manual()).with_state(s3.clone()))
    .await
    .unwrap();

  assert!(e1.id < e2.id && e2.id < e3.id);
  assert_eq!(e1.anchor_reason(), Some(AnchorReason::ForcedAnchor));
  assert_eq!(
    e3.encoding,
    Encoding::Patch {
      ops: Patch::new(vec![PatchOp::Add { field: FieldKey::BankId, value: 7.into() }])
    }
  );

  assert_eq!(ledger.state_before(GUARANTEE, e3.id).await.unwrap(), s2);
  assert_eq!(ledger.state_up_to(GUARANTEE, e3.id).await.unwrap(), s3);
  assert_eq!(ledger.state_up_to(GUARANTEE, e1.id).await.unwrap(), s1);
  assert_eq!(ledger.state_before(GUARANTEE, e1.id).await.unwrap(), AggregateState::new());
}

#[tokio::test]
async fn every_tenth_event_is_a_periodic_anchor() {
  let ledger = ledger().await;
  let mut events = Vec::new();
  for i in 0..20 {
    let kind = if i == 0 { import() } else { status_change() };
    let state = AggregateState::new().with(FieldKey::Status, format!("s{i}"));
    events.push(
      ledger
        .append(AppendRequest::new(GUARANTEE, kind).with_state(state))
        .await
        .unwrap(),
    );
  }

  let reasons: Vec<_> = events.iter().filter_map(|e| e.anchor_reason()).collect();
  assert_eq!(reasons[0], AnchorReason::MilestoneEvent);
  assert_eq!(reasons[9], AnchorReason::PeriodicAnchor);
  assert_eq!(reasons[19], AnchorReason::PeriodicAnchor);
  assert_eq!(reasons.iter().filter(|r| r.is_anchor()).count(), 3);

  for (i, event) in events.iter().enumerate() {
    let state = ledger.state_up_to(GUARANTEE, event.id).await.unwrap();
    assert_eq!(state, AggregateState::new().with(FieldKey::Status, format!("s{i}")));
  }
}

#[tokio::test]
async fn replay_window_starts_at_last_anchor() {
  let ledger = ledger().await;
  let mut ids = Vec::new();
  for (i, kind) in [import(), manual(), manual(), import(), manual()].into_iter().enumerate() {
    let state = AggregateState::new().with(FieldKey::Amount, i as i64);
    ids.push(
      ledger
        .append(AppendRequest::new(GUARANTEE, kind).with_state(state))
        .await
        .unwrap()
        .id,
    );
  }

  let store = ledger.store();
  let all = store.replay_window(GUARANTEE, EventRange::All).await.unwrap();
  assert_eq!(all.iter().map(|e| e.id).collect::<Vec<_>>(), [ids[3], ids[4]]);

  let early = store.replay_window(GUARANTEE, EventRange::UpTo(ids[2])).await.unwrap();
  assert_eq!(early.iter().map(|e| e.id).collect::<Vec<_>>(), ids[..3]);

  let before = store.replay_window(GUARANTEE, EventRange::Before(ids[3])).await.unwrap();
  assert_eq!(before.len(), 3);
}

#[tokio::test]
async fn aggregates_do_not_leak_into_each_other() {
  let ledger = ledger().await;
  let other = AggregateId(43);
  ledger
    .append(
      AppendRequest::new(GUARANTEE, import())
        .with_state(AggregateState::new().with(FieldKey::Amount, 1)),
    )
    .await
    .unwrap();
  ledger
    .append(
      AppendRequest::new(other, import())
        .with_state(AggregateState::new().with(FieldKey::Amount, 2)),
    )
    .await
    .unwrap();
  let patch = ledger
    .append(
      AppendRequest::new(GUARANTEE, manual())
        .with_state(AggregateState::new().with(FieldKey::Amount, 3)),
    )
    .await
    .unwrap();

  assert!(!patch.is_anchor());
  assert_eq!(
    ledger.current_state(GUARANTEE).await.unwrap(),
    AggregateState::new().with(FieldKey::Amount, 3)
  );
  assert_eq!(
    ledger.current_state(other).await.unwrap(),
    AggregateState::new().with(FieldKey::Amount, 2)
  );
}

#[tokio::test]
async fn unknown_aggregate_is_empty_state() {
  let ledger = ledger().await;
  assert!(ledger.current_state(AggregateId(1)).await.unwrap().is_empty());
  assert!(ledger.list_events(AggregateId(1)).await.unwrap().is_empty());
}

// ─── Listing and lookup ──────────────────────────────────────────────────────

#[tokio::test]
async fn list_events_is_newest_first() {
  let ledger = ledger().await;
  for amount in [1, 2, 3] {
    ledger
      .append(
        AppendRequest::new(GUARANTEE, manual())
          .with_state(AggregateState::new().with(FieldKey::Amount, amount)),
      )
      .await
      .unwrap();
  }

  let listed = ledger.list_events(GUARANTEE).await.unwrap();
  assert_eq!(listed.len(), 3);
  assert!(listed.windows(2).all(|w| w[0].id > w[1].id));
}

#[tokio::test]
async fn get_event_returns_stored_row() {
  let ledger = ledger().await;
  let appended = ledger
    .append(
      AppendRequest::new(GUARANTEE, EventKind::new(EventType::Modified, EventSubtype::Extension))
        .with_state(AggregateState::new().with(FieldKey::ExpiryDate, "2026-01-31"))
        .with_artifact("Dear bank, please extend.")
        .with_details(json!({ "changes": [{ "field": "expiry_date", "old_value": "2025-01-31" }] }))
        .created_by("clerk"),
    )
    .await
    .unwrap();

  let fetched = ledger.get_event(appended.id).await.unwrap().unwrap();
  assert_eq!(fetched, appended);
  assert!(fetched.artifact.unwrap().verify());

  assert!(ledger.get_event(EventId(9_999)).await.unwrap().is_none());
}

// ─── Write path ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_live_state_writes_nothing() {
  let ledger = ledger().await;
  let err = ledger.append(AppendRequest::new(GUARANTEE, manual())).await.unwrap_err();
  assert!(matches!(err, CoreError::AggregateNotFound(GUARANTEE)));
  assert!(ledger.list_events(GUARANTEE).await.unwrap().is_empty());
}

#[tokio::test]
async fn provider_state_is_recorded() {
  let ledger = ledger().await;
  let live = AggregateState::new().with(FieldKey::Status, "pending");
  ledger.provider().put(GUARANTEE, live.clone());

  ledger.append(AppendRequest::new(GUARANTEE, import())).await.unwrap();
  assert_eq!(ledger.current_state(GUARANTEE).await.unwrap(), live);
}

#[tokio::test]
async fn rows_cannot_be_updated_or_deleted() {
  let ledger = ledger().await;
  ledger
    .append(
      AppendRequest::new(GUARANTEE, import())
        .with_state(AggregateState::new().with(FieldKey::Amount, 1)),
    )
    .await
    .unwrap();

  let store = ledger.store();
  let update = store
    .conn
    .call(|conn| Ok(conn.execute("UPDATE history_events SET created_by = 'mallory'", [])?))
    .await;
  assert!(update.is_err());

  let delete = store
    .conn
    .call(|conn| Ok(conn.execute("DELETE FROM history_events", [])?))
    .await;
  assert!(delete.is_err());

  assert_eq!(ledger.list_events(GUARANTEE).await.unwrap().len(), 1);
}

#[tokio::test]
async fn schema_rejects_rows_with_two_encodings() {
  let store = store().await;
  let result = store
    .conn
    .call(|conn| {
      Ok(conn.execute(
        "INSERT INTO history_events
           (aggregate_id, event_type, anchor_snapshot, patch, is_anchor, created_at)
         VALUES (1, 'modified', '{}', '[]', 1, '2024-01-01T00:00:00+00:00')",
        [],
      )?)
    })
    .await;
  assert!(result.is_err());
}

// ─── Legacy rows ─────────────────────────────────────────────────────────────

fn legacy_row(aggregate_id: AggregateId) -> NewHistoryEvent {
  NewHistoryEvent {
    aggregate_id,
    kind: EventKind::new(EventType::Modified, EventSubtype::Reduction),
    details: json!({
      "changes": [{ "field": "amount", "old_value": 100, "new_value": 150 }]
    }),
    encoding: Encoding::LegacyBeforeState {
      raw_snapshot: json!({ "amount": 150, "status": "active" }),
    },
    artifact: None,
    created_by: Some("legacy".into()),
  }
}

#[tokio::test]
async fn imported_legacy_row_keeps_timestamp_and_normalises() {
  let ledger = ledger().await;
  let created_at = Utc.with_ymd_and_hms(2019, 3, 14, 9, 30, 0).unwrap();
  let legacy = ledger
    .store()
    .import_event(legacy_row(GUARANTEE), created_at)
    .await
    .unwrap();

  assert_eq!(legacy.created_at, created_at);
  assert_eq!(legacy.anchor_reason(), None);
  let stored = ledger.get_event(legacy.id).await.unwrap().unwrap();
  assert_eq!(stored, legacy);

  assert_eq!(
    ledger.state_up_to(GUARANTEE, legacy.id).await.unwrap(),
    AggregateState::new()
      .with(FieldKey::Amount, 100)
      .with(FieldKey::Status, "active")
  );
}

#[tokio::test]
async fn archived_row_older_than_history_is_rejected() {
  let ledger = ledger().await;
  let released = AggregateState::new()
    .with(FieldKey::Amount, 500)
    .with(FieldKey::Status, "released");
  ledger
    .append(AppendRequest::new(GUARANTEE, import()).with_state(released.clone()))
    .await
    .unwrap();

  let err = ledger
    .import_archived(legacy_row(GUARANTEE), Utc.with_ymd_and_hms(2019, 3, 14, 9, 30, 0).unwrap())
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::ImportOutOfOrder { aggregate_id: GUARANTEE, .. }));
  assert_eq!(ledger.list_events(GUARANTEE).await.unwrap().len(), 1);
  assert_eq!(ledger.current_state(GUARANTEE).await.unwrap(), released);
}

#[tokio::test]
async fn hybrid_events_patch_on_top_of_legacy_history() {
  let ledger = ledger().await;
  let legacy = ledger
    .store()
    .import_event(legacy_row(GUARANTEE), Utc::now())
    .await
    .unwrap();

  let released = AggregateState::new()
    .with(FieldKey::Amount, 100)
    .with(FieldKey::Status, "released");
  let event = ledger
    .append(AppendRequest::new(GUARANTEE, status_change()).with_state(released.clone()))
    .await
    .unwrap();

  assert_eq!(
    event.encoding,
    Encoding::Patch {
      ops: Patch::new(vec![PatchOp::Replace {
        field: FieldKey::Status,
        value: "released".into(),
      }])
    }
  );
  assert_eq!(ledger.state_up_to(GUARANTEE, event.id).await.unwrap(), released);
  assert_eq!(
    ledger.state_before(GUARANTEE, event.id).await.unwrap(),
    ledger.state_up_to(GUARANTEE, legacy.id).await.unwrap()
  );
}

#[tokio::test]
async fn undecodable_legacy_text_degrades_to_empty_state() {
  let store = store().await;
  store
    .conn
    .call(|conn| {
      Ok(conn.execute(
        "INSERT INTO history_events
           (aggregate_id, event_type, details, legacy_snapshot, created_at)
         VALUES (5, 'modified', 'not json', 'not json either', '2020-01-01T00:00:00+00:00')",
        [],
      )?)
    })
    .await
    .unwrap();

  let ledger = Ledger::new(store, MemorySnapshotProvider::new(), AnchorPolicy::default());
  let events = ledger.list_events(AggregateId(5)).await.unwrap();
  assert_eq!(events[0].details, json!("not json"));
  assert!(ledger.current_state(AggregateId(5)).await.unwrap().is_empty());
}

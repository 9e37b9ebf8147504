use chrono::Utc;
use proptest::prelude::*;
use tally_core::{
  event::{AggregateId, Encoding, EventId, EventKind, EventSubtype, EventType, HistoryEvent},
  patch::{diff, Patch},
  policy::AnchorReason,
  reconstruct::{replay, replay_suffix, state_before, state_up_to},
  state::{AggregateState, FieldKey, Scalar},
};

fn arb_scalar() -> impl Strategy<Value = Scalar> {
  prop_oneof![
    Just(Scalar::Null),
    any::<bool>().prop_map(Scalar::Bool),
    any::<i64>().prop_map(Scalar::from),
    "[a-zA-Z0-9 ]{0,8}".prop_map(Scalar::Text),
  ]
}

fn arb_key() -> impl Strategy<Value = FieldKey> {
  prop_oneof![
    3 => prop::sample::select(vec![
      FieldKey::SupplierId,
      FieldKey::SupplierName,
      FieldKey::BankId,
      FieldKey::BankName,
      FieldKey::Amount,
      FieldKey::Currency,
      FieldKey::ExpiryDate,
      FieldKey::GuaranteeType,
      FieldKey::Status,
    ]),
    1 => "x_[a-z]{1,4}".prop_map(FieldKey::from),
  ]
}

fn arb_state() -> impl Strategy<Value = AggregateState> {
  prop::collection::btree_map(arb_key(), arb_scalar(), 0..8)
    .prop_map(|fields| fields.into_iter().collect())
}

fn event(index: usize, encoding: Encoding) -> HistoryEvent {
  HistoryEvent {
    // gaps between ids are allowed
    id: EventId(index as i64 * 3 + 1),
    aggregate_id: AggregateId(1),
    kind: EventKind::new(EventType::Modified, EventSubtype::Manual),
    details: serde_json::json!({}),
    encoding,
    artifact: None,
    created_at: Utc::now(),
    created_by: None,
  }
}

/// Encode a sequence of live states the way the appender would.
fn encode(states: &[AggregateState], anchors: &[bool]) -> Vec<HistoryEvent> {
  let empty = AggregateState::new();
  states
    .iter()
    .enumerate()
    .map(|(i, state)| {
      let previous = if i == 0 { &empty } else { &states[i - 1] };
      let encoding = if anchors[i] {
        Encoding::Anchor { snapshot: state.clone(), reason: AnchorReason::PeriodicAnchor }
      } else {
        Encoding::Patch { ops: diff(previous, state) }
      };
      event(i, encoding)
    })
    .collect()
}

proptest! {
  #[test]
  fn diff_from_empty_round_trips(state in arb_state()) {
    let empty = AggregateState::new();
    prop_assert_eq!(diff(&empty, &state).applied_to(&empty), state);
  }

  #[test]
  fn diff_applied_to_previous_yields_current(a in arb_state(), b in arb_state()) {
    prop_assert_eq!(diff(&a, &b).applied_to(&a), b);
  }

  #[test]
  fn diff_is_deterministic_and_sorted(a in arb_state(), b in arb_state()) {
    let first = diff(&a, &b);
    prop_assert_eq!(&first, &diff(&a, &b));

    let fields: Vec<&FieldKey> = first.fields().collect();
    prop_assert!(fields.windows(2).all(|w| w[0] < w[1]));
  }

  #[test]
  fn patch_application_is_idempotent(a in arb_state(), b in arb_state(), base in arb_state()) {
    let patch: Patch = diff(&a, &b);
    let once = patch.applied_to(&base);
    prop_assert_eq!(patch.applied_to(&once), once);
  }

  #[test]
  fn reconstruction_matches_naive_replay(
    (states, anchors) in prop::collection::vec(arb_state(), 1..16)
      .prop_flat_map(|states| {
        let n = states.len();
        (Just(states), prop::collection::vec(any::<bool>(), n))
      })
  ) {
    let events = encode(&states, &anchors);
    for (k, event) in events.iter().enumerate() {
      prop_assert_eq!(&state_up_to(&events, event.id), &states[k]);
      let before = if k == 0 { AggregateState::new() } else { states[k - 1].clone() };
      prop_assert_eq!(state_before(&events, event.id), before);
      prop_assert_eq!(replay(replay_suffix(&events[..=k])), states[k].clone());
    }
  }

  #[test]
  fn anchor_ignores_everything_before_it(
    noise in prop::collection::vec(arb_state(), 0..8),
    snapshot in arb_state(),
  ) {
    let mut events: Vec<HistoryEvent> = noise
      .iter()
      .enumerate()
      .map(|(i, state)| event(i, Encoding::Patch { ops: diff(&AggregateState::new(), state) }))
      .collect();
    let anchor = event(
      noise.len(),
      Encoding::Anchor { snapshot: snapshot.clone(), reason: AnchorReason::MilestoneEvent },
    );
    let anchor_id = anchor.id;
    events.push(anchor);

    prop_assert_eq!(state_up_to(&events, anchor_id), snapshot);
  }
}

//! Point-in-time reconstruction of aggregate state.
//!
//! The state at any point is a left fold over the aggregate's events in
//! ascending id order, starting from the empty state:
//!
//! - an anchor replaces the running state with its snapshot;
//! - a patch is applied to the running state;
//! - a legacy row replaces the running state with its normalised snapshot.
//!
//! Because anchors and legacy rows discard everything before them, a store
//! may hand over only the suffix starting at the last such row in range; the
//! result is the same.

use tracing::warn;

use crate::{
  event::{Encoding, EventId, HistoryEvent},
  legacy,
  state::AggregateState,
};

/// Fold `events` (ascending by id) into a state.
pub fn replay<'a, I>(events: I) -> AggregateState
where
  I: IntoIterator<Item = &'a HistoryEvent>,
{
  let mut last_id = None;
  events.into_iter().fold(AggregateState::new(), |state, event| {
    debug_assert!(last_id < Some(event.id), "events must be in ascending id order");
    last_id = Some(event.id);
    step(state, event)
  })
}

/// Advance the running state past one event.
pub fn step(mut state: AggregateState, event: &HistoryEvent) -> AggregateState {
  match &event.encoding {
    Encoding::Anchor { snapshot, .. } => snapshot.clone(),
    Encoding::Patch { ops } => {
      ops.apply(&mut state);
      state
    }
    Encoding::LegacyBeforeState { raw_snapshot } => {
      let normalized = legacy::normalize(raw_snapshot, &event.details);
      for issue in &normalized.skipped {
        warn!(
          event_id = %event.id,
          aggregate_id = %event.aggregate_id,
          %issue,
          "skipped unresolvable legacy field"
        );
      }
      normalized.state
    }
  }
}

/// State after `event_id`, from a full ascending event sequence.
pub fn state_up_to(events: &[HistoryEvent], event_id: EventId) -> AggregateState {
  replay(events.iter().take_while(|e| e.id <= event_id))
}

/// State immediately before `event_id`, from a full ascending event sequence.
pub fn state_before(events: &[HistoryEvent], event_id: EventId) -> AggregateState {
  replay(events.iter().take_while(|e| e.id < event_id))
}

/// The suffix of `events` that a replay actually needs: everything from the
/// last state-replacing row onwards.
pub fn replay_suffix(events: &[HistoryEvent]) -> &[HistoryEvent] {
  let start = events
    .iter()
    .rposition(|e| e.encoding.replaces_state())
    .unwrap_or(0);
  &events[start..]
}

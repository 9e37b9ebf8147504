//! Collaborators the ledger consumes but does not own.

use std::{
  collections::HashMap,
  convert::Infallible,
  future::Future,
  sync::{Arc, PoisonError, RwLock},
};

use crate::{
  event::{AggregateId, EventKind},
  state::AggregateState,
};

/// Reads the live state of an aggregate from the domain tables.
///
/// `Ok(None)` is the explicit not-found result; the caller decides how to
/// handle it.
pub trait StateSnapshotProvider: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn fetch(
    &self,
    aggregate_id: AggregateId,
  ) -> impl Future<Output = Result<Option<AggregateState>, Self::Error>> + Send + '_;
}

/// Produces an immutable document (e.g. a bank letter) for an event. The
/// ledger stores the output verbatim and never calls the renderer again for
/// that event.
pub trait ArtifactRenderer {
  type Error: std::error::Error + Send + Sync + 'static;

  fn render(&self, state: &AggregateState, kind: &EventKind) -> Result<String, Self::Error>;
}

/// In-process snapshot provider backed by a shared map.
///
/// Cloning is cheap; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotProvider {
  states: Arc<RwLock<HashMap<AggregateId, AggregateState>>>,
}

impl MemorySnapshotProvider {
  pub fn new() -> Self { Self::default() }

  /// Replace the live state of an aggregate.
  pub fn put(&self, aggregate_id: AggregateId, state: AggregateState) {
    self
      .states
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(aggregate_id, state);
  }

  pub fn remove(&self, aggregate_id: AggregateId) -> Option<AggregateState> {
    self
      .states
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&aggregate_id)
  }
}

impl StateSnapshotProvider for MemorySnapshotProvider {
  type Error = Infallible;

  async fn fetch(&self, aggregate_id: AggregateId) -> Result<Option<AggregateState>, Infallible> {
    Ok(
      self
        .states
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&aggregate_id)
        .cloned(),
    )
  }
}

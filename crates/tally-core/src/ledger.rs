//! `Ledger`, the single write path into the history plus the read API used
//! by audit and undo collaborators.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::{
  artifact::Artifact,
  error::{Error, Result},
  event::{AggregateId, Encoding, EventId, EventKind, HistoryEvent, NewHistoryEvent},
  patch,
  policy::AnchorPolicy,
  provider::{ArtifactRenderer, StateSnapshotProvider},
  reconstruct,
  state::AggregateState,
  store::{EventRange, LedgerStore},
};

/// Parameters for [`Ledger::append`].
#[derive(Debug, Clone)]
pub struct AppendRequest {
  pub aggregate_id:  AggregateId,
  pub kind:          EventKind,
  /// State to record. When `None` the live state is read from the snapshot
  /// provider.
  pub current_state: Option<AggregateState>,
  /// Rendered document stored verbatim with the event.
  pub artifact:      Option<String>,
  pub details:       Value,
  pub force_anchor:  bool,
  pub created_by:    Option<String>,
}

impl AppendRequest {
  pub fn new(aggregate_id: AggregateId, kind: EventKind) -> Self {
    Self {
      aggregate_id,
      kind,
      current_state: None,
      artifact: None,
      details: Value::Object(serde_json::Map::new()),
      force_anchor: false,
      created_by: None,
    }
  }

  pub fn with_state(mut self, state: AggregateState) -> Self {
    self.current_state = Some(state);
    self
  }

  pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
    self.artifact = Some(artifact.into());
    self
  }

  pub fn with_details(mut self, details: Value) -> Self {
    self.details = details;
    self
  }

  pub fn forced(mut self) -> Self {
    self.force_anchor = true;
    self
  }

  pub fn created_by(mut self, actor: impl Into<String>) -> Self {
    self.created_by = Some(actor.into());
    self
  }
}

/// Append-only history of guarantees.
///
/// Callers must serialise their own mutation of an aggregate's live state
/// with the matching [`Ledger::append`]; the ledger does not lock the domain
/// tables.
#[derive(Debug, Clone)]
pub struct Ledger<S, P> {
  store:    S,
  provider: P,
  policy:   AnchorPolicy,
}

impl<S, P> Ledger<S, P>
where
  S: LedgerStore,
  P: StateSnapshotProvider,
{
  pub fn new(store: S, provider: P, policy: AnchorPolicy) -> Self {
    Self { store, provider, policy }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn provider(&self) -> &P { &self.provider }

  pub fn policy(&self) -> AnchorPolicy { self.policy }

  // ── Write side ────────────────────────────────────────────────────────

  /// Record one event and return the stored row.
  ///
  /// The previous state, anchor decision and patch are computed inside a
  /// single store call, so they see the same history the insert lands on.
  pub async fn append(&self, mut request: AppendRequest) -> Result<HistoryEvent> {
    let current = self
      .resolve_current(request.aggregate_id, request.current_state.take())
      .await?;
    self.write(request, current).await
  }

  /// Like [`Ledger::append`], but renders the artifact from the state being
  /// recorded. Any artifact already on the request is replaced.
  pub async fn append_rendered<R>(
    &self,
    mut request: AppendRequest,
    renderer: &R,
  ) -> Result<HistoryEvent>
  where
    R: ArtifactRenderer,
  {
    let current = self
      .resolve_current(request.aggregate_id, request.current_state.take())
      .await?;
    let rendered = renderer
      .render(&current, &request.kind)
      .map_err(|e| Error::Render(Box::new(e)))?;
    request.artifact = Some(rendered);
    self.write(request, current).await
  }

  async fn resolve_current(
    &self,
    aggregate_id: AggregateId,
    explicit: Option<AggregateState>,
  ) -> Result<AggregateState> {
    if let Some(state) = explicit {
      return Ok(state);
    }
    self
      .provider
      .fetch(aggregate_id)
      .await
      .map_err(|e| Error::SnapshotProvider(Box::new(e)))?
      .ok_or(Error::AggregateNotFound(aggregate_id))
  }

  async fn write(&self, request: AppendRequest, current: AggregateState) -> Result<HistoryEvent> {
    let AppendRequest { aggregate_id, kind, artifact, details, force_anchor, created_by, .. } =
      request;
    let policy = self.policy;
    let artifact = artifact.map(Artifact::new);

    let event = self
      .store
      .append_with(aggregate_id, move |prior| {
        let reason = policy.decide(prior.event_count, &kind, force_anchor);
        let encoding = if reason.is_anchor() {
          Encoding::Anchor { snapshot: current, reason }
        } else {
          Encoding::Patch { ops: patch::diff(&prior.latest_state(), &current) }
        };
        NewHistoryEvent { aggregate_id, kind, details, encoding, artifact, created_by }
      })
      .await
      .map_err(|e| Error::StorageWrite(Box::new(e)))?;

    debug!(
      aggregate_id = %event.aggregate_id,
      event_id = %event.id,
      kind = %event.kind,
      anchor = event.is_anchor(),
      reason = event.anchor_reason().map(|r| r.as_str()),
      "appended history event"
    );
    Ok(event)
  }

  /// Insert an archived row with its original timestamp.
  ///
  /// Ids follow insertion order, so archives must be imported oldest first
  /// and before any newer history of the same aggregate. A row older than the
  /// aggregate's newest event is rejected with [`Error::ImportOutOfOrder`].
  pub async fn import_archived(
    &self,
    event: NewHistoryEvent,
    created_at: DateTime<Utc>,
  ) -> Result<HistoryEvent> {
    let aggregate_id = event.aggregate_id;
    let window = self
      .store
      .replay_window(aggregate_id, EventRange::All)
      .await
      .map_err(|e| Error::StorageRead(Box::new(e)))?;
    if let Some(newest) = window.last().filter(|newest| created_at < newest.created_at) {
      return Err(Error::ImportOutOfOrder { aggregate_id, created_at, newest: newest.created_at });
    }

    let event = self
      .store
      .import_event(event, created_at)
      .await
      .map_err(|e| Error::StorageWrite(Box::new(e)))?;
    debug!(
      aggregate_id = %event.aggregate_id,
      event_id = %event.id,
      kind = %event.kind,
      "imported archived event"
    );
    Ok(event)
  }

  // ── Read side ─────────────────────────────────────────────────────────

  /// State after `event_id` was applied.
  pub async fn state_up_to(
    &self,
    aggregate_id: AggregateId,
    event_id: EventId,
  ) -> Result<AggregateState> {
    self.replay(aggregate_id, EventRange::UpTo(event_id)).await
  }

  /// State immediately before `event_id`; never includes its own changes.
  pub async fn state_before(
    &self,
    aggregate_id: AggregateId,
    event_id: EventId,
  ) -> Result<AggregateState> {
    self.replay(aggregate_id, EventRange::Before(event_id)).await
  }

  /// The most recent known state. Empty for an aggregate with no events.
  pub async fn current_state(&self, aggregate_id: AggregateId) -> Result<AggregateState> {
    self.replay(aggregate_id, EventRange::All).await
  }

  async fn replay(&self, aggregate_id: AggregateId, range: EventRange) -> Result<AggregateState> {
    let window = self
      .store
      .replay_window(aggregate_id, range)
      .await
      .map_err(|e| Error::StorageRead(Box::new(e)))?;
    Ok(reconstruct::replay(&window))
  }

  /// Events of an aggregate, newest first.
  pub async fn list_events(&self, aggregate_id: AggregateId) -> Result<Vec<HistoryEvent>> {
    self
      .store
      .list_events(aggregate_id)
      .await
      .map_err(|e| Error::StorageRead(Box::new(e)))
  }

  pub async fn get_event(&self, event_id: EventId) -> Result<Option<HistoryEvent>> {
    self
      .store
      .get_event(event_id)
      .await
      .map_err(|e| Error::StorageRead(Box::new(e)))
  }
}

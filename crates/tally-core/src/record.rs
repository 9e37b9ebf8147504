//! Business-level recording helpers.
//!
//! Each helper fixes the event type, subtype and `details` layout for one
//! workflow and delegates to [`Ledger::append`]. The recorded state is read
//! from the snapshot provider, so call these after the domain mutation they
//! describe.

use serde_json::Value;

use crate::{
  error::Result,
  event::{
    reference_value, AggregateId, EventDetails, EventKind, EventSubtype, EventType, FieldChange,
    HistoryEvent,
  },
  ledger::{AppendRequest, Ledger},
  provider::StateSnapshotProvider,
  store::LedgerStore,
};

/// The counterparty a matching decision refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counterparty {
  Supplier,
  Bank,
}

impl Counterparty {
  fn field(self) -> &'static str {
    match self {
      Self::Supplier => "supplier_id",
      Self::Bank => "bank_id",
    }
  }

  fn subtype(self) -> EventSubtype {
    match self {
      Self::Supplier => EventSubtype::SupplierChange,
      Self::Bank => EventSubtype::BankChange,
    }
  }
}

/// A matched supplier or bank, as `{id, name}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartyRef {
  pub id:   Option<i64>,
  pub name: Option<String>,
}

impl PartyRef {
  pub fn new(id: i64, name: impl Into<String>) -> Self {
    Self { id: Some(id), name: Some(name.into()) }
  }

  /// No match.
  pub fn none() -> Self { Self::default() }

  fn to_value(&self) -> Value { reference_value(self.id, self.name.as_deref()) }
}

impl<S, P> Ledger<S, P>
where
  S: LedgerStore,
  P: StateSnapshotProvider,
{
  async fn record(
    &self,
    aggregate_id: AggregateId,
    kind: EventKind,
    details: EventDetails,
    artifact: Option<String>,
    actor: Option<&str>,
  ) -> Result<HistoryEvent> {
    let mut request = AppendRequest::new(aggregate_id, kind).with_details(details.into_value()?);
    request.artifact = artifact;
    request.created_by = actor.map(str::to_owned);
    self.append(request).await
  }

  /// First appearance of a guarantee. Always stored as an anchor.
  ///
  /// `source` is the ingestion channel, e.g. [`EventSubtype::Excel`].
  pub async fn record_import(
    &self,
    aggregate_id: AggregateId,
    source: EventSubtype,
    actor: Option<&str>,
  ) -> Result<HistoryEvent> {
    let mut details = EventDetails::new();
    details
      .extra
      .insert("source".to_owned(), Value::String(source.as_str().to_owned()));
    let mut request = AppendRequest::new(aggregate_id, EventKind::new(EventType::Import, source))
      .with_details(details.into_value()?)
      .forced();
    request.created_by = actor.map(str::to_owned);
    self.append(request).await
  }

  /// A guarantee that was imported again. `changes` lists the fields the
  /// re-import touched, if any.
  pub async fn record_duplicate_import(
    &self,
    aggregate_id: AggregateId,
    changes: Vec<FieldChange>,
    actor: Option<&str>,
  ) -> Result<HistoryEvent> {
    let details = EventDetails { changes, ..EventDetails::new() };
    let kind = EventKind::new(EventType::Import, EventSubtype::DuplicateImport);
    self.record(aggregate_id, kind, details, None, actor).await
  }

  pub async fn record_extension(
    &self,
    aggregate_id: AggregateId,
    old_expiry: &str,
    new_expiry: &str,
    letter: Option<String>,
    actor: Option<&str>,
  ) -> Result<HistoryEvent> {
    let details = EventDetails::new()
      .with_change(FieldChange::new("expiry_date", old_expiry, new_expiry).triggered_by("extension"));
    let kind = EventKind::new(EventType::Modified, EventSubtype::Extension);
    self.record(aggregate_id, kind, details, letter, actor).await
  }

  pub async fn record_reduction(
    &self,
    aggregate_id: AggregateId,
    old_amount: impl Into<Value>,
    new_amount: impl Into<Value>,
    letter: Option<String>,
    actor: Option<&str>,
  ) -> Result<HistoryEvent> {
    let details = EventDetails::new()
      .with_change(FieldChange::new("amount", old_amount, new_amount).triggered_by("reduction"));
    let kind = EventKind::new(EventType::Modified, EventSubtype::Reduction);
    self.record(aggregate_id, kind, details, letter, actor).await
  }

  pub async fn record_release(
    &self,
    aggregate_id: AggregateId,
    old_status: &str,
    letter: Option<String>,
    actor: Option<&str>,
  ) -> Result<HistoryEvent> {
    let details = EventDetails::new()
      .with_change(FieldChange::new("status", old_status, "released").triggered_by("release"));
    let kind = EventKind::new(EventType::Release, EventSubtype::Release);
    self.record(aggregate_id, kind, details, letter, actor).await
  }

  pub async fn record_reopened(
    &self,
    aggregate_id: AggregateId,
    reason: &str,
    actor: Option<&str>,
  ) -> Result<HistoryEvent> {
    let details = EventDetails::new().with_reason(reason);
    let kind = EventKind::new(EventType::Reopened, EventSubtype::Reopened);
    self.record(aggregate_id, kind, details, None, actor).await
  }

  pub async fn record_status_change(
    &self,
    aggregate_id: AggregateId,
    old_status: &str,
    new_status: &str,
    trigger: &str,
    actor: Option<&str>,
  ) -> Result<HistoryEvent> {
    let details = EventDetails::new()
      .with_change(FieldChange::new("status", old_status, new_status).triggered_by(trigger));
    let kind = EventKind::new(EventType::StatusChange, EventSubtype::StatusChange);
    self.record(aggregate_id, kind, details, None, actor).await
  }

  /// A supplier or bank match changed. An `"auto_match"` trigger is recorded
  /// under the [`EventSubtype::AutoMatch`] subtype.
  pub async fn record_decision_change(
    &self,
    aggregate_id: AggregateId,
    party: Counterparty,
    old: &PartyRef,
    new: &PartyRef,
    trigger: &str,
    actor: Option<&str>,
  ) -> Result<HistoryEvent> {
    let details = EventDetails::new()
      .with_change(FieldChange::new(party.field(), old.to_value(), new.to_value()).triggered_by(trigger));
    let subtype = if trigger == EventSubtype::AutoMatch.as_str() {
      EventSubtype::AutoMatch
    } else {
      party.subtype()
    };
    let kind = EventKind::new(EventType::Modified, subtype);
    self.record(aggregate_id, kind, details, None, actor).await
  }

  /// Operator correction outside the normal workflows. Always anchored as a
  /// milestone.
  pub async fn record_manual_override(
    &self,
    aggregate_id: AggregateId,
    changes: Vec<FieldChange>,
    reason: &str,
    actor: Option<&str>,
  ) -> Result<HistoryEvent> {
    let details = EventDetails { changes, ..EventDetails::new() }.with_reason(reason);
    let kind = EventKind::new(EventType::Modified, EventSubtype::ManualOverride);
    self.record(aggregate_id, kind, details, None, actor).await
  }
}

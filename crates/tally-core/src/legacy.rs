//! Normalisation of pre-hybrid history rows.
//!
//! Legacy rows stored a state blob whose meaning varied between "before" and
//! "after" the recorded change, together with a `details.changes` list of
//! `{field, old_value, new_value}` entries. Overwriting every changed field
//! with its `old_value` yields the state immediately before the event, which
//! is the meaning hybrid rows use.
//!
//! Normalisation never fails. Anything unreadable is skipped and reported as
//! a [`MalformedState`] next to the best-effort result.

use std::borrow::Cow;

use serde_json::{Map, Value};

use crate::{
  error::MalformedState,
  state::{AggregateState, FieldKey, Scalar},
};

/// The result of normalising one legacy row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
  pub state:   AggregateState,
  pub skipped: Vec<MalformedState>,
}

/// Reinterpret a legacy snapshot as the state before its event.
pub fn normalize(raw_snapshot: &Value, details: &Value) -> Normalized {
  let mut skipped = Vec::new();
  let mut state = snapshot_state(raw_snapshot, &mut skipped);

  let Some(details) = decode_embedded(details) else {
    skipped.push(MalformedState::UnreadableDetails);
    return Normalized { state, skipped };
  };

  match details.get("changes") {
    None | Some(Value::Null) => {}
    Some(Value::Array(changes)) => {
      for (index, change) in changes.iter().enumerate() {
        if let Err(issue) = revert_change(&mut state, index, change) {
          skipped.push(issue);
        }
      }
    }
    Some(_) => skipped.push(MalformedState::ChangesNotList),
  }

  Normalized { state, skipped }
}

/// Old rows sometimes stored JSON documents as JSON strings.
fn decode_embedded(value: &Value) -> Option<Cow<'_, Value>> {
  match value {
    Value::String(text) => serde_json::from_str(text).ok().map(Cow::Owned),
    other => Some(Cow::Borrowed(other)),
  }
}

fn snapshot_state(raw: &Value, skipped: &mut Vec<MalformedState>) -> AggregateState {
  let object = decode_embedded(raw);
  let Some(Value::Object(fields)) = object.as_deref() else {
    skipped.push(MalformedState::SnapshotNotObject);
    return AggregateState::new();
  };

  let (state, rejected) = AggregateState::from_json_object(fields);
  skipped.extend(
    rejected
      .into_iter()
      .map(|field| MalformedState::NonScalarSnapshotField { field }),
  );
  state
}

#[derive(Debug, Clone, Copy)]
enum Reference {
  Supplier,
  Bank,
}

impl Reference {
  fn of(field: &str) -> Option<Self> {
    match field {
      "supplier" | "supplier_id" | "supplier_name" => Some(Self::Supplier),
      "bank" | "bank_id" | "bank_name" => Some(Self::Bank),
      _ => None,
    }
  }

  fn keys(self) -> (FieldKey, FieldKey) {
    match self {
      Self::Supplier => (FieldKey::SupplierId, FieldKey::SupplierName),
      Self::Bank => (FieldKey::BankId, FieldKey::BankName),
    }
  }
}

fn revert_change(
  state: &mut AggregateState,
  index: usize,
  change: &Value,
) -> Result<(), MalformedState> {
  let Some(field) = change.get("field").and_then(Value::as_str) else {
    return Err(MalformedState::UnreadableChange { index });
  };
  let Some(old_value) = change.get("old_value") else {
    return Err(MalformedState::MissingOldValue { index, field: field.to_owned() });
  };

  if let Some(scalar) = Scalar::from_json(old_value) {
    let key = FieldKey::parse(field);
    if !state.contains(&key) {
      return Err(MalformedState::FieldNotInSnapshot { index, field: field.to_owned() });
    }
    state.insert(key, scalar);
    return Ok(());
  }

  match (Reference::of(field), old_value) {
    (Some(reference), Value::Object(shape)) => revert_reference(state, index, field, reference, shape),
    _ => Err(MalformedState::UnsupportedShape { index, field: field.to_owned() }),
  }
}

/// Split an `{id, name}` reference into its two conventional fields.
fn revert_reference(
  state: &mut AggregateState,
  index: usize,
  field: &str,
  reference: Reference,
  shape: &Map<String, Value>,
) -> Result<(), MalformedState> {
  let (id_key, name_key) = reference.keys();
  let id = shape.get("id").and_then(Scalar::from_json);
  let name = shape.get("name").and_then(Scalar::from_json);

  if id.is_none() && name.is_none() {
    return Err(MalformedState::UnsupportedShape { index, field: field.to_owned() });
  }
  if !state.contains(&id_key) && !state.contains(&name_key) {
    return Err(MalformedState::FieldNotInSnapshot { index, field: field.to_owned() });
  }

  if let Some(id) = id {
    state.insert(id_key, id);
  }
  if let Some(name) = name {
    state.insert(name_key, name);
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn reverts_scalar_change_to_old_value() {
    let normalized = normalize(
      &json!({ "amount": 150 }),
      &json!({ "changes": [{ "field": "amount", "old_value": 100, "new_value": 150 }] }),
    );
    assert_eq!(normalized.state, AggregateState::new().with(FieldKey::Amount, 100));
    assert!(normalized.skipped.is_empty());
  }

  #[test]
  fn snapshot_already_before_state_is_unchanged() {
    let normalized = normalize(
      &json!({ "amount": 100, "status": "pending" }),
      &json!({ "changes": [{ "field": "amount", "old_value": 100, "new_value": 150 }] }),
    );
    assert_eq!(
      normalized.state,
      AggregateState::new()
        .with(FieldKey::Amount, 100)
        .with(FieldKey::Status, "pending")
    );
  }

  #[test]
  fn reference_change_fills_id_and_name() {
    let normalized = normalize(
      &json!({ "supplier_id": 9, "supplier_name": "New Co", "amount": 5 }),
      &json!({ "changes": [{
        "field": "supplier_id",
        "old_value": { "id": 3, "name": "Old Co" },
        "new_value": { "id": 9, "name": "New Co" },
      }] }),
    );
    assert_eq!(
      normalized.state,
      AggregateState::new()
        .with(FieldKey::SupplierId, 3)
        .with(FieldKey::SupplierName, "Old Co")
        .with(FieldKey::Amount, 5)
    );
    assert!(normalized.skipped.is_empty());
  }

  #[test]
  fn null_old_value_is_written_as_null() {
    let normalized = normalize(
      &json!({ "bank_id": 4 }),
      &json!({ "changes": [{ "field": "bank_id", "old_value": null, "new_value": 4 }] }),
    );
    assert_eq!(normalized.state.get(&FieldKey::BankId), Some(&Scalar::Null));
  }

  #[test]
  fn unresolvable_fields_are_skipped_not_fatal() {
    let normalized = normalize(
      &json!({ "amount": 150, "status": "released", "meta": { "x": 1 } }),
      &json!({ "changes": [
        { "field": "amount", "old_value": 100 },
        { "field": "expiry_date", "old_value": "2024-01-01" },
        { "field": "status", "old_value": ["pending"] },
        { "old_value": 1 },
        { "field": "bank_id" },
      ] }),
    );

    assert_eq!(
      normalized.state,
      AggregateState::new()
        .with(FieldKey::Amount, 100)
        .with(FieldKey::Status, "released")
    );
    assert_eq!(
      normalized.skipped,
      vec![
        MalformedState::NonScalarSnapshotField { field: "meta".into() },
        MalformedState::FieldNotInSnapshot { index: 1, field: "expiry_date".into() },
        MalformedState::UnsupportedShape { index: 2, field: "status".into() },
        MalformedState::UnreadableChange { index: 3 },
        MalformedState::MissingOldValue { index: 4, field: "bank_id".into() },
      ]
    );
  }

  #[test]
  fn string_encoded_documents_are_decoded() {
    let normalized = normalize(
      &json!("{\"amount\":150}"),
      &json!("{\"changes\":[{\"field\":\"amount\",\"old_value\":100}]}"),
    );
    assert_eq!(normalized.state, AggregateState::new().with(FieldKey::Amount, 100));
    assert!(normalized.skipped.is_empty());
  }

  #[test]
  fn garbage_inputs_degrade_to_partial_state() {
    let normalized = normalize(&json!(42), &json!({ "changes": "amount" }));
    assert!(normalized.state.is_empty());
    assert_eq!(
      normalized.skipped,
      vec![MalformedState::SnapshotNotObject, MalformedState::ChangesNotList]
    );

    let normalized = normalize(&json!({ "amount": 1 }), &json!("not json"));
    assert_eq!(normalized.state, AggregateState::new().with(FieldKey::Amount, 1));
    assert_eq!(normalized.skipped, vec![MalformedState::UnreadableDetails]);
  }
}

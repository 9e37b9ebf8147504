//! Minimal field-level patches between two states.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::state::{AggregateState, FieldKey, Scalar};

/// One mutation of a single top-level field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
  Add { field: FieldKey, value: Scalar },
  Replace { field: FieldKey, value: Scalar },
  Remove { field: FieldKey },
}

impl PatchOp {
  pub fn field(&self) -> &FieldKey {
    match self {
      Self::Add { field, .. } | Self::Replace { field, .. } | Self::Remove { field } => field,
    }
  }

  /// Each op is a plain assignment, so applying it twice is the same as once.
  pub fn apply(&self, state: &mut AggregateState) {
    match self {
      Self::Add { field, value } | Self::Replace { field, value } => {
        state.insert(field.clone(), value.clone());
      }
      Self::Remove { field } => {
        state.remove(field);
      }
    }
  }
}

/// An ordered list of [`PatchOp`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(Vec<PatchOp>);

impl Patch {
  pub fn new(ops: Vec<PatchOp>) -> Self { Self(ops) }

  pub fn ops(&self) -> &[PatchOp] { &self.0 }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn fields(&self) -> impl Iterator<Item = &FieldKey> { self.0.iter().map(PatchOp::field) }

  /// Apply every op to `state` in list order.
  pub fn apply(&self, state: &mut AggregateState) {
    for op in &self.0 {
      op.apply(state);
    }
  }

  pub fn applied_to(&self, state: &AggregateState) -> AggregateState {
    let mut next = state.clone();
    self.apply(&mut next);
    next
  }
}

impl FromIterator<PatchOp> for Patch {
  fn from_iter<I: IntoIterator<Item = PatchOp>>(iter: I) -> Self { Self(iter.into_iter().collect()) }
}

impl IntoIterator for Patch {
  type Item = PatchOp;
  type IntoIter = std::vec::IntoIter<PatchOp>;

  fn into_iter(self) -> Self::IntoIter { self.0.into_iter() }
}

/// Compute the minimal patch turning `previous` into `current`.
///
/// Emits at most one op per field, ordered lexicographically by field name.
pub fn diff(previous: &AggregateState, current: &AggregateState) -> Patch {
  let fields: BTreeSet<&FieldKey> = previous.keys().chain(current.keys()).collect();

  fields
    .into_iter()
    .filter_map(|field| match (previous.get(field), current.get(field)) {
      (None, Some(value)) => Some(PatchOp::Add { field: field.clone(), value: value.clone() }),
      (Some(old), Some(new)) if old != new => {
        Some(PatchOp::Replace { field: field.clone(), value: new.clone() })
      }
      (Some(_), None) => Some(PatchOp::Remove { field: field.clone() }),
      _ => None,
    })
    .collect()
}

//! `AggregateState`: the flat field map describing one guarantee.
//!
//! Keys come from a closed set of known guarantee attributes plus an
//! [`FieldKey::Extra`] escape hatch, so known fields are checked at compile
//! time while fields written by newer producers still round-trip. An absent
//! key and a key holding [`Scalar::Null`] are different states.

use std::{
  cmp::Ordering,
  collections::BTreeMap,
  fmt,
  hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};
use strum::EnumString;

// ─── Scalar ──────────────────────────────────────────────────────────────────

/// A single field value. Nested structures are not representable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
  Null,
  Bool(bool),
  Number(serde_json::Number),
  Text(String),
}

impl Scalar {
  /// Convert a JSON value, returning `None` for arrays and objects.
  pub fn from_json(value: &serde_json::Value) -> Option<Self> {
    use serde_json::Value;
    match value {
      Value::Null => Some(Self::Null),
      Value::Bool(b) => Some(Self::Bool(*b)),
      Value::Number(n) => Some(Self::Number(n.clone())),
      Value::String(s) => Some(Self::Text(s.clone())),
      Value::Array(_) | Value::Object(_) => None,
    }
  }

  pub fn to_json(&self) -> serde_json::Value {
    use serde_json::Value;
    match self {
      Self::Null => Value::Null,
      Self::Bool(b) => Value::Bool(*b),
      Self::Number(n) => Value::Number(n.clone()),
      Self::Text(s) => Value::String(s.clone()),
    }
  }

  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Self::Number(n) => n.as_i64(),
      _ => None,
    }
  }
}

impl From<&str> for Scalar {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for Scalar {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<bool> for Scalar {
  fn from(b: bool) -> Self { Self::Bool(b) }
}

impl From<i64> for Scalar {
  fn from(n: i64) -> Self { Self::Number(n.into()) }
}

impl From<i32> for Scalar {
  fn from(n: i32) -> Self { Self::Number(n.into()) }
}

impl From<u64> for Scalar {
  fn from(n: u64) -> Self { Self::Number(n.into()) }
}

/// Non-finite floats have no JSON representation and become `Null`.
impl From<f64> for Scalar {
  fn from(n: f64) -> Self {
    serde_json::Number::from_f64(n).map_or(Self::Null, Self::Number)
  }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
  fn from(value: Option<T>) -> Self { value.map_or(Self::Null, Into::into) }
}

// ─── FieldKey ────────────────────────────────────────────────────────────────

/// The name of a guarantee attribute.
///
/// Equality, ordering and hashing all use the wire name, so
/// `FieldKey::Extra("amount".into()) == FieldKey::Amount`. Prefer
/// [`FieldKey::parse`], which never produces such an alias.
#[derive(Debug, Clone, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(from = "String", into = "String")]
pub enum FieldKey {
  SupplierId,
  SupplierName,
  BankId,
  BankName,
  /// Supplier text exactly as imported, before matching.
  RawSupplierName,
  /// Bank text exactly as imported, before matching.
  RawBankName,
  Amount,
  Currency,
  IssueDate,
  ExpiryDate,
  ContractNumber,
  GuaranteeNumber,
  #[strum(serialize = "type")]
  GuaranteeType,
  Status,
  #[strum(default)]
  Extra(String),
}

impl FieldKey {
  pub fn parse(name: &str) -> Self {
    name
      .parse()
      .unwrap_or_else(|_| Self::Extra(name.to_owned()))
  }

  /// The wire name stored in snapshots and patches.
  pub fn as_str(&self) -> &str {
    match self {
      Self::SupplierId => "supplier_id",
      Self::SupplierName => "supplier_name",
      Self::BankId => "bank_id",
      Self::BankName => "bank_name",
      Self::RawSupplierName => "raw_supplier_name",
      Self::RawBankName => "raw_bank_name",
      Self::Amount => "amount",
      Self::Currency => "currency",
      Self::IssueDate => "issue_date",
      Self::ExpiryDate => "expiry_date",
      Self::ContractNumber => "contract_number",
      Self::GuaranteeNumber => "guarantee_number",
      Self::GuaranteeType => "type",
      Self::Status => "status",
      Self::Extra(name) => name,
    }
  }

  pub fn is_known(&self) -> bool {
    !matches!(Self::parse(self.as_str()), Self::Extra(_))
  }
}

impl PartialEq for FieldKey {
  fn eq(&self, other: &Self) -> bool { self.as_str() == other.as_str() }
}

impl Eq for FieldKey {}

impl PartialOrd for FieldKey {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for FieldKey {
  fn cmp(&self, other: &Self) -> Ordering { self.as_str().cmp(other.as_str()) }
}

impl Hash for FieldKey {
  fn hash<H: Hasher>(&self, state: &mut H) { self.as_str().hash(state) }
}

impl fmt::Display for FieldKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl From<String> for FieldKey {
  fn from(name: String) -> Self {
    match Self::parse(&name) {
      Self::Extra(_) => Self::Extra(name),
      known => known,
    }
  }
}

impl From<FieldKey> for String {
  fn from(key: FieldKey) -> Self {
    match key {
      FieldKey::Extra(name) => name,
      known => known.as_str().to_owned(),
    }
  }
}

// ─── AggregateState ──────────────────────────────────────────────────────────

/// The observable attributes of one guarantee at one point in time.
///
/// Iteration is ordered lexicographically by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateState(BTreeMap<FieldKey, Scalar>);

impl AggregateState {
  pub fn new() -> Self { Self::default() }

  /// Builder-style insert.
  pub fn with(mut self, key: impl Into<FieldKey>, value: impl Into<Scalar>) -> Self {
    self.0.insert(key.into(), value.into());
    self
  }

  pub fn get(&self, key: &FieldKey) -> Option<&Scalar> { self.0.get(key) }

  pub fn contains(&self, key: &FieldKey) -> bool { self.0.contains_key(key) }

  pub fn insert(&mut self, key: FieldKey, value: impl Into<Scalar>) -> Option<Scalar> {
    self.0.insert(key, value.into())
  }

  pub fn remove(&mut self, key: &FieldKey) -> Option<Scalar> { self.0.remove(key) }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn keys(&self) -> impl Iterator<Item = &FieldKey> { self.0.keys() }

  pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, &Scalar)> { self.0.iter() }

  /// Lenient conversion from a JSON object. Entries holding arrays or
  /// objects are dropped and their names returned alongside the state.
  pub fn from_json_object(
    object: &serde_json::Map<String, serde_json::Value>,
  ) -> (Self, Vec<String>) {
    let mut rejected = Vec::new();
    let mut state = Self::new();
    for (name, value) in object {
      match Scalar::from_json(value) {
        Some(scalar) => {
          state.0.insert(FieldKey::parse(name), scalar);
        }
        None => rejected.push(name.clone()),
      }
    }
    (state, rejected)
  }

  pub fn to_json(&self) -> serde_json::Value {
    serde_json::Value::Object(
      self
        .0
        .iter()
        .map(|(k, v)| (k.as_str().to_owned(), v.to_json()))
        .collect(),
    )
  }
}

impl FromIterator<(FieldKey, Scalar)> for AggregateState {
  fn from_iter<I: IntoIterator<Item = (FieldKey, Scalar)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

impl IntoIterator for AggregateState {
  type Item = (FieldKey, Scalar);
  type IntoIter = std::collections::btree_map::IntoIter<FieldKey, Scalar>;

  fn into_iter(self) -> Self::IntoIter { self.0.into_iter() }
}

impl<'a> IntoIterator for &'a AggregateState {
  type Item = (&'a FieldKey, &'a Scalar);
  type IntoIter = std::collections::btree_map::Iter<'a, FieldKey, Scalar>;

  fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

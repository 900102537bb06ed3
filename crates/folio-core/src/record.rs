//! Flat attribute records, the currency between entities and the mapper.
//!
//! An entity converts itself into a [`Record`] keyed by attribute name and is
//! rebuilt from one. The store never looks inside entity structs; it only
//! moves [`Value`]s between records and columns as the descriptor dictates.

use std::{collections::BTreeMap, str::FromStr};

use chrono::{DateTime, Utc};

use crate::{
  Error, Result,
  reference::{EntityKind, EntityUri},
};

// ─── Value ───────────────────────────────────────────────────────────────────

/// A coerced scalar attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Null,
  Integer(i64),
  Bool(bool),
  /// Plain text, including enum names.
  Text(String),
  Uri(EntityUri),
  Timestamp(DateTime<Utc>),
}

impl Value {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  pub fn type_name(&self) -> &'static str {
    match self {
      Self::Null => "null",
      Self::Integer(_) => "integer",
      Self::Bool(_) => "bool",
      Self::Text(_) => "text",
      Self::Uri(_) => "uri",
      Self::Timestamp(_) => "timestamp",
    }
  }
}

impl From<i64> for Value {
  fn from(v: i64) -> Self { Self::Integer(v) }
}

impl From<i32> for Value {
  fn from(v: i32) -> Self { Self::Integer(i64::from(v)) }
}

impl From<bool> for Value {
  fn from(v: bool) -> Self { Self::Bool(v) }
}

impl From<String> for Value {
  fn from(v: String) -> Self { Self::Text(v) }
}

impl From<&str> for Value {
  fn from(v: &str) -> Self { Self::Text(v.to_owned()) }
}

impl From<EntityUri> for Value {
  fn from(v: EntityUri) -> Self { Self::Uri(v) }
}

impl From<DateTime<Utc>> for Value {
  fn from(v: DateTime<Utc>) -> Self { Self::Timestamp(v) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self { v.map_or(Self::Null, Into::into) }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// The scalar attributes of one entity, keyed by attribute name.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
  kind:   EntityKind,
  values: BTreeMap<&'static str, Value>,
}

impl Record {
  pub fn new(kind: EntityKind) -> Self {
    Self { kind, values: BTreeMap::new() }
  }

  pub fn kind(&self) -> EntityKind { self.kind }

  pub fn with(mut self, attr: &'static str, value: impl Into<Value>) -> Self {
    self.set(attr, value);
    self
  }

  pub fn set(&mut self, attr: &'static str, value: impl Into<Value>) {
    self.values.insert(attr, value.into());
  }

  pub fn get(&self, attr: &str) -> Option<&Value> { self.values.get(attr) }

  pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
    self.values.iter().map(|(k, v)| (*k, v))
  }

  pub fn is_empty(&self) -> bool { self.values.is_empty() }

  fn require(&self, attr: &str) -> Result<&Value> {
    self
      .get(attr)
      .ok_or_else(|| Error::mapping(self.kind, attr, "attribute missing"))
  }

  fn mismatch(&self, attr: &str, expected: &str, found: &Value) -> Error {
    Error::mapping(
      self.kind,
      attr,
      format!("expected {expected}, found {}", found.type_name()),
    )
  }

  pub fn integer(&self, attr: &str) -> Result<i64> {
    match self.require(attr)? {
      Value::Integer(v) => Ok(*v),
      other => Err(self.mismatch(attr, "integer", other)),
    }
  }

  pub fn small_integer(&self, attr: &str) -> Result<i32> {
    let v = self.integer(attr)?;
    i32::try_from(v)
      .map_err(|_| Error::mapping(self.kind, attr, format!("{v} out of range")))
  }

  /// A missing attribute reads as absent for every `opt_*` accessor.
  pub fn opt_integer(&self, attr: &str) -> Result<Option<i64>> {
    match self.get(attr) {
      None | Some(Value::Null) => Ok(None),
      Some(Value::Integer(v)) => Ok(Some(*v)),
      Some(other) => Err(self.mismatch(attr, "integer", other)),
    }
  }

  pub fn boolean(&self, attr: &str) -> Result<bool> {
    match self.require(attr)? {
      Value::Bool(v) => Ok(*v),
      Value::Integer(v) => Ok(*v != 0),
      other => Err(self.mismatch(attr, "bool", other)),
    }
  }

  pub fn text(&self, attr: &str) -> Result<String> {
    match self.require(attr)? {
      Value::Text(v) => Ok(v.clone()),
      other => Err(self.mismatch(attr, "text", other)),
    }
  }

  pub fn opt_text(&self, attr: &str) -> Result<Option<String>> {
    match self.get(attr) {
      None | Some(Value::Null) => Ok(None),
      Some(Value::Text(v)) => Ok(Some(v.clone())),
      Some(other) => Err(self.mismatch(attr, "text", other)),
    }
  }

  /// Parse an enum attribute from its stored name.
  pub fn enumerated<E: FromStr>(&self, attr: &str) -> Result<E> {
    let name = self.text(attr)?;
    name.parse().map_err(|_| {
      Error::mapping(self.kind, attr, format!("unknown variant {name:?}"))
    })
  }

  pub fn uri(&self, attr: &str) -> Result<EntityUri> {
    match self.require(attr)? {
      Value::Uri(v) => Ok(*v),
      Value::Text(v) => v.parse().map_err(|_| {
        Error::mapping(self.kind, attr, format!("malformed reference {v:?}"))
      }),
      other => Err(self.mismatch(attr, "uri", other)),
    }
  }

  pub fn opt_timestamp(&self, attr: &str) -> Result<Option<DateTime<Utc>>> {
    match self.get(attr) {
      None | Some(Value::Null) => Ok(None),
      Some(Value::Timestamp(v)) => Ok(Some(*v)),
      Some(other) => Err(self.mismatch(attr, "timestamp", other)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::role::Role;

  #[test]
  fn typed_accessors() {
    let record = Record::new(EntityKind::Section)
      .with("title", "Preface")
      .with("index", 3)
      .with("template", None::<String>)
      .with("role", "EDITOR");

    assert_eq!(record.text("title").unwrap(), "Preface");
    assert_eq!(record.small_integer("index").unwrap(), 3);
    assert_eq!(record.opt_text("template").unwrap(), None);
    assert_eq!(record.opt_text("absent").unwrap(), None);
    assert_eq!(record.enumerated::<Role>("role").unwrap(), Role::Editor);
  }

  #[test]
  fn mismatches_are_mapping_failures() {
    let record = Record::new(EntityKind::Rule)
      .with("ruleType", "SPARKLE")
      .with("selector", 7);

    assert!(matches!(
      record.enumerated::<Role>("ruleType"),
      Err(Error::Mapping { .. })
    ));
    assert!(matches!(record.text("selector"), Err(Error::Mapping { .. })));
    assert!(matches!(record.integer("missing"), Err(Error::Mapping { .. })));
  }
}

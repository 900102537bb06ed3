//! Error types for `folio-core`.

use std::time::Duration;

use thiserror::Error;

use crate::{reference::EntityKind, role::Role};

#[derive(Debug, Error)]
pub enum Error {
  /// The row behind a `kind/id` reference does not exist, or the reference
  /// names a kind outside the closed registry.
  #[error("not found: {0}")]
  NotFound(String),

  #[error(
    "permission denied: user {user} needs {required} on {target}, has {}",
    actual.map_or("no role".to_owned(), |r| r.to_string())
  )]
  PermissionDenied {
    target:   String,
    user:     i64,
    required: Role,
    actual:   Option<Role>,
  },

  #[error("lock {name:?} not acquired within {waited:?}")]
  LockTimeout { name: String, waited: Duration },

  #[error("{operation} is not supported for {kind}")]
  UnsupportedOperation {
    kind:      EntityKind,
    operation: &'static str,
  },

  #[error("cannot map {kind}.{attribute}: {reason}")]
  Mapping {
    kind:      EntityKind,
    attribute: String,
    reason:    String,
  },

  #[error("{kind} collection repeats a logical identity")]
  DuplicateIdentity { kind: EntityKind },

  #[error("invalid descriptor for {kind}: {reason}")]
  InvalidDescriptor { kind: EntityKind, reason: String },
}

impl Error {
  pub fn not_found(what: impl std::fmt::Display) -> Self {
    Self::NotFound(what.to_string())
  }

  pub fn mapping(
    kind: EntityKind,
    attribute: impl Into<String>,
    reason: impl Into<String>,
  ) -> Self {
    Self::Mapping {
      kind,
      attribute: attribute.into(),
      reason: reason.into(),
    }
  }

  pub fn unsupported(kind: EntityKind, operation: &'static str) -> Self {
    Self::UnsupportedOperation { kind, operation }
  }

  pub fn is_not_found(&self) -> bool { matches!(self, Self::NotFound(_)) }

  pub fn is_permission_denied(&self) -> bool {
    matches!(self, Self::PermissionDenied { .. })
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

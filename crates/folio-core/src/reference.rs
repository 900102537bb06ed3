//! Entity kinds and the `kind/id` references that name stored rows.
//!
//! Two flavours exist. [`EntityUri`] can name any persisted kind and is used
//! for error reporting, delegation, and URI-valued columns. [`TargetRef`] is
//! the closed set of kinds a permission row may point at; decoding anything
//! else fails with [`Error::NotFound`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result};

// ─── EntityKind ──────────────────────────────────────────────────────────────

/// Every kind of row the store knows about. The lowercase name is the first
/// segment of a `kind/id` reference.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntityKind {
  User,
  Edition,
  Manifest,
  Transcription,
  Outline,
  Publication,
  Section,
  Rule,
  Source,
  Permission,
}

// ─── EntityUri ───────────────────────────────────────────────────────────────

/// A path-style `kind/id` reference, e.g. `section/12`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct EntityUri {
  pub kind: EntityKind,
  pub id:   i64,
}

impl EntityUri {
  pub fn new(kind: EntityKind, id: i64) -> Self { Self { kind, id } }
}

impl fmt::Display for EntityUri {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.kind, self.id)
  }
}

impl FromStr for EntityUri {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let (kind, id) = s.split_once('/').ok_or_else(|| Error::not_found(s))?;
    let kind = EntityKind::from_str(kind).map_err(|_| Error::not_found(s))?;
    let id = id.parse::<i64>().map_err(|_| Error::not_found(s))?;
    Ok(Self { kind, id })
  }
}

impl TryFrom<String> for EntityUri {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<EntityUri> for String {
  fn from(uri: EntityUri) -> Self { uri.to_string() }
}

// ─── TargetRef ───────────────────────────────────────────────────────────────

/// Uppercase tags stored in `permissions.target_type`, in [`TargetRef`]
/// variant order.
pub const TARGET_TAGS: &[&str] =
  &["EDITION", "MANIFEST", "TRANSCRIPTION", "PUBLICATION"];

/// The polymorphic target of a permission row.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum TargetRef {
  Edition(i64),
  Manifest(i64),
  Transcription(i64),
  Publication(i64),
}

impl TargetRef {
  /// Build a target from a kind and id; kinds outside the registry are
  /// reported as not found.
  pub fn new(kind: EntityKind, id: i64) -> Result<Self> {
    match kind {
      EntityKind::Edition => Ok(Self::Edition(id)),
      EntityKind::Manifest => Ok(Self::Manifest(id)),
      EntityKind::Transcription => Ok(Self::Transcription(id)),
      EntityKind::Publication => Ok(Self::Publication(id)),
      other => Err(Error::not_found(EntityUri::new(other, id))),
    }
  }

  /// Decode the `(target_type, target)` column pair.
  pub fn from_tag(tag: &str, id: i64) -> Option<Self> {
    match tag {
      "EDITION" => Some(Self::Edition(id)),
      "MANIFEST" => Some(Self::Manifest(id)),
      "TRANSCRIPTION" => Some(Self::Transcription(id)),
      "PUBLICATION" => Some(Self::Publication(id)),
      _ => None,
    }
  }

  pub fn tag(&self) -> &'static str {
    match self {
      Self::Edition(_) => "EDITION",
      Self::Manifest(_) => "MANIFEST",
      Self::Transcription(_) => "TRANSCRIPTION",
      Self::Publication(_) => "PUBLICATION",
    }
  }

  pub fn kind(&self) -> EntityKind {
    match self {
      Self::Edition(_) => EntityKind::Edition,
      Self::Manifest(_) => EntityKind::Manifest,
      Self::Transcription(_) => EntityKind::Transcription,
      Self::Publication(_) => EntityKind::Publication,
    }
  }

  pub fn id(&self) -> i64 {
    match *self {
      Self::Edition(id)
      | Self::Manifest(id)
      | Self::Transcription(id)
      | Self::Publication(id) => id,
    }
  }

  pub fn uri(&self) -> EntityUri { EntityUri::new(self.kind(), self.id()) }
}

impl From<TargetRef> for EntityUri {
  fn from(target: TargetRef) -> Self { target.uri() }
}

impl TryFrom<EntityUri> for TargetRef {
  type Error = Error;

  fn try_from(uri: EntityUri) -> Result<Self> { Self::new(uri.kind, uri.id) }
}

impl fmt::Display for TargetRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.uri().fmt(f) }
}

impl FromStr for TargetRef {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { s.parse::<EntityUri>()?.try_into() }
}

impl TryFrom<String> for TargetRef {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<TargetRef> for String {
  fn from(target: TargetRef) -> Self { target.to_string() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_registered_targets() {
    let target: TargetRef = "edition/5".parse().unwrap();
    assert_eq!(target, TargetRef::Edition(5));
    assert_eq!(target.tag(), "EDITION");
    assert_eq!(target.to_string(), "edition/5");

    let target: TargetRef = "publication/12".parse().unwrap();
    assert_eq!(target.uri(), EntityUri::new(EntityKind::Publication, 12));
  }

  #[test]
  fn unknown_or_unregistered_kinds_are_not_found() {
    assert!("widget/1".parse::<TargetRef>().unwrap_err().is_not_found());
    // A real kind, but not a permission target.
    assert!("section/1".parse::<TargetRef>().unwrap_err().is_not_found());
    assert!("edition".parse::<TargetRef>().unwrap_err().is_not_found());
    assert!("edition/x".parse::<EntityUri>().unwrap_err().is_not_found());
  }

  #[test]
  fn tags_round_trip_through_columns() {
    for (i, tag) in TARGET_TAGS.iter().enumerate() {
      let target = TargetRef::from_tag(tag, i as i64).unwrap();
      assert_eq!(target.tag(), *tag);
    }
    assert!(TargetRef::from_tag("SECTION", 1).is_none());
  }

  #[test]
  fn serializes_as_path_string() {
    let json = serde_json::to_string(&TargetRef::Manifest(3)).unwrap();
    assert_eq!(json, "\"manifest/3\"");
    let back: EntityUri = serde_json::from_str("\"source/9\"").unwrap();
    assert_eq!(back, EntityUri::new(EntityKind::Source, 9));
  }
}

//! The publication entity model.
//!
//! Entities arrive either "bare" (only an id, to be loaded) or "full"
//! (deserialised from client input, usually without ids). Every persisted
//! kind implements [`Entity`], which ties the struct to its [`Descriptor`]
//! and converts it to and from a flat [`Record`].

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, VariantNames};

use crate::{
  Error, Result,
  permission::PUBLIC_USER,
  record::Record,
  reference::{EntityKind, EntityUri, TARGET_TAGS, TargetRef},
  role::Role,
  schema::{Coercion, Descriptor, Field},
};

// ─── Traits ──────────────────────────────────────────────────────────────────

/// A kind the record mapper can persist.
pub trait Entity: Sized {
  const DESCRIPTOR: Descriptor;
  const KIND: EntityKind = Self::DESCRIPTOR.kind;

  fn id(&self) -> Option<i64>;

  fn set_id(&mut self, id: i64);

  /// Attach the entity to its owner. Roots and polymorphic rows ignore it.
  fn set_parent(&mut self, _parent: i64) {}

  /// Scalar attributes only; collections are persisted by child routines.
  fn to_record(&self) -> Record;

  fn from_record(id: i64, record: &Record) -> Result<Self>;

  fn uri(&self) -> Option<EntityUri> {
    self.id().map(|id| EntityUri::new(Self::KIND, id))
  }
}

/// The business key used to pair stored and submitted children during a
/// merge. Must return `Equal` exactly when two items are the same child.
pub trait LogicalIdentity {
  fn cmp_identity(&self, other: &Self) -> Ordering;
}

// ─── Enumerations ────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  VariantNames,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PublicationType {
  Pdf,
  Tei,
  Oac,
  Xml,
  Dynamic,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  VariantNames,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SectionType {
  Text,
  Endnote,
  Footnote,
  Index,
  TableOfContents,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  VariantNames,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
  Decoration,
  Layout,
  Link,
}

// ─── User ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  #[serde(default)]
  pub id:       Option<i64>,
  pub mail:     String,
  pub name:     String,
  #[serde(default)]
  pub disabled: bool,
}

impl User {
  pub fn new(mail: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id:       None,
      mail:     mail.into(),
      name:     name.into(),
      disabled: false,
    }
  }
}

impl Entity for User {
  const DESCRIPTOR: Descriptor = Descriptor {
    kind:   EntityKind::User,
    table:  "users",
    fields: &[
      Field::scalar("mail", Coercion::Text),
      Field::scalar("name", Coercion::Text),
      Field::scalar("disabled", Coercion::Bool),
    ],
  };

  fn id(&self) -> Option<i64> { self.id }

  fn set_id(&mut self, id: i64) { self.id = Some(id) }

  fn to_record(&self) -> Record {
    Record::new(Self::KIND)
      .with("mail", self.mail.as_str())
      .with("name", self.name.as_str())
      .with("disabled", self.disabled)
  }

  fn from_record(id: i64, record: &Record) -> Result<Self> {
    Ok(Self {
      id:       Some(id),
      mail:     record.text("mail")?,
      name:     record.text("name")?,
      disabled: record.boolean("disabled")?,
    })
  }
}

// ─── Edition ─────────────────────────────────────────────────────────────────

/// The root of the transcription side of the hierarchy. Publications,
/// outlines, manifests and transcriptions all belong to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edition {
  #[serde(default)]
  pub id:           Option<i64>,
  pub title:        String,
  #[serde(default)]
  pub creator:      Option<i64>,
  #[serde(default)]
  pub creation:     Option<DateTime<Utc>>,
  #[serde(default)]
  pub modification: Option<DateTime<Utc>>,
}

impl Edition {
  pub fn new(title: impl Into<String>) -> Self {
    Self {
      id:           None,
      title:        title.into(),
      creator:      None,
      creation:     None,
      modification: None,
    }
  }
}

impl Entity for Edition {
  const DESCRIPTOR: Descriptor = Descriptor {
    kind:   EntityKind::Edition,
    table:  "editions",
    fields: &[
      Field::scalar("title", Coercion::Text),
      Field::scalar("creator", Coercion::NullableInteger),
      Field::scalar("creation", Coercion::NullableTimestamp),
      Field::scalar("modification", Coercion::NullableTimestamp),
    ],
  };

  fn id(&self) -> Option<i64> { self.id }

  fn set_id(&mut self, id: i64) { self.id = Some(id) }

  fn to_record(&self) -> Record {
    Record::new(Self::KIND)
      .with("title", self.title.as_str())
      .with("creator", self.creator)
      .with("creation", self.creation)
      .with("modification", self.modification)
  }

  fn from_record(id: i64, record: &Record) -> Result<Self> {
    Ok(Self {
      id:           Some(id),
      title:        record.text("title")?,
      creator:      record.opt_integer("creator")?,
      creation:     record.opt_timestamp("creation")?,
      modification: record.opt_timestamp("modification")?,
    })
  }
}

// ─── Outline ─────────────────────────────────────────────────────────────────

/// An edition-level outline that sections draw their text from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outline {
  #[serde(default)]
  pub id:      Option<i64>,
  pub edition: i64,
  pub title:   String,
}

impl Entity for Outline {
  const DESCRIPTOR: Descriptor = Descriptor {
    kind:   EntityKind::Outline,
    table:  "outlines",
    fields: &[Field::parent("edition"), Field::scalar("title", Coercion::Text)],
  };

  fn id(&self) -> Option<i64> { self.id }

  fn set_id(&mut self, id: i64) { self.id = Some(id) }

  fn set_parent(&mut self, parent: i64) { self.edition = parent }

  fn to_record(&self) -> Record {
    Record::new(Self::KIND)
      .with("edition", self.edition)
      .with("title", self.title.as_str())
  }

  fn from_record(id: i64, record: &Record) -> Result<Self> {
    Ok(Self {
      id:      Some(id),
      edition: record.integer("edition")?,
      title:   record.text("title")?,
    })
  }
}

// ─── Publication ─────────────────────────────────────────────────────────────

/// The aggregate root on the publishing side. Its `modification` stamp moves
/// whenever anything beneath it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
  #[serde(default)]
  pub id:               Option<i64>,
  pub edition:          i64,
  pub title:            String,
  pub publication_type: PublicationType,
  #[serde(default)]
  pub creator:          Option<i64>,
  #[serde(default)]
  pub creation:         Option<DateTime<Utc>>,
  #[serde(default)]
  pub modification:     Option<DateTime<Utc>>,
  #[serde(default)]
  pub sections:         Vec<Section>,
  #[serde(default)]
  pub permissions:      Vec<Permission>,
}

impl Publication {
  pub fn new(
    edition: i64,
    title: impl Into<String>,
    publication_type: PublicationType,
  ) -> Self {
    Self {
      id: None,
      edition,
      title: title.into(),
      publication_type,
      creator: None,
      creation: None,
      modification: None,
      sections: Vec::new(),
      permissions: Vec::new(),
    }
  }

  pub fn target(&self) -> Option<TargetRef> { self.id.map(TargetRef::Publication) }
}

impl Entity for Publication {
  const DESCRIPTOR: Descriptor = Descriptor {
    kind:   EntityKind::Publication,
    table:  "publications",
    fields: &[
      Field::parent("edition"),
      Field::scalar("title", Coercion::Text),
      Field::scalar("publicationType", Coercion::Enum(PublicationType::VARIANTS)),
      Field::scalar("creator", Coercion::NullableInteger),
      Field::scalar("creation", Coercion::NullableTimestamp),
      Field::scalar("modification", Coercion::NullableTimestamp),
      Field::collection("sections"),
      Field::collection("permissions"),
    ],
  };

  fn id(&self) -> Option<i64> { self.id }

  fn set_id(&mut self, id: i64) { self.id = Some(id) }

  fn set_parent(&mut self, parent: i64) { self.edition = parent }

  fn to_record(&self) -> Record {
    Record::new(Self::KIND)
      .with("edition", self.edition)
      .with("title", self.title.as_str())
      .with("publicationType", self.publication_type.as_ref())
      .with("creator", self.creator)
      .with("creation", self.creation)
      .with("modification", self.modification)
  }

  fn from_record(id: i64, record: &Record) -> Result<Self> {
    Ok(Self {
      id:               Some(id),
      edition:          record.integer("edition")?,
      title:            record.text("title")?,
      publication_type: record.enumerated("publicationType")?,
      creator:          record.opt_integer("creator")?,
      creation:         record.opt_timestamp("creation")?,
      modification:     record.opt_timestamp("modification")?,
      sections:         Vec::new(),
      permissions:      Vec::new(),
    })
  }
}

// ─── Section ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
  #[serde(default)]
  pub id:           Option<i64>,
  #[serde(default)]
  pub publication:  Option<i64>,
  pub title:        String,
  pub index:        i32,
  pub section_type: SectionType,
  #[serde(default)]
  pub template:     Option<String>,
  #[serde(default)]
  pub rules:        Vec<Rule>,
  #[serde(default)]
  pub sources:      Vec<OutlineRef>,
}

impl Section {
  pub fn new(index: i32, title: impl Into<String>, section_type: SectionType) -> Self {
    Self {
      id: None,
      publication: None,
      title: title.into(),
      index,
      section_type,
      template: None,
      rules: Vec::new(),
      sources: Vec::new(),
    }
  }
}

impl Entity for Section {
  const DESCRIPTOR: Descriptor = Descriptor {
    kind:   EntityKind::Section,
    table:  "sections",
    fields: &[
      Field::parent("publication"),
      Field::scalar("title", Coercion::Text),
      Field::scalar("index", Coercion::Integer),
      Field::scalar("sectionType", Coercion::Enum(SectionType::VARIANTS)),
      Field::scalar("template", Coercion::NullableText),
      Field::collection("rules"),
      Field::collection("sources"),
    ],
  };

  fn id(&self) -> Option<i64> { self.id }

  fn set_id(&mut self, id: i64) { self.id = Some(id) }

  fn set_parent(&mut self, parent: i64) { self.publication = Some(parent) }

  fn to_record(&self) -> Record {
    Record::new(Self::KIND)
      .with("publication", self.publication)
      .with("title", self.title.as_str())
      .with("index", self.index)
      .with("sectionType", self.section_type.as_ref())
      .with("template", self.template.clone())
  }

  fn from_record(id: i64, record: &Record) -> Result<Self> {
    Ok(Self {
      id:           Some(id),
      publication:  record.opt_integer("publication")?,
      title:        record.text("title")?,
      index:        record.small_integer("index")?,
      section_type: record.enumerated("sectionType")?,
      template:     record.opt_text("template")?,
      rules:        Vec::new(),
      sources:      Vec::new(),
    })
  }
}

impl LogicalIdentity for Section {
  fn cmp_identity(&self, other: &Self) -> Ordering { self.index.cmp(&other.index) }
}

// ─── Rule ────────────────────────────────────────────────────────────────────

/// A presentation rule applied to the annotations a selector matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
  #[serde(default)]
  pub id:        Option<i64>,
  #[serde(default)]
  pub section:   Option<i64>,
  pub rule_type: RuleType,
  pub selector:  String,
  #[serde(default)]
  pub action:    Option<String>,
}

impl Rule {
  pub fn new(
    rule_type: RuleType,
    selector: impl Into<String>,
    action: Option<&str>,
  ) -> Self {
    Self {
      id: None,
      section: None,
      rule_type,
      selector: selector.into(),
      action: action.map(str::to_owned),
    }
  }
}

impl Entity for Rule {
  const DESCRIPTOR: Descriptor = Descriptor {
    kind:   EntityKind::Rule,
    table:  "rules",
    fields: &[
      Field::parent("section"),
      Field::scalar("ruleType", Coercion::Enum(RuleType::VARIANTS)),
      Field::scalar("selector", Coercion::Text),
      Field::scalar("action", Coercion::NullableText),
    ],
  };

  fn id(&self) -> Option<i64> { self.id }

  fn set_id(&mut self, id: i64) { self.id = Some(id) }

  fn set_parent(&mut self, parent: i64) { self.section = Some(parent) }

  fn to_record(&self) -> Record {
    Record::new(Self::KIND)
      .with("section", self.section)
      .with("ruleType", self.rule_type.as_ref())
      .with("selector", self.selector.as_str())
      .with("action", self.action.clone())
  }

  fn from_record(id: i64, record: &Record) -> Result<Self> {
    Ok(Self {
      id:        Some(id),
      section:   record.opt_integer("section")?,
      rule_type: record.enumerated("ruleType")?,
      selector:  record.text("selector")?,
      action:    record.opt_text("action")?,
    })
  }
}

impl LogicalIdentity for Rule {
  fn cmp_identity(&self, other: &Self) -> Ordering {
    (self.rule_type, self.selector.as_str())
      .cmp(&(other.rule_type, other.selector.as_str()))
  }
}

// ─── OutlineRef ──────────────────────────────────────────────────────────────

/// One of a section's sources: an ordered pointer at an outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineRef {
  #[serde(default)]
  pub id:      Option<i64>,
  #[serde(default)]
  pub section: Option<i64>,
  pub outline: EntityUri,
  pub index:   i32,
}

impl OutlineRef {
  pub fn new(outline: i64, index: i32) -> Self {
    Self {
      id: None,
      section: None,
      outline: EntityUri::new(EntityKind::Outline, outline),
      index,
    }
  }
}

impl Entity for OutlineRef {
  const DESCRIPTOR: Descriptor = Descriptor {
    kind:   EntityKind::Source,
    table:  "section_sources",
    fields: &[
      Field::parent("section"),
      Field::scalar("outline", Coercion::Uri),
      Field::scalar("index", Coercion::Integer),
    ],
  };

  fn id(&self) -> Option<i64> { self.id }

  fn set_id(&mut self, id: i64) { self.id = Some(id) }

  fn set_parent(&mut self, parent: i64) { self.section = Some(parent) }

  fn to_record(&self) -> Record {
    Record::new(Self::KIND)
      .with("section", self.section)
      .with("outline", self.outline)
      .with("index", self.index)
  }

  fn from_record(id: i64, record: &Record) -> Result<Self> {
    Ok(Self {
      id:      Some(id),
      section: record.opt_integer("section")?,
      outline: record.uri("outline")?,
      index:   record.small_integer("index")?,
    })
  }
}

impl LogicalIdentity for OutlineRef {
  fn cmp_identity(&self, other: &Self) -> Ordering { self.outline.cmp(&other.outline) }
}

// ─── Permission ──────────────────────────────────────────────────────────────

/// A grant of `role` on `target` to `user`; user [`PUBLIC_USER`] means
/// everyone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
  #[serde(default)]
  pub id:     Option<i64>,
  pub target: TargetRef,
  pub user:   i64,
  pub role:   Role,
}

impl Permission {
  pub fn new(target: TargetRef, user: i64, role: Role) -> Self {
    Self { id: None, target, user, role }
  }

  pub fn public(target: TargetRef, role: Role) -> Self {
    Self::new(target, PUBLIC_USER, role)
  }
}

impl Entity for Permission {
  const DESCRIPTOR: Descriptor = Descriptor {
    kind:   EntityKind::Permission,
    table:  "permissions",
    fields: &[
      Field::scalar("targetType", Coercion::Enum(TARGET_TAGS)),
      Field::scalar("target", Coercion::Integer),
      Field::scalar("user", Coercion::Integer),
      Field::scalar("role", Coercion::Enum(Role::VARIANTS)),
    ],
  };

  fn id(&self) -> Option<i64> { self.id }

  fn set_id(&mut self, id: i64) { self.id = Some(id) }

  fn to_record(&self) -> Record {
    Record::new(Self::KIND)
      .with("targetType", self.target.tag())
      .with("target", self.target.id())
      .with("user", self.user)
      .with("role", self.role.as_ref())
  }

  fn from_record(id: i64, record: &Record) -> Result<Self> {
    let tag = record.text("targetType")?;
    let target = TargetRef::from_tag(&tag, record.integer("target")?).ok_or_else(|| {
      Error::mapping(Self::KIND, "targetType", format!("unknown target tag {tag:?}"))
    })?;
    Ok(Self {
      id: Some(id),
      target,
      user: record.integer("user")?,
      role: record.enumerated("role")?,
    })
  }
}

impl LogicalIdentity for Permission {
  fn cmp_identity(&self, other: &Self) -> Ordering {
    (self.target, self.user).cmp(&(other.target, other.user))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn section_record_round_trip() {
    let mut section = Section::new(2, "Notes", SectionType::Endnote);
    section.publication = Some(9);
    section.template = Some("<div/>".into());

    let back = Section::from_record(4, &section.to_record()).unwrap();
    assert_eq!(back.id, Some(4));
    assert_eq!(back.publication, Some(9));
    assert_eq!(back.section_type, SectionType::Endnote);
    assert_eq!(back.template.as_deref(), Some("<div/>"));
  }

  #[test]
  fn permission_rejects_unknown_tag() {
    let record = Record::new(EntityKind::Permission)
      .with("targetType", "SECTION")
      .with("target", 1)
      .with("user", 2)
      .with("role", "VIEWER");
    assert!(matches!(
      Permission::from_record(1, &record),
      Err(Error::Mapping { .. })
    ));
  }

  #[test]
  fn rule_identity_ignores_action() {
    let a = Rule::new(RuleType::Decoration, "note", Some("italic"));
    let b = Rule::new(RuleType::Decoration, "note", Some("bold"));
    let c = Rule::new(RuleType::Layout, "note", None);
    assert_eq!(a.cmp_identity(&b), Ordering::Equal);
    assert_ne!(a.cmp_identity(&c), Ordering::Equal);
  }

  #[test]
  fn deserializes_client_graph_without_ids() {
    let json = r#"{
      "edition": 1,
      "title": "Letters",
      "publicationType": "DYNAMIC",
      "sections": [{
        "title": "Body",
        "index": 0,
        "sectionType": "TEXT",
        "rules": [{"ruleType": "DECORATION", "selector": "del", "action": "strike"}],
        "sources": [{"outline": "outline/4", "index": 0}]
      }],
      "permissions": [{"target": "publication/1", "user": 0, "role": "VIEWER"}]
    }"#;
    let publication: Publication = serde_json::from_str(json).unwrap();
    assert_eq!(publication.id, None);
    assert_eq!(publication.sections[0].rules[0].selector, "del");
    assert_eq!(publication.sections[0].sources[0].outline.id, 4);
    assert_eq!(publication.permissions[0].target, TargetRef::Publication(1));
  }
}

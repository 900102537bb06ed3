//! Declarative per-kind schema descriptors and the catalog built from them.
//!
//! Each entity kind declares its attributes once as a [`Descriptor`]. At
//! startup the descriptors are resolved into a [`Catalog`]: column names are
//! derived from attribute names by the store's naming convention
//! (`publicationType` → `publication_type`) and the whole set is validated.
//! The catalog is then passed explicitly to everything that maps rows.

use std::collections::{BTreeMap, HashSet};

use crate::{
  Error, Result,
  entity::{Edition, Entity, Outline, OutlineRef, Permission, Publication, Rule, Section, User},
  record::Record,
  reference::EntityKind,
};

// ─── Descriptors ─────────────────────────────────────────────────────────────

/// How a column's stored value is interpreted for an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
  Integer,
  NullableInteger,
  Bool,
  Text,
  NullableText,
  /// Text that must be one of the listed variant names.
  Enum(&'static [&'static str]),
  /// Text holding a `kind/id` reference.
  Uri,
  /// RFC 3339 text; absent until the store stamps it.
  NullableTimestamp,
  /// One-to-many; never read from a row. The owning kind loads it through a
  /// child query.
  Collection,
}

impl Coercion {
  pub fn is_nullable(self) -> bool {
    matches!(
      self,
      Self::NullableInteger | Self::NullableText | Self::NullableTimestamp
    )
  }
}

/// One declared attribute.
#[derive(Debug, Clone, Copy)]
pub struct Field {
  pub attr:     &'static str,
  pub coercion: Coercion,
  /// Foreign key to the owning entity. Excluded from merge diffs and patches.
  pub parent:   bool,
}

impl Field {
  pub const fn scalar(attr: &'static str, coercion: Coercion) -> Self {
    Self { attr, coercion, parent: false }
  }

  pub const fn parent(attr: &'static str) -> Self {
    Self { attr, coercion: Coercion::Integer, parent: true }
  }

  pub const fn collection(attr: &'static str) -> Self {
    Self { attr, coercion: Coercion::Collection, parent: false }
  }
}

/// The static declaration of one kind's table and attributes.
#[derive(Debug, Clone, Copy)]
pub struct Descriptor {
  pub kind:   EntityKind,
  pub table:  &'static str,
  pub fields: &'static [Field],
}

/// Manifests are only ever permission targets here; nothing maps them into a
/// struct.
pub const MANIFEST: Descriptor = Descriptor {
  kind:   EntityKind::Manifest,
  table:  "manifests",
  fields: &[Field::parent("edition"), Field::scalar("title", Coercion::Text)],
};

pub const TRANSCRIPTION: Descriptor = Descriptor {
  kind:   EntityKind::Transcription,
  table:  "transcriptions",
  fields: &[Field::parent("edition"), Field::scalar("title", Coercion::Text)],
};

/// Every kind the store persists.
pub const STANDARD: &[Descriptor] = &[
  User::DESCRIPTOR,
  Edition::DESCRIPTOR,
  MANIFEST,
  TRANSCRIPTION,
  Outline::DESCRIPTOR,
  Publication::DESCRIPTOR,
  Section::DESCRIPTOR,
  Rule::DESCRIPTOR,
  OutlineRef::DESCRIPTOR,
  Permission::DESCRIPTOR,
];

// ─── Resolved schema ─────────────────────────────────────────────────────────

/// Convert an attribute name to its column name: camelCase → snake_case.
pub fn column_name(attr: &str) -> String {
  let mut out = String::with_capacity(attr.len() + 4);
  for (i, c) in attr.chars().enumerate() {
    if c.is_ascii_uppercase() {
      if i > 0 {
        out.push('_');
      }
      out.push(c.to_ascii_lowercase());
    } else {
      out.push(c);
    }
  }
  out
}

/// A scalar attribute bound to its column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
  pub attr:     &'static str,
  pub name:     String,
  pub coercion: Coercion,
  pub parent:   bool,
}

/// A validated descriptor.
#[derive(Debug, Clone)]
pub struct EntitySchema {
  pub kind:    EntityKind,
  pub table:   &'static str,
  columns:     Vec<Column>,
  collections: Vec<&'static str>,
}

impl EntitySchema {
  fn resolve(descriptor: &Descriptor) -> Result<Self> {
    let kind = descriptor.kind;
    let invalid = |reason: String| Error::InvalidDescriptor { kind, reason };

    if descriptor.table.is_empty()
      || !descriptor
        .table
        .chars()
        .all(|c| c.is_ascii_lowercase() || c == '_')
    {
      return Err(invalid(format!("bad table name {:?}", descriptor.table)));
    }

    let mut attrs = HashSet::new();
    let mut names = HashSet::new();
    let mut columns = Vec::new();
    let mut collections = Vec::new();
    let mut parents = 0;

    for field in descriptor.fields {
      let attr = field.attr;
      if attr == "id" {
        return Err(invalid("identity is implicit and must not be declared".into()));
      }
      let well_formed = attr.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && attr.chars().all(|c| c.is_ascii_alphanumeric());
      if !well_formed {
        return Err(invalid(format!("bad attribute name {attr:?}")));
      }
      if !attrs.insert(attr) {
        return Err(invalid(format!("attribute {attr:?} declared twice")));
      }
      if let Coercion::Enum(variants) = field.coercion
        && variants.is_empty()
      {
        return Err(invalid(format!("enum attribute {attr:?} has no variants")));
      }
      if field.coercion == Coercion::Collection {
        collections.push(attr);
        continue;
      }
      if field.parent {
        parents += 1;
        if field.coercion != Coercion::Integer {
          return Err(invalid(format!("parent {attr:?} must be an integer key")));
        }
      }
      let name = column_name(attr);
      if !names.insert(name.clone()) {
        return Err(invalid(format!("column {name:?} mapped twice")));
      }
      columns.push(Column {
        attr,
        name,
        coercion: field.coercion,
        parent: field.parent,
      });
    }

    if parents > 1 {
      return Err(invalid("more than one parent key".into()));
    }

    Ok(Self { kind, table: descriptor.table, columns, collections })
  }

  /// All mapped columns in declaration order, parent key included.
  pub fn columns(&self) -> &[Column] { &self.columns }

  pub fn column(&self, attr: &str) -> Option<&Column> {
    self.columns.iter().find(|c| c.attr == attr)
  }

  pub fn parent(&self) -> Option<&Column> { self.columns.iter().find(|c| c.parent) }

  pub fn is_collection(&self, attr: &str) -> bool { self.collections.contains(&attr) }

  /// Ordered children carry an explicit `index` column.
  pub fn is_ordered(&self) -> bool { self.column("index").is_some() }

  /// Non-key columns whose values differ between two records.
  pub fn changed_columns<'a>(&'a self, old: &Record, new: &Record) -> Vec<&'a Column> {
    self
      .columns
      .iter()
      .filter(|c| !c.parent && old.get(c.attr) != new.get(c.attr))
      .collect()
  }
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// The validated table registry. Built once at startup and handed to the
/// store.
#[derive(Debug, Clone)]
pub struct Catalog {
  schemas: BTreeMap<EntityKind, EntitySchema>,
}

impl Catalog {
  pub fn new(descriptors: &[Descriptor]) -> Result<Self> {
    let mut schemas = BTreeMap::new();
    let mut tables = HashSet::new();
    for descriptor in descriptors {
      let schema = EntitySchema::resolve(descriptor)?;
      if !tables.insert(schema.table) {
        return Err(Error::InvalidDescriptor {
          kind:   schema.kind,
          reason: format!("table {:?} already registered", schema.table),
        });
      }
      if schemas.insert(schema.kind, schema).is_some() {
        return Err(Error::InvalidDescriptor {
          kind:   descriptor.kind,
          reason: "kind registered twice".into(),
        });
      }
    }
    Ok(Self { schemas })
  }

  /// The catalog for every kind in [`STANDARD`].
  pub fn standard() -> Result<Self> { Self::new(STANDARD) }

  pub fn schema(&self, kind: EntityKind) -> Result<&EntitySchema> {
    self
      .schemas
      .get(&kind)
      .ok_or_else(|| Error::unsupported(kind, "persistence"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn naming_convention() {
    assert_eq!(column_name("publicationType"), "publication_type");
    assert_eq!(column_name("index"), "index");
    assert_eq!(column_name("targetType"), "target_type");
  }

  #[test]
  fn standard_catalog_resolves() {
    let catalog = Catalog::standard().unwrap();

    let section = catalog.schema(EntityKind::Section).unwrap();
    assert_eq!(section.table, "sections");
    assert!(section.is_ordered());
    assert!(section.is_collection("rules"));
    assert!(section.column("rules").is_none());
    assert_eq!(section.parent().unwrap().name, "publication");
    assert_eq!(section.column("sectionType").unwrap().name, "section_type");

    let permission = catalog.schema(EntityKind::Permission).unwrap();
    assert!(permission.parent().is_none());
    assert_eq!(permission.column("targetType").unwrap().name, "target_type");
  }

  #[test]
  fn rejects_bad_descriptors() {
    const DUP: Descriptor = Descriptor {
      kind:   EntityKind::Rule,
      table:  "rules",
      fields: &[
        Field::scalar("selector", Coercion::Text),
        Field::scalar("selector", Coercion::Text),
      ],
    };
    assert!(matches!(
      Catalog::new(&[DUP]),
      Err(Error::InvalidDescriptor { .. })
    ));

    const ID: Descriptor = Descriptor {
      kind:   EntityKind::Rule,
      table:  "rules",
      fields: &[Field::scalar("id", Coercion::Integer)],
    };
    assert!(Catalog::new(&[ID]).is_err());

    // Attribute names are camelCase; the column spelling is derived.
    const SNAKE: Descriptor = Descriptor {
      kind:   EntityKind::Rule,
      table:  "rules",
      fields: &[Field::scalar("rule_type", Coercion::Text)],
    };
    assert!(Catalog::new(&[SNAKE]).is_err());

    assert!(Catalog::new(&[MANIFEST, MANIFEST]).is_err());
  }

  #[test]
  fn unknown_kind_is_unsupported() {
    let catalog = Catalog::new(&[MANIFEST]).unwrap();
    assert!(matches!(
      catalog.schema(EntityKind::Rule),
      Err(Error::UnsupportedOperation { .. })
    ));
  }
}

//! Per-kind capabilities.
//!
//! [`Persistable`] is implemented by every kind the mapper stores,
//! [`Mergeable`] by kinds that may appear as children in a merge, and
//! [`Authorizable`] by kinds the permission resolver can evaluate. The
//! defaults cover scalar-only kinds; kinds with collections override the
//! child routines.

use folio_core::{
  Error as CoreError,
  entity::{Edition, Entity, Outline, OutlineRef, Permission, Publication, Rule, Section, User},
  reference::{EntityKind, EntityUri, TargetRef},
};

use crate::{
  Result, Session,
  authz::{Authority, OUTLINE_GRANTS, RULE_GRANTS, SECTION_GRANTS, SOURCE_GRANTS},
  mapper,
  merge::{self, MergeContext},
};

// ─── Traits ──────────────────────────────────────────────────────────────────

pub trait Persistable: Entity {
  /// Populate collection attributes from their child tables.
  fn load_children(&mut self, _session: &Session<'_>, _deep: bool) -> Result<()> { Ok(()) }

  /// Insert this entity and everything beneath it, returning its new id.
  fn insert(&mut self, session: &Session<'_>) -> Result<i64> {
    let id = mapper::insert_row(session, self)?;
    self.insert_children(session, id)?;
    Ok(id)
  }

  fn insert_children(&mut self, _session: &Session<'_>, _id: i64) -> Result<()> { Ok(()) }

  fn delete(self, session: &Session<'_>) -> Result<()> {
    let id = self.id().ok_or_else(|| CoreError::not_found(format!("{}/<unsaved>", Self::KIND)))?;
    mapper::delete(session, EntityUri::new(Self::KIND, id))
  }
}

pub trait Mergeable: Persistable {
  /// Reconcile this stored entity with its submitted counterpart: write the
  /// changed scalars, then merge nested collections. `new` leaves with the
  /// stored id and parent.
  fn merge(&mut self, session: &Session<'_>, new: &mut Self, _ctx: &MergeContext) -> Result<()> {
    merge::merge_scalars(session, self, new).map(drop)
  }
}

pub trait Authorizable: Entity {
  fn authority(id: i64) -> Authority;
}

// ─── Roots ───────────────────────────────────────────────────────────────────

impl Persistable for User {}

impl Mergeable for User {
  fn merge(&mut self, _: &Session<'_>, _: &mut Self, _: &MergeContext) -> Result<()> {
    Err(CoreError::unsupported(Self::KIND, "merge").into())
  }
}

impl Persistable for Edition {}

impl Authorizable for Edition {
  fn authority(id: i64) -> Authority { Authority::Direct(TargetRef::Edition(id)) }
}

impl Persistable for Outline {}

impl Authorizable for Outline {
  fn authority(id: i64) -> Authority {
    Authority::Delegated { uri: EntityUri::new(Self::KIND, id), grants: OUTLINE_GRANTS }
  }
}

// ─── Publication ─────────────────────────────────────────────────────────────

pub(crate) fn permissions_sql(session: &Session<'_>) -> Result<String> {
  Ok(format!(
    "{} WHERE target_type = ?1 AND target = ?2 ORDER BY \"user\"",
    mapper::select_sql(session.schema(EntityKind::Permission)?)
  ))
}

impl Persistable for Publication {
  fn load_children(&mut self, session: &Session<'_>, deep: bool) -> Result<()> {
    let Some(id) = self.id else { return Ok(()) };
    let sql = mapper::children_sql(session.schema(EntityKind::Section)?)?;
    self.sections = mapper::load_children(session, &sql, [id], deep)?;
    let target = TargetRef::Publication(id);
    self.permissions = mapper::load_children(
      session,
      &permissions_sql(session)?,
      rusqlite::params![target.tag(), id],
      false,
    )?;
    Ok(())
  }

  fn insert_children(&mut self, session: &Session<'_>, id: i64) -> Result<()> {
    for section in &mut self.sections {
      section.set_parent(id);
      section.insert(session)?;
    }
    for permission in &mut self.permissions {
      permission.target = TargetRef::Publication(id);
      permission.insert(session)?;
    }
    Ok(())
  }
}

impl Mergeable for Publication {
  fn merge(&mut self, _: &Session<'_>, _: &mut Self, _: &MergeContext) -> Result<()> {
    Err(CoreError::unsupported(Self::KIND, "merge").into())
  }
}

impl Authorizable for Publication {
  fn authority(id: i64) -> Authority { Authority::Direct(TargetRef::Publication(id)) }
}

// ─── Section ─────────────────────────────────────────────────────────────────

impl Persistable for Section {
  fn load_children(&mut self, session: &Session<'_>, deep: bool) -> Result<()> {
    let Some(id) = self.id else { return Ok(()) };
    let rules = mapper::children_sql(session.schema(EntityKind::Rule)?)?;
    self.rules = mapper::load_children(session, &rules, [id], deep)?;
    let sources = mapper::children_sql(session.schema(EntityKind::Source)?)?;
    self.sources = mapper::load_children(session, &sources, [id], deep)?;
    Ok(())
  }

  fn insert_children(&mut self, session: &Session<'_>, id: i64) -> Result<()> {
    for rule in &mut self.rules {
      rule.set_parent(id);
      rule.insert(session)?;
    }
    for source in &mut self.sources {
      source.set_parent(id);
      source.insert(session)?;
    }
    Ok(())
  }
}

impl Mergeable for Section {
  fn merge(&mut self, session: &Session<'_>, new: &mut Self, ctx: &MergeContext) -> Result<()> {
    let id = merge::merge_scalars(session, self, new)?;
    let rules = merge::merge_children(
      session,
      Some(id),
      std::mem::take(&mut self.rules),
      &mut new.rules,
      None,
      ctx,
    )?;
    let sources = merge::merge_children(
      session,
      Some(id),
      std::mem::take(&mut self.sources),
      &mut new.sources,
      None,
      ctx,
    )?;
    tracing::debug!(section = id, ?rules, ?sources, "merged section children");
    Ok(())
  }
}

impl Authorizable for Section {
  fn authority(id: i64) -> Authority {
    Authority::Delegated { uri: EntityUri::new(Self::KIND, id), grants: SECTION_GRANTS }
  }
}

// ─── Leaves ──────────────────────────────────────────────────────────────────

impl Persistable for Rule {}

impl Mergeable for Rule {}

impl Authorizable for Rule {
  fn authority(id: i64) -> Authority {
    Authority::Delegated { uri: EntityUri::new(Self::KIND, id), grants: RULE_GRANTS }
  }
}

impl Persistable for OutlineRef {}

impl Mergeable for OutlineRef {}

impl Authorizable for OutlineRef {
  fn authority(id: i64) -> Authority {
    Authority::Delegated { uri: EntityUri::new(Self::KIND, id), grants: SOURCE_GRANTS }
  }
}

// ─── Permission ──────────────────────────────────────────────────────────────

/// Permission rows are written with an upsert on `(target, user)`, so
/// inserting a grant that already exists replaces its role.
impl Persistable for Permission {
  fn insert(&mut self, session: &Session<'_>) -> Result<i64> {
    mapper::upsert_row(session, self, &["targetType", "target", "user"])
  }
}

impl Mergeable for Permission {}

//! Sparse attribute updates.

use folio_core::{
  Error as CoreError,
  entity::{LogicalIdentity, OutlineRef, Rule, Section},
  merge::ensure_distinct,
  patch,
  reference::{EntityKind, EntityUri},
};
use rusqlite::OptionalExtension;
use serde_json::{Map, Value as Json};

use crate::{Result, Session, entity::Persistable, mapper};

/// Apply the scalar keys of `sparse` to the row behind `target` in one
/// UPDATE. `false` when no key survives planning.
///
/// A patch may touch the attributes children are matched by, so the
/// target's siblings are checked afterwards and a collision fails with
/// `DuplicateIdentity`. Run it inside a guarded section so that failure
/// rolls the UPDATE back.
pub fn modify(session: &Session<'_>, target: EntityUri, sparse: &Map<String, Json>) -> Result<bool> {
  let schema = session.schema(target.kind)?;
  let assignments = patch::plan(schema, sparse)?;
  if assignments.is_empty() {
    tracing::debug!(uri = %target, "patch had nothing to write");
    return Ok(false);
  }
  if mapper::update_columns(session, schema, target.id, &assignments)? == 0 {
    return Err(CoreError::not_found(target).into());
  }
  let checked = match target.kind {
    EntityKind::Section => siblings_distinct::<Section>(session, target),
    EntityKind::Rule => siblings_distinct::<Rule>(session, target),
    EntityKind::Source => siblings_distinct::<OutlineRef>(session, target),
    _ => Ok(()),
  };
  checked.map(|()| true)
}

fn siblings_distinct<T: Persistable + LogicalIdentity>(
  session: &Session<'_>,
  target: EntityUri,
) -> Result<()> {
  let schema = session.schema(T::KIND)?;
  let Some(parent) = schema.parent() else {
    return Ok(());
  };
  let sql = format!("SELECT \"{}\" FROM \"{}\" WHERE \"id\" = ?1", parent.name, schema.table);
  let owner: i64 = session
    .conn()
    .query_row(&sql, [target.id], |r| r.get(0))
    .optional()?
    .ok_or_else(|| CoreError::not_found(target))?;

  let siblings: Vec<T> = mapper::load_children(session, &mapper::children_sql(schema)?, [owner], false)?;
  ensure_distinct(&siblings, T::cmp_identity, T::KIND)?;
  Ok(())
}

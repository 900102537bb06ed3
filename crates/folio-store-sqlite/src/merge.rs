//! Binds the core merge engine to the store.

use folio_core::{
  Error as CoreError,
  entity::LogicalIdentity,
  merge::{self as engine, ChildSink, Filter, MergeCounts},
  patch::Assignment,
  record::Value,
};

use crate::{
  Error, Result, Session,
  entity::{Mergeable, Persistable},
};

/// Settings shared by every level of one merge.
#[derive(Debug, Clone, Copy)]
pub struct MergeContext {
  pub actor:     i64,
  /// Propagated into nested collections.
  pub replacing: bool,
}

struct StoreSink<'s, 'c> {
  session: &'s Session<'c>,
  parent:  Option<i64>,
  ctx:     &'s MergeContext,
}

impl<T: Mergeable> ChildSink<T> for StoreSink<'_, '_> {
  type Error = Error;

  fn update(&mut self, old: &mut T, new: &mut T) -> Result<()> { old.merge(self.session, new, self.ctx) }

  fn delete(&mut self, old: T) -> Result<()> { old.delete(self.session) }

  fn insert(&mut self, new: &mut T) -> Result<()> {
    if let Some(parent) = self.parent {
      new.set_parent(parent);
    }
    new.insert(self.session).map(drop)
  }
}

/// Reconcile the stored children of `parent` with the submitted ones.
///
/// Submitted collections that repeat a logical identity are refused before
/// anything is written.
pub fn merge_children<T: Mergeable + LogicalIdentity>(
  session: &Session<'_>,
  parent: Option<i64>,
  old: Vec<T>,
  new: &mut [T],
  filter: Option<Filter<'_, T, Error>>,
  ctx: &MergeContext,
) -> Result<MergeCounts> {
  engine::ensure_distinct(new, T::cmp_identity, T::KIND)?;
  let mut sink = StoreSink { session, parent, ctx };
  let counts = engine::merge_children(old, new, T::cmp_identity, filter, ctx.replacing, &mut sink)?;
  if counts.rejected > 0 {
    tracing::warn!(kind = %T::KIND, ?parent, rejected = counts.rejected, "children rejected by filter");
  }
  tracing::debug!(kind = %T::KIND, ?parent, ?counts, "merged children");
  Ok(counts)
}

/// Write the scalar columns that differ between `old` and `new`, then give
/// `new` the stored id and parent. Returns the id.
pub fn merge_scalars<T: Persistable>(session: &Session<'_>, old: &T, new: &mut T) -> Result<i64> {
  let id = old
    .id()
    .ok_or_else(|| CoreError::mapping(T::KIND, "id", "stored child without an id"))?;
  let schema = session.schema(T::KIND)?;
  let before = old.to_record();
  let after = new.to_record();

  let changed: Vec<Assignment<'_>> = schema
    .changed_columns(&before, &after)
    .into_iter()
    .map(|column| Assignment {
      column,
      value: after.get(column.attr).cloned().unwrap_or(Value::Null),
    })
    .collect();
  if !changed.is_empty() {
    crate::mapper::update_columns(session, schema, id, &changed)?;
  }

  new.set_id(id);
  if let Some(Value::Integer(parent)) = schema.parent().and_then(|p| before.get(p.attr)) {
    new.set_parent(*parent);
  }
  Ok(id)
}

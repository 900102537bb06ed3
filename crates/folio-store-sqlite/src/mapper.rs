//! The generic record mapper.
//!
//! Every statement is generated from an [`EntitySchema`]: the SELECT list is
//! `id` followed by the schema's columns in declaration order, and rows are
//! coerced column by column into a [`Record`] the entity rebuilds itself
//! from. No statement here knows which kind it is handling.

use folio_core::{
  Error as CoreError,
  patch::Assignment,
  record::{Record, Value},
  reference::{EntityUri, TargetRef},
  schema::EntitySchema,
};
use rusqlite::{OptionalExtension as _, Params, Row, params_from_iter};

use crate::{Result, Session, encode, entity::Persistable};

// ─── Statements ──────────────────────────────────────────────────────────────

/// `SELECT "id", <columns> FROM "<table>"`. Queries handed to
/// [`load_children`] must select the same list.
pub fn select_sql(schema: &EntitySchema) -> String {
  let mut sql = String::from("SELECT \"id\"");
  for column in schema.columns() {
    sql.push_str(", \"");
    sql.push_str(&column.name);
    sql.push('"');
  }
  sql.push_str(&format!(" FROM \"{}\"", schema.table));
  sql
}

/// Children of one parent, ordered by `index` when the kind is ordered.
pub fn children_sql(schema: &EntitySchema) -> Result<String> {
  let parent = schema
    .parent()
    .ok_or_else(|| CoreError::unsupported(schema.kind, "child listing"))?;
  let order = if schema.is_ordered() { "\"index\", \"id\"" } else { "\"id\"" };
  Ok(format!(
    "{} WHERE \"{}\" = ?1 ORDER BY {order}",
    select_sql(schema),
    parent.name
  ))
}

fn placeholders(n: usize) -> String {
  (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

fn quoted<'a>(names: impl Iterator<Item = &'a str>) -> String {
  names.map(|n| format!("\"{n}\"")).collect::<Vec<_>>().join(", ")
}

// ─── Reads ───────────────────────────────────────────────────────────────────

/// Split a row selected by [`select_sql`] into its id and record.
pub fn read_record(schema: &EntitySchema, row: &Row<'_>) -> Result<(i64, Record)> {
  let id: i64 = row.get(0)?;
  let mut record = Record::new(schema.kind);
  for (i, column) in schema.columns().iter().enumerate() {
    record.set(column.attr, encode::read_value(row, i + 1, column, schema.kind)?);
  }
  Ok((id, record))
}

/// Load one entity by id; `deep` also loads its collections.
pub fn load<T: Persistable>(session: &Session<'_>, id: i64, deep: bool) -> Result<T> {
  let schema = session.schema(T::KIND)?;
  let sql = format!("{} WHERE \"id\" = ?1", select_sql(schema));
  let mut stmt = session.conn().prepare_cached(&sql)?;
  let found = stmt
    .query_row([id], |row| Ok(read_record(schema, row)))
    .optional()?
    .transpose()?;
  let (_, record) = found.ok_or_else(|| CoreError::not_found(EntityUri::new(T::KIND, id)))?;

  let mut entity = T::from_record(id, &record)?;
  if deep {
    entity.load_children(session, deep)?;
  }
  Ok(entity)
}

/// Run a child query and build one entity per row. With `deep` each child
/// is fully loaded by id; otherwise its fields come from the row itself.
pub fn load_children<T: Persistable>(
  session: &Session<'_>,
  sql: &str,
  params: impl Params,
  deep: bool,
) -> Result<Vec<T>> {
  let schema = session.schema(T::KIND)?;
  let mut stmt = session.conn().prepare_cached(sql)?;
  let mut rows = stmt.query(params)?;
  let mut children = Vec::new();
  while let Some(row) = rows.next()? {
    let child = if deep {
      load::<T>(session, row.get(0)?, true)?
    } else {
      let (id, record) = read_record(schema, row)?;
      T::from_record(id, &record)?
    };
    children.push(child);
  }
  Ok(children)
}

// ─── Writes ──────────────────────────────────────────────────────────────────

fn bind(schema: &EntitySchema, record: &Record) -> Result<Vec<rusqlite::types::Value>> {
  schema
    .columns()
    .iter()
    .map(|column| match record.get(column.attr) {
      Some(Value::Null) | None if !column.coercion.is_nullable() => {
        Err(CoreError::mapping(schema.kind, column.attr, "required attribute absent").into())
      }
      Some(value) => Ok(encode::to_sql(value)),
      None => Ok(rusqlite::types::Value::Null),
    })
    .collect()
}

/// INSERT the entity's scalar columns and record the assigned id on it.
pub fn insert_row<T: Persistable>(session: &Session<'_>, entity: &mut T) -> Result<i64> {
  let schema = session.schema(T::KIND)?;
  let values = bind(schema, &entity.to_record())?;
  let sql = format!(
    "INSERT INTO \"{}\" ({}) VALUES ({})",
    schema.table,
    quoted(schema.columns().iter().map(|c| c.name.as_str())),
    placeholders(values.len()),
  );
  session.conn().execute(&sql, params_from_iter(values))?;
  let id = session.conn().last_insert_rowid();
  entity.set_id(id);
  session.note_write();
  Ok(id)
}

/// INSERT, or on a clash of the `unique` attributes overwrite the remaining
/// columns of the existing row. Records the surviving row's id.
pub fn upsert_row<T: Persistable>(
  session: &Session<'_>,
  entity: &mut T,
  unique: &[&str],
) -> Result<i64> {
  let schema = session.schema(T::KIND)?;
  let values = bind(schema, &entity.to_record())?;
  let conflict = unique
    .iter()
    .map(|attr| {
      schema
        .column(attr)
        .map(|c| c.name.as_str())
        .ok_or_else(|| CoreError::mapping(schema.kind, *attr, "unknown attribute"))
    })
    .collect::<Result<Vec<_>, _>>()?;
  let updates = schema
    .columns()
    .iter()
    .filter(|c| !conflict.contains(&c.name.as_str()))
    .map(|c| format!("\"{0}\" = excluded.\"{0}\"", c.name))
    .collect::<Vec<_>>()
    .join(", ");
  let sql = format!(
    "INSERT INTO \"{}\" ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {updates} RETURNING \"id\"",
    schema.table,
    quoted(schema.columns().iter().map(|c| c.name.as_str())),
    placeholders(values.len()),
    quoted(conflict.iter().copied()),
  );
  let id: i64 = session
    .conn()
    .query_row(&sql, params_from_iter(values), |r| r.get(0))?;
  entity.set_id(id);
  session.note_write();
  Ok(id)
}

/// UPDATE only the assigned columns of one row. Returns the number of rows
/// touched: `0` when the row does not exist.
pub fn update_columns(
  session: &Session<'_>,
  schema: &EntitySchema,
  id: i64,
  assignments: &[Assignment<'_>],
) -> Result<usize> {
  if assignments.is_empty() {
    return Ok(0);
  }
  let sets = assignments
    .iter()
    .enumerate()
    .map(|(i, a)| format!("\"{}\" = ?{}", a.column.name, i + 1))
    .collect::<Vec<_>>()
    .join(", ");
  let sql = format!(
    "UPDATE \"{}\" SET {sets} WHERE \"id\" = ?{}",
    schema.table,
    assignments.len() + 1
  );
  let mut values: Vec<_> = assignments.iter().map(|a| encode::to_sql(&a.value)).collect();
  values.push(rusqlite::types::Value::Integer(id));
  let n = session.conn().execute(&sql, params_from_iter(values))?;
  if n > 0 {
    session.note_write();
  }
  Ok(n)
}

/// DELETE one row. Children go with it through the foreign keys; permission
/// rows naming it as their target are deleted here.
pub fn delete(session: &Session<'_>, uri: EntityUri) -> Result<()> {
  let schema = session.schema(uri.kind)?;
  let sql = format!("DELETE FROM \"{}\" WHERE \"id\" = ?1", schema.table);
  if session.conn().execute(&sql, [uri.id])? == 0 {
    return Err(CoreError::not_found(uri).into());
  }
  if let Ok(target) = TargetRef::try_from(uri) {
    let grants = session.conn().execute(
      "DELETE FROM permissions WHERE target_type = ?1 AND target = ?2",
      rusqlite::params![target.tag(), target.id()],
    )?;
    tracing::debug!(uri = %target, grants, "deleted permission rows with their target");
  }
  session.note_write();
  Ok(())
}

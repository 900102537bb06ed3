//! The synchronous unit of work that runs on the connection thread.

use std::cell::Cell;

use chrono::{DateTime, Utc};
use folio_core::{
  Error as CoreError,
  reference::{EntityKind, EntityUri, TargetRef},
  schema::{Catalog, EntitySchema},
};
use rusqlite::{Connection, OptionalExtension as _};

use crate::{Result, encode::encode_dt};

/// A borrowed connection plus the catalog, for the duration of one
/// `conn.call`. Inside a guarded section the connection is the open
/// transaction.
pub struct Session<'c> {
  conn:    &'c Connection,
  catalog: &'c Catalog,
  now:     DateTime<Utc>,
  writes:  Cell<usize>,
}

impl<'c> Session<'c> {
  pub fn new(conn: &'c Connection, catalog: &'c Catalog) -> Self {
    Self { conn, catalog, now: Utc::now(), writes: Cell::new(0) }
  }

  pub fn conn(&self) -> &'c Connection { self.conn }

  pub fn catalog(&self) -> &'c Catalog { self.catalog }

  pub fn schema(&self, kind: EntityKind) -> Result<&'c EntitySchema> {
    Ok(self.catalog.schema(kind)?)
  }

  /// The instant every timestamp written by this session carries.
  pub fn now(&self) -> DateTime<Utc> { self.now }

  /// Rows inserted, updated or deleted so far, root stamps excluded.
  pub fn writes(&self) -> usize { self.writes.get() }

  pub(crate) fn note_write(&self) { self.writes.set(self.writes.get() + 1) }

  pub fn exists(&self, uri: EntityUri) -> Result<bool> {
    let schema = self.schema(uri.kind)?;
    let sql = format!("SELECT 1 FROM \"{}\" WHERE \"id\" = ?1", schema.table);
    Ok(
      self
        .conn
        .query_row(&sql, [uri.id], |_| Ok(()))
        .optional()?
        .is_some(),
    )
  }

  /// The aggregate root owning `uri`: the publication or edition whose
  /// modification stamp and advisory lock cover it.
  pub fn root_of(&self, uri: EntityUri) -> Result<EntityUri> {
    let parent_query = match uri.kind {
      EntityKind::Edition | EntityKind::Publication => return Ok(uri),
      EntityKind::Section => (EntityKind::Publication, "SELECT publication FROM sections WHERE id = ?1"),
      EntityKind::Rule => (
        EntityKind::Publication,
        "SELECT s.publication FROM rules r JOIN sections s ON s.id = r.section WHERE r.id = ?1",
      ),
      EntityKind::Source => (
        EntityKind::Publication,
        "SELECT s.publication FROM section_sources x JOIN sections s ON s.id = x.section \
         WHERE x.id = ?1",
      ),
      EntityKind::Manifest => (EntityKind::Edition, "SELECT edition FROM manifests WHERE id = ?1"),
      EntityKind::Transcription => {
        (EntityKind::Edition, "SELECT edition FROM transcriptions WHERE id = ?1")
      }
      EntityKind::Outline => (EntityKind::Edition, "SELECT edition FROM outlines WHERE id = ?1"),
      EntityKind::Permission => {
        let target = self
          .conn
          .query_row(
            "SELECT target_type, target FROM permissions WHERE id = ?1",
            [uri.id],
            |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)),
          )
          .optional()?
          .and_then(|(tag, id)| TargetRef::from_tag(&tag, id))
          .ok_or_else(|| CoreError::not_found(uri))?;
        return self.root_of(target.uri());
      }
      EntityKind::User => return Err(CoreError::unsupported(uri.kind, "aggregate lookup").into()),
    };

    let (root_kind, sql) = parent_query;
    let root = self
      .conn
      .query_row(sql, [uri.id], |r| r.get::<_, i64>(0))
      .optional()?
      .ok_or_else(|| CoreError::not_found(uri))?;
    Ok(EntityUri::new(root_kind, root))
  }

  /// Move the root's modification time to [`Session::now`].
  pub fn stamp_modified(&self, root: EntityUri) -> Result<()> {
    let table = match root.kind {
      EntityKind::Edition => "editions",
      EntityKind::Publication => "publications",
      other => return Err(CoreError::unsupported(other, "modification stamp").into()),
    };
    let sql = format!("UPDATE {table} SET modification = ?1 WHERE id = ?2");
    let n = self
      .conn
      .execute(&sql, rusqlite::params![encode_dt(self.now), root.id])?;
    if n == 0 {
      return Err(CoreError::not_found(root).into());
    }
    tracing::trace!(%root, "stamped modification");
    Ok(())
  }
}

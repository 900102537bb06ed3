//! Permission resolution against the `permissions` table.
//!
//! Editions, manifests, transcriptions and publications carry grants
//! directly. Sections, rules, sources and outlines carry none; their grants
//! are those of the owning publication or edition, reached with a single
//! join. Nothing else walks the hierarchy for authorization.

use std::str::FromStr as _;

use folio_core::{
  Error as CoreError,
  entity::{Edition, Outline, OutlineRef, Publication, Rule, Section},
  permission::{self, Grant},
  reference::{EntityKind, EntityUri, TargetRef},
  role::Role,
};

use crate::{Result, Session, entity::Authorizable};

pub(crate) const SECTION_GRANTS: &str = "\
  SELECT p.\"user\", p.role FROM sections s \
  JOIN permissions p ON p.target_type = 'PUBLICATION' AND p.target = s.publication \
  WHERE s.id = ?1";

pub(crate) const RULE_GRANTS: &str = "\
  SELECT p.\"user\", p.role FROM rules r \
  JOIN sections s ON s.id = r.section \
  JOIN permissions p ON p.target_type = 'PUBLICATION' AND p.target = s.publication \
  WHERE r.id = ?1";

pub(crate) const SOURCE_GRANTS: &str = "\
  SELECT p.\"user\", p.role FROM section_sources x \
  JOIN sections s ON s.id = x.section \
  JOIN permissions p ON p.target_type = 'PUBLICATION' AND p.target = s.publication \
  WHERE x.id = ?1";

pub(crate) const OUTLINE_GRANTS: &str = "\
  SELECT p.\"user\", p.role FROM outlines o \
  JOIN permissions p ON p.target_type = 'EDITION' AND p.target = o.edition \
  WHERE o.id = ?1";

/// Where the grants for one entity live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
  /// Rows in `permissions` naming the entity itself.
  Direct(TargetRef),
  /// Rows of the owning aggregate, selected by `grants` with `?1 = uri.id`.
  Delegated { uri: EntityUri, grants: &'static str },
}

impl Authority {
  /// The authority for an arbitrary reference. Users and permission rows
  /// cannot be authorized against.
  pub fn of(uri: EntityUri) -> Result<Self> {
    Ok(match uri.kind {
      EntityKind::Edition => Edition::authority(uri.id),
      EntityKind::Publication => Publication::authority(uri.id),
      EntityKind::Manifest | EntityKind::Transcription => Self::Direct(TargetRef::try_from(uri)?),
      EntityKind::Section => Section::authority(uri.id),
      EntityKind::Rule => Rule::authority(uri.id),
      EntityKind::Source => OutlineRef::authority(uri.id),
      EntityKind::Outline => Outline::authority(uri.id),
      kind @ (EntityKind::User | EntityKind::Permission) => {
        return Err(CoreError::unsupported(kind, "authorization").into());
      }
    })
  }

  pub fn uri(&self) -> EntityUri {
    match self {
      Self::Direct(target) => target.uri(),
      Self::Delegated { uri, .. } => *uri,
    }
  }
}

fn grants(session: &Session<'_>, authority: &Authority) -> Result<Vec<Grant>> {
  let conn = session.conn();
  let raw: Vec<(i64, String)> = match authority {
    Authority::Direct(target) => {
      let mut stmt = conn.prepare_cached(
        "SELECT \"user\", role FROM permissions WHERE target_type = ?1 AND target = ?2",
      )?;
      let rows = stmt
        .query_map(rusqlite::params![target.tag(), target.id()], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<rusqlite::Result<_>>()?;
      rows
    }
    Authority::Delegated { uri, grants: sql } => {
      let mut stmt = conn.prepare_cached(sql)?;
      let rows = stmt
        .query_map([uri.id], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<rusqlite::Result<_>>()?;
      rows
    }
  };

  raw
    .into_iter()
    .map(|(user, role)| {
      let role = Role::from_str(&role)
        .map_err(|_| CoreError::mapping(EntityKind::Permission, "role", format!("unknown role {role:?}")))?;
      Ok(Grant { user, role })
    })
    .collect()
}

/// The best role `user` holds over the authority's target, counting public
/// grants when `check_public` is set.
///
/// With no applicable grant at all the target's existence is checked, so a
/// missing target is `NotFound` rather than a silent `None`.
pub fn resolve(
  session: &Session<'_>,
  authority: &Authority,
  user: i64,
  check_public: bool,
) -> Result<Option<Role>> {
  let resolved = permission::best_role(&grants(session, authority)?, user, check_public);
  if resolved.is_none() && !session.exists(authority.uri())? {
    return Err(CoreError::not_found(authority.uri()).into());
  }
  Ok(resolved)
}

/// Resolve including public grants and fail unless `required` is met.
pub fn authorize(session: &Session<'_>, authority: &Authority, user: i64, required: Role) -> Result<Role> {
  let resolved = resolve(session, authority, user, true)?;
  let role = permission::require(resolved, required, authority.uri(), user)?;
  tracing::trace!(uri = %authority.uri(), user, %role, "authorized");
  Ok(role)
}

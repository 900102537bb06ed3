//! The `PublicationStore` trait and its result types.
//!
//! The trait is implemented by storage backends (e.g. `folio-store-sqlite`).
//! Collaborators such as the CLI or an HTTP layer build entity graphs from
//! their input, call these operations on behalf of an acting user, and
//! serialise what comes back.
//!
//! Every mutating operation authorizes the actor, runs under the advisory
//! lock of the aggregate it touches, and stamps that aggregate's
//! modification time before committing.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::{
  entity::{Edition, Outline, OutlineRef, Permission, Publication, Rule, Section, User},
  merge::MergeCounts,
  reference::{EntityUri, TargetRef},
  role::Role,
};

/// Counters plus the merged children, ids filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome<T> {
  pub counts:   MergeCounts,
  pub children: Vec<T>,
}

/// Abstraction over a Folio store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait PublicationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Users & editions ──────────────────────────────────────────────────

  fn add_user(
    &self,
    user: User,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// Create an edition owned by `actor`.
  fn add_edition(
    &self,
    actor: i64,
    edition: Edition,
  ) -> impl Future<Output = Result<Edition, Self::Error>> + Send + '_;

  /// Add an outline to an edition; requires EDITOR on the edition.
  fn add_outline(
    &self,
    actor: i64,
    outline: Outline,
  ) -> impl Future<Output = Result<Outline, Self::Error>> + Send + '_;

  // ── Publications ──────────────────────────────────────────────────────

  /// Insert a full publication graph under its edition. The actor needs
  /// EDITOR on the edition and becomes OWNER of the publication.
  fn insert_publication(
    &self,
    actor: i64,
    publication: Publication,
  ) -> impl Future<Output = Result<Publication, Self::Error>> + Send + '_;

  /// Load a publication; `deep` also loads sections, their rules and
  /// sources, and the publication's permission rows.
  fn load_publication(
    &self,
    actor: i64,
    id: i64,
    deep: bool,
  ) -> impl Future<Output = Result<Publication, Self::Error>> + Send + '_;

  /// Delete a publication and its permission rows; requires OWNER.
  fn delete_publication(
    &self,
    actor: i64,
    id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Merges ────────────────────────────────────────────────────────────

  fn merge_sections(
    &self,
    actor: i64,
    publication: i64,
    sections: Vec<Section>,
    replacing: bool,
  ) -> impl Future<Output = Result<MergeOutcome<Section>, Self::Error>> + Send + '_;

  fn merge_rules(
    &self,
    actor: i64,
    section: i64,
    rules: Vec<Rule>,
    replacing: bool,
  ) -> impl Future<Output = Result<MergeOutcome<Rule>, Self::Error>> + Send + '_;

  fn merge_sources(
    &self,
    actor: i64,
    section: i64,
    sources: Vec<OutlineRef>,
    replacing: bool,
  ) -> impl Future<Output = Result<MergeOutcome<OutlineRef>, Self::Error>> + Send + '_;

  /// Reconcile the permission rows of `target`. Rows the actor may not
  /// manage are rejected rather than written.
  fn merge_permissions(
    &self,
    actor: i64,
    target: TargetRef,
    permissions: Vec<Permission>,
    replacing: bool,
  ) -> impl Future<Output = Result<MergeOutcome<Permission>, Self::Error>> + Send + '_;

  // ── Patches ───────────────────────────────────────────────────────────

  /// Apply a sparse attribute map to one row. Returns `false` when nothing
  /// patchable was supplied.
  fn modify(
    &self,
    actor: i64,
    target: EntityUri,
    sparse: Map<String, Json>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Authorization ─────────────────────────────────────────────────────

  fn resolve(
    &self,
    target: EntityUri,
    user: i64,
    check_public: bool,
  ) -> impl Future<Output = Result<Option<Role>, Self::Error>> + Send + '_;

  /// Resolve including public grants and fail unless the result reaches
  /// `required`.
  fn check_permission(
    &self,
    target: EntityUri,
    user: i64,
    required: Role,
  ) -> impl Future<Output = Result<Role, Self::Error>> + Send + '_;
}

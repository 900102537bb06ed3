//! [`SqliteStore`], the SQLite implementation of [`PublicationStore`].

use std::{path::Path, sync::Arc, time::Duration};

use folio_core::{
  Error as CoreError,
  entity::{
    Edition, Entity, LogicalIdentity, Outline, OutlineRef, Permission, Publication, Rule, Section,
    User,
  },
  merge::{Filter, ensure_distinct},
  reference::{EntityKind, EntityUri, TargetRef},
  role::Role,
  schema::Catalog,
  store::{MergeOutcome, PublicationStore},
};
use serde_json::{Map, Value as Json};

use crate::{
  Error, Result, Session,
  authz::{self, Authority},
  entity::{Authorizable, Mergeable, Persistable, permissions_sql},
  lock::{self, LockOptions},
  mapper,
  merge::{self, MergeContext},
  patch,
  schema::SCHEMA,
};

// ─── Options ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoreOptions {
  pub lock_timeout:       Duration,
  pub lock_stale_after:   Duration,
  pub lock_poll_interval: Duration,
  /// How long a statement waits on another connection's write lock before
  /// reporting the database busy.
  pub busy_timeout:       Duration,
}

impl Default for StoreOptions {
  fn default() -> Self {
    let lock = LockOptions::default();
    Self {
      lock_timeout:       lock.timeout,
      lock_stale_after:   lock.stale_after,
      lock_poll_interval: lock.poll_interval,
      busy_timeout:       Duration::from_secs(5),
    }
  }
}

impl StoreOptions {
  fn lock(&self) -> LockOptions {
    LockOptions {
      timeout:       self.lock_timeout,
      stale_after:   self.lock_stale_after,
      poll_interval: self.lock_poll_interval,
      busy_timeout:  self.busy_timeout,
    }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Folio store backed by a single SQLite file.
///
/// Cloning is cheap; clones share one connection thread. Separate
/// [`SqliteStore::open`] calls on the same file coordinate through advisory
/// locks.
#[derive(Clone)]
pub struct SqliteStore {
  conn:    tokio_rusqlite::Connection,
  catalog: Arc<Catalog>,
  options: StoreOptions,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, catalog: Catalog, options: StoreOptions) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, catalog: Arc::new(catalog), options };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store with the standard catalog. Useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self {
      conn,
      catalog: Arc::new(Catalog::standard()?),
      options: StoreOptions::default(),
    };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let busy = self.options.busy_timeout;
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(busy)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub fn catalog(&self) -> &Catalog { &self.catalog }

  pub fn options(&self) -> &StoreOptions { &self.options }

  /// Run `f` on the connection thread in autocommit mode.
  pub async fn session<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Session<'_>) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    let catalog = Arc::clone(&self.catalog);
    self
      .conn
      .call(move |conn| Ok(f(&Session::new(conn, &catalog))))
      .await?
  }

  /// Run `f` in a transaction without taking a lock.
  pub async fn transaction<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Session<'_>) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    let catalog = Arc::clone(&self.catalog);
    self
      .conn
      .call(move |conn| Ok(lock::transact(conn, &catalog, f)))
      .await?
  }

  /// Run `f` as a guarded section under the advisory lock `name`.
  pub async fn guarded<T, F>(&self, name: impl Into<String>, f: F) -> Result<T>
  where
    F: FnOnce(&Session<'_>) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self.guarded_all(vec![name.into()], f).await
  }

  /// Run `f` as one guarded section holding every lock in `names`, taken
  /// in order. Editions come before publications.
  pub async fn guarded_all<T, F>(&self, names: Vec<String>, f: F) -> Result<T>
  where
    F: FnOnce(&Session<'_>) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    let catalog = Arc::clone(&self.catalog);
    let options = self.options.lock();
    self
      .conn
      .call(move |conn| Ok(lock::guarded(conn, &catalog, &names, &options, f)))
      .await?
  }

  /// The edition that owns publication `id`.
  async fn publication_edition(&self, id: i64) -> Result<EntityUri> {
    let publication: Publication = self.session(move |s| mapper::load(s, id, false)).await?;
    Ok(EntityUri::new(EntityKind::Edition, publication.edition))
  }

  /// The aggregate root `uri` belongs to, which names its lock.
  async fn root_of(&self, uri: EntityUri) -> Result<EntityUri> {
    self.session(move |s| s.root_of(uri)).await
  }

  /// Shared body of the child-collection merges: authorize EDITOR, load the
  /// stored children, merge, and stamp the root when anything was written.
  async fn merge_under<T, Q>(
    &self,
    actor: i64,
    parent: EntityUri,
    mut children: Vec<T>,
    replacing: bool,
    query: Q,
  ) -> Result<MergeOutcome<T>>
  where
    T: Mergeable + LogicalIdentity + Send + 'static,
    Q: FnOnce(&Session<'_>) -> Result<Vec<T>> + Send + 'static,
  {
    let root = self.root_of(parent).await?;
    self
      .guarded(root.to_string(), move |s| {
        authz::authorize(s, &Authority::of(parent)?, actor, Role::Editor)?;
        let old = query(s)?;
        let ctx = MergeContext { actor, replacing };
        let counts = merge::merge_children(s, Some(parent.id), old, &mut children, None, &ctx)?;
        if s.writes() > 0 {
          s.stamp_modified(root)?;
        }
        tracing::info!(%parent, kind = %T::KIND, ?counts, "merge complete");
        Ok(MergeOutcome { counts, children })
      })
      .await
  }
}

fn grant_owner(session: &Session<'_>, target: TargetRef, user: i64) -> Result<()> {
  Permission::new(target, user, Role::Owner).insert(session).map(drop)
}

fn children_of<T: Persistable + 'static>(
  kind: EntityKind,
  parent: i64,
) -> impl FnOnce(&Session<'_>) -> Result<Vec<T>> + Send + 'static {
  move |s| {
    let sql = mapper::children_sql(s.schema(kind)?)?;
    mapper::load_children(s, &sql, [parent], true)
  }
}

// ─── PublicationStore impl ───────────────────────────────────────────────────

impl PublicationStore for SqliteStore {
  type Error = Error;

  // ── Users & editions ──────────────────────────────────────────────────────

  async fn add_user(&self, mut user: User) -> Result<User> {
    self
      .session(move |s| {
        user.insert(s)?;
        Ok(user)
      })
      .await
  }

  async fn get_user(&self, id: i64) -> Result<User> {
    self.session(move |s| mapper::load(s, id, false)).await
  }

  async fn add_edition(&self, actor: i64, mut edition: Edition) -> Result<Edition> {
    self
      .transaction(move |s| {
        mapper::load::<User>(s, actor, false)?;
        edition.creator = Some(actor);
        edition.creation = Some(s.now());
        edition.modification = Some(s.now());
        let id = edition.insert(s)?;
        grant_owner(s, TargetRef::Edition(id), actor)?;
        tracing::info!(edition = id, actor, "edition created");
        Ok(edition)
      })
      .await
  }

  async fn add_outline(&self, actor: i64, mut outline: Outline) -> Result<Outline> {
    let root = EntityUri::new(EntityKind::Edition, outline.edition);
    self
      .guarded(root.to_string(), move |s| {
        authz::authorize(s, &Edition::authority(root.id), actor, Role::Editor)?;
        outline.insert(s)?;
        s.stamp_modified(root)?;
        Ok(outline)
      })
      .await
  }

  // ── Publications ──────────────────────────────────────────────────────────

  async fn insert_publication(&self, actor: i64, mut publication: Publication) -> Result<Publication> {
    let root = EntityUri::new(EntityKind::Edition, publication.edition);
    self
      .guarded(root.to_string(), move |s| {
        authz::authorize(s, &Edition::authority(root.id), actor, Role::Editor)?;
        ensure_distinct(&publication.sections, Section::cmp_identity, Section::KIND)?;
        for section in &publication.sections {
          ensure_distinct(&section.rules, Rule::cmp_identity, Rule::KIND)?;
          ensure_distinct(&section.sources, OutlineRef::cmp_identity, OutlineRef::KIND)?;
        }
        publication.id = None;
        publication.creator = Some(actor);
        publication.creation = Some(s.now());
        publication.modification = Some(s.now());
        let id = publication.insert(s)?;
        grant_owner(s, TargetRef::Publication(id), actor)?;
        s.stamp_modified(root)?;
        tracing::info!(publication = id, actor, writes = s.writes(), "publication inserted");
        mapper::load(s, id, true)
      })
      .await
  }

  async fn load_publication(&self, actor: i64, id: i64, deep: bool) -> Result<Publication> {
    self
      .session(move |s| {
        authz::authorize(s, &Publication::authority(id), actor, Role::Viewer)?;
        mapper::load(s, id, deep)
      })
      .await
  }

  async fn delete_publication(&self, actor: i64, id: i64) -> Result<()> {
    // The edition's stamp is written too, so its lock is held alongside the
    // publication's.
    let uri = EntityUri::new(EntityKind::Publication, id);
    let edition = self.publication_edition(id).await?;
    self
      .guarded_all(vec![edition.to_string(), uri.to_string()], move |s| {
        authz::authorize(s, &Publication::authority(id), actor, Role::Owner)?;
        let publication: Publication = mapper::load(s, id, false)?;
        publication.delete(s)?;
        s.stamp_modified(edition)?;
        tracing::info!(publication = id, actor, "publication deleted");
        Ok(())
      })
      .await
  }

  // ── Merges ────────────────────────────────────────────────────────────────

  async fn merge_sections(
    &self,
    actor: i64,
    publication: i64,
    sections: Vec<Section>,
    replacing: bool,
  ) -> Result<MergeOutcome<Section>> {
    let parent = EntityUri::new(EntityKind::Publication, publication);
    self
      .merge_under(actor, parent, sections, replacing, children_of(EntityKind::Section, publication))
      .await
  }

  async fn merge_rules(
    &self,
    actor: i64,
    section: i64,
    rules: Vec<Rule>,
    replacing: bool,
  ) -> Result<MergeOutcome<Rule>> {
    let parent = EntityUri::new(EntityKind::Section, section);
    self
      .merge_under(actor, parent, rules, replacing, children_of(EntityKind::Rule, section))
      .await
  }

  async fn merge_sources(
    &self,
    actor: i64,
    section: i64,
    sources: Vec<OutlineRef>,
    replacing: bool,
  ) -> Result<MergeOutcome<OutlineRef>> {
    let parent = EntityUri::new(EntityKind::Section, section);
    self
      .merge_under(actor, parent, sources, replacing, children_of(EntityKind::Source, section))
      .await
  }

  async fn merge_permissions(
    &self,
    actor: i64,
    target: TargetRef,
    mut permissions: Vec<Permission>,
    replacing: bool,
  ) -> Result<MergeOutcome<Permission>> {
    let root = self.root_of(target.uri()).await?;
    self
      .guarded(root.to_string(), move |s| {
        let standing = authz::authorize(s, &Authority::Direct(target), actor, Role::Editor)?;

        for permission in &mut permissions {
          permission.target = target;
        }
        if let Some(excess) = permissions.iter().find(|p| p.role.outranks(standing)) {
          return Err(
            CoreError::PermissionDenied {
              target:   target.to_string(),
              user:     actor,
              required: excess.role,
              actual:   Some(standing),
            }
            .into(),
          );
        }

        let old = mapper::load_children::<Permission>(
          s,
          &permissions_sql(s)?,
          rusqlite::params![target.tag(), target.id()],
          false,
        )?;

        // Stored rows above the actor, and the actor's own row, are off limits.
        let mut manageable = |p: &Permission| -> Result<bool> {
          let allowed = p.user != actor && !p.role.outranks(standing);
          if !allowed {
            tracing::debug!(user = p.user, role = %p.role, "permission row not manageable by actor");
          }
          Ok(allowed)
        };
        let filter: Filter<'_, Permission, Error> = &mut manageable;

        let ctx = MergeContext { actor, replacing };
        let counts = merge::merge_children(s, None, old, &mut permissions, Some(filter), &ctx)?;
        if s.writes() > 0 {
          s.stamp_modified(root)?;
        }
        tracing::info!(uri = %target, ?counts, "permissions merged");
        Ok(MergeOutcome { counts, children: permissions })
      })
      .await
  }

  // ── Patches ───────────────────────────────────────────────────────────────

  async fn modify(&self, actor: i64, target: EntityUri, sparse: Map<String, Json>) -> Result<bool> {
    let authority = Authority::of(target)?;
    let root = self.root_of(target).await?;
    self
      .guarded(root.to_string(), move |s| {
        authz::authorize(s, &authority, actor, Role::Editor)?;
        let applied = patch::modify(s, target, &sparse)?;
        if applied {
          s.stamp_modified(root)?;
        }
        Ok(applied)
      })
      .await
  }

  // ── Authorization ─────────────────────────────────────────────────────────

  async fn resolve(&self, target: EntityUri, user: i64, check_public: bool) -> Result<Option<Role>> {
    let authority = Authority::of(target)?;
    self
      .session(move |s| authz::resolve(s, &authority, user, check_public))
      .await
  }

  async fn check_permission(&self, target: EntityUri, user: i64, required: Role) -> Result<Role> {
    let authority = Authority::of(target)?;
    self
      .session(move |s| authz::authorize(s, &authority, user, required))
      .await
  }
}

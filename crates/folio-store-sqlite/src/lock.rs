//! Named advisory locks and the guarded sections they protect.
//!
//! SQLite has no named locks, so a lock is a row in `advisory_locks`: the
//! primary key makes insertion the acquisition test. Contending writers poll
//! until the bounded wait runs out. Rows older than the stale threshold are
//! taken to belong to a crashed holder and are reclaimed.

use std::time::{Duration, Instant};

use chrono::Utc;
use folio_core::{Error as CoreError, schema::Catalog};
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use uuid::Uuid;

use crate::{Result, Session};

#[derive(Debug, Clone)]
pub struct LockOptions {
  /// Longest wait for a contended lock before `LockTimeout`.
  pub timeout:       Duration,
  pub stale_after:   Duration,
  pub poll_interval: Duration,
  /// The connection's configured busy timeout. Acquisition shortens it to
  /// the time left on the lock wait and restores it afterwards.
  pub busy_timeout:  Duration,
}

impl Default for LockOptions {
  fn default() -> Self {
    Self {
      timeout:       Duration::from_secs(10),
      stale_after:   Duration::from_secs(300),
      poll_interval: Duration::from_millis(25),
      busy_timeout:  Duration::from_secs(5),
    }
  }
}

/// A held lock row. Dropping it without [`AdvisoryLock::release`] leaves
/// the row for stale reclamation.
#[derive(Debug)]
pub struct AdvisoryLock {
  name:   String,
  holder: String,
}

impl AdvisoryLock {
  pub fn acquire(conn: &Connection, name: &str, options: &LockOptions) -> Result<Self> {
    let holder = Uuid::new_v4().hyphenated().to_string();
    let started = Instant::now();

    let polled = poll(conn, name, &holder, options, started);
    conn.busy_timeout(options.busy_timeout)?;
    polled?;

    tracing::debug!(lock = name, waited = ?started.elapsed(), "advisory lock acquired");
    Ok(Self { name: name.to_owned(), holder })
  }

  pub fn name(&self) -> &str { &self.name }

  pub fn release(self, conn: &Connection) -> Result<()> {
    conn.execute(
      "DELETE FROM advisory_locks WHERE name = ?1 AND holder = ?2",
      rusqlite::params![self.name, self.holder],
    )?;
    tracing::debug!(lock = %self.name, "advisory lock released");
    Ok(())
  }
}

/// Retry the insert until it lands or `options.timeout` runs out. Each
/// attempt may block on SQLite's busy handler for at most the time left.
fn poll(conn: &Connection, name: &str, holder: &str, options: &LockOptions, started: Instant) -> Result<()> {
  let stale_ms = i64::try_from(options.stale_after.as_millis()).unwrap_or(i64::MAX);

  loop {
    let left = options.timeout.saturating_sub(started.elapsed());
    conn.busy_timeout(left.min(options.busy_timeout))?;

    let now = Utc::now().timestamp_millis();
    match try_insert(conn, name, holder, now, now.saturating_sub(stale_ms)) {
      Ok(()) => return Ok(()),
      Err(e) if is_contention(&e) => {}
      Err(e) => return Err(e.into()),
    }

    let waited = started.elapsed();
    if waited >= options.timeout {
      tracing::warn!(lock = name, ?waited, "advisory lock wait timed out");
      return Err(CoreError::LockTimeout { name: name.to_owned(), waited }.into());
    }
    std::thread::sleep(options.poll_interval.min(options.timeout - waited));
  }
}

fn try_insert(conn: &Connection, name: &str, holder: &str, now: i64, cutoff: i64) -> rusqlite::Result<()> {
  let reclaimed = conn.execute(
    "DELETE FROM advisory_locks WHERE name = ?1 AND acquired_at < ?2",
    rusqlite::params![name, cutoff],
  )?;
  if reclaimed > 0 {
    tracing::warn!(lock = name, "reclaimed stale advisory lock");
  }
  conn.execute(
    "INSERT INTO advisory_locks (name, holder, acquired_at) VALUES (?1, ?2, ?3)",
    rusqlite::params![name, holder, now],
  )?;
  Ok(())
}

fn is_contention(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _)
      if matches!(
        f.code,
        ErrorCode::ConstraintViolation | ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
      )
  )
}

/// Run `f` in a transaction: commit on `Ok`, roll back on `Err`.
///
/// The transaction is IMMEDIATE, so the write lock is taken at `BEGIN`
/// under the busy timeout. A deferred transaction that reads first cannot
/// upgrade to a writer once another connection has committed in WAL mode.
pub fn transact<T>(
  conn: &mut Connection,
  catalog: &Catalog,
  f: impl FnOnce(&Session<'_>) -> Result<T>,
) -> Result<T> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  finish(tx, catalog, f)
}

fn finish<T>(
  tx: Transaction<'_>,
  catalog: &Catalog,
  f: impl FnOnce(&Session<'_>) -> Result<T>,
) -> Result<T> {
  let result = f(&Session::new(&tx, catalog));
  match result {
    Ok(value) => {
      tx.commit()?;
      Ok(value)
    }
    Err(e) => {
      tracing::warn!(error = %e, "rolling back");
      if let Err(rollback) = tx.rollback() {
        tracing::error!(error = %rollback, "rollback failed");
      }
      Err(e)
    }
  }
}

/// Acquire every lock in `names` in order, run `f` in a transaction, and
/// release the locks in reverse whatever the outcome.
///
/// Callers that take more than one lock list them outermost aggregate
/// first, so two sections never wait on each other's second lock.
pub fn guarded<T>(
  conn: &mut Connection,
  catalog: &Catalog,
  names: &[String],
  options: &LockOptions,
  f: impl FnOnce(&Session<'_>) -> Result<T>,
) -> Result<T> {
  let mut held = Vec::with_capacity(names.len());
  for name in names {
    match AdvisoryLock::acquire(conn, name, options) {
      Ok(lock) => held.push(lock),
      Err(e) => {
        // Release failures are logged; the acquisition error wins.
        let _ = release_all(conn, held);
        return Err(e);
      }
    }
  }

  let started = Instant::now();
  let outcome = match conn.transaction_with_behavior(TransactionBehavior::Immediate) {
    Ok(tx) => finish(tx, catalog, f),
    Err(e) if is_contention(&e) => {
      let name = names.first().cloned().unwrap_or_default();
      Err(CoreError::LockTimeout { name, waited: started.elapsed() }.into())
    }
    Err(e) => Err(e.into()),
  };
  let released = release_all(conn, held);
  let value = outcome?;
  released?;
  Ok(value)
}

fn release_all(conn: &Connection, held: Vec<AdvisoryLock>) -> Result<()> {
  let mut first_err = None;
  for lock in held.into_iter().rev() {
    if let Err(e) = lock.release(conn) {
      tracing::error!(error = %e, "advisory lock release failed");
      first_err.get_or_insert(e);
    }
  }
  first_err.map_or(Ok(()), Err)
}

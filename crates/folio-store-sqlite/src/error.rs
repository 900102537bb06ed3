//! Error type for `folio-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A domain failure: not found, permission denied, lock timeout,
  /// unsupported operation, or a mapping failure.
  #[error("{0}")]
  Core(#[from] folio_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

impl Error {
  /// The domain failure behind this error, if it is one.
  pub fn core(&self) -> Option<&folio_core::Error> {
    match self {
      Self::Core(e) => Some(e),
      _ => None,
    }
  }

  pub fn is_not_found(&self) -> bool { self.core().is_some_and(folio_core::Error::is_not_found) }

  pub fn is_permission_denied(&self) -> bool {
    self.core().is_some_and(folio_core::Error::is_permission_denied)
  }

  pub fn is_lock_timeout(&self) -> bool {
    matches!(self, Self::Core(folio_core::Error::LockTimeout { .. }))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

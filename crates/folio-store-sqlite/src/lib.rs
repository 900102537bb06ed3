//! SQLite backend for the Folio publication store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! connection thread without blocking the async runtime. Inside that thread
//! the work is synchronous: a [`Session`] borrows the connection and the
//! descriptor catalog, and every multi-statement mutation runs as one
//! guarded section under a named advisory lock.

mod encode;
mod schema;
mod store;

pub mod authz;
pub mod entity;
pub mod error;
pub mod lock;
pub mod mapper;
pub mod merge;
pub mod patch;
pub mod session;

pub use error::{Error, Result};
pub use session::Session;
pub use store::{SqliteStore, StoreOptions};

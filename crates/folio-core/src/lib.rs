//! Core types and trait definitions for the Folio publication store.
//!
//! This crate is deliberately free of database dependencies. It holds the
//! entity model, the descriptor catalog that drives record mapping, the merge
//! engine, and the pure half of permission resolution. Storage backends (e.g.
//! `folio-store-sqlite`) supply the statements.

pub mod entity;
pub mod error;
pub mod merge;
pub mod patch;
pub mod permission;
pub mod record;
pub mod reference;
pub mod role;
pub mod schema;
pub mod store;

pub use error::{Error, Result};

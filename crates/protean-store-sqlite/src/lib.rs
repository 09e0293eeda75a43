//! SQLite backend for the Protean entity engine.
//!
//! Implements every store trait of `protean-core` on one SQLite file:
//! entity metadata, runtime DDL, the shared JSON document table, and rows of
//! materialised entity tables. Wraps [`tokio_rusqlite`] so all database
//! access runs on a dedicated thread without blocking the async runtime.

mod ddl;
mod documents;
mod encode;
mod query;
mod schema;
mod store;
mod tables;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;

//! Core types and trait definitions for the Protean dynamic entity engine.
//!
//! Operators declare entities (record types) at runtime; records of those
//! entities are validated against the live definition and queried with a
//! small OData-style parameter grammar.
//!
//! This crate is deliberately free of HTTP and database dependencies. Storage
//! backends implement the traits in [`store`]; the services in [`service`]
//! compose them.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod entity;
pub mod error;
pub mod query;
pub mod record;
pub mod registry;
pub mod service;
pub mod stats;
pub mod store;

pub use error::{Error, Result};

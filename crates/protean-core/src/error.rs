//! Error types for `protean-core`.
//!
//! [`Error`] is the taxonomy every store and service surfaces to callers.
//! Filter parse failures are deliberately absent: they never leave the query
//! layer (see [`crate::query::filter::FilterParseError`]).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Bad definition or record input: missing names, duplicate field names,
  /// missing key fields, missing required values.
  #[error("validation error: {0}")]
  Validation(String),

  #[error("entity not found: {0}")]
  EntityNotFound(String),

  #[error("record not found: {0}")]
  RecordNotFound(String),

  #[error("entity code {code:?} already exists for app {app_id}")]
  DuplicateCode { code: String, app_id: i64 },

  /// DDL execution failed. The definition row is kept with
  /// `table_created = false`.
  #[error("schema error on table {table:?}: {message}")]
  Schema { table: String, message: String },

  #[error("persistence error ({context}): {source}")]
  Persistence {
    context: String,
    #[source]
    source:  Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Wrap a backend failure that has no more specific classification.
  pub fn persistence(
    source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
  ) -> Self {
    Self::Persistence { context: String::new(), source: source.into() }
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::EntityNotFound(_) | Self::RecordNotFound(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Attach operation context to persistence failures.
///
/// Only [`Error::Persistence`] values without context are touched; typed
/// errors (not-found, validation, ...) already say what went wrong.
pub trait Context<T> {
  fn context<C, F>(self, f: F) -> Result<T>
  where
    C: Into<String>,
    F: FnOnce() -> C;
}

impl<T> Context<T> for Result<T> {
  fn context<C, F>(self, f: F) -> Result<T>
  where
    C: Into<String>,
    F: FnOnce() -> C,
  {
    self.map_err(|e| match e {
      Error::Persistence { context, source } if context.is_empty() => {
        Error::Persistence { context: f().into(), source }
      }
      other => other,
    })
  }
}

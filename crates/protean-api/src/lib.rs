//! JSON REST API for Protean.
//!
//! Exposes an axum [`Router`] over the definition and data services of
//! `protean-core`, backed by any [`EntityBackend`]. Auth, TLS and transport
//! concerns are the caller's responsibility; the optional `X-Actor` header is
//! only recorded in audit columns.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", protean_api::api_router(state))
//! ```

pub mod actor;
pub mod data;
pub mod entities;
pub mod error;
pub mod records;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use protean_core::{
  registry::EntityRegistry,
  service::{EntityDataService, EntityDefinitionService},
  store::EntityBackend,
};

pub use error::ApiError;

/// Shared state for all handlers.
pub struct AppState<S> {
  pub definitions: EntityDefinitionService<S>,
  pub data:        EntityDataService<S>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { definitions: self.definitions.clone(), data: self.data.clone() }
  }
}

impl<S: EntityBackend> AppState<S> {
  /// Both services share `store` and `registry`. `base_url` prefixes the
  /// `@odata.context` of query responses.
  pub fn new(store: Arc<S>, registry: Arc<EntityRegistry>, base_url: &str) -> Self {
    Self {
      definitions: EntityDefinitionService::new(Arc::clone(&store), Arc::clone(&registry)),
      data:        EntityDataService::new(store, registry, base_url),
    }
  }
}

/// Build a fully-materialised API router.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S: EntityBackend + 'static>(state: AppState<S>) -> Router<()> {
  Router::new()
    // Definitions
    .route("/entities", get(entities::list::<S>).post(entities::create::<S>))
    .route("/entities/{id}", get(entities::get_one::<S>).delete(entities::delete_one::<S>))
    .route("/entities/{id}/fields", put(entities::replace_fields::<S>))
    .route("/entities/{id}/materialize", post(entities::materialize::<S>))
    .route("/apps/{app_id}/entities/code/{code}", get(entities::get_by_code::<S>))
    .route("/apps/{app_id}/entities/name/{name}", get(entities::get_by_name::<S>))
    // Data
    .route("/apps/{app_id}/data/{code}", get(data::list::<S>).post(data::create::<S>))
    .route("/apps/{app_id}/odata/{code}", get(data::query::<S>))
    // Records
    .route(
      "/records/{id}",
      get(records::get_one::<S>)
        .put(records::update_one::<S>)
        .delete(records::delete_one::<S>),
    )
    .route(
      "/entities/{id}/records/{record_id}",
      get(records::get_by_record_id::<S>)
        .put(records::update_by_record_id::<S>)
        .delete(records::delete_by_record_id::<S>),
    )
    .with_state(state)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! Handlers for entity definition endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/entities?app_id=<id>` | Definitions of one application |
//! | `POST`   | `/entities` | Body: a `NewEntity`; materialises when `auto_create_table` |
//! | `GET`    | `/entities/{id}` | 404 if not found or deleted |
//! | `DELETE` | `/entities/{id}` | Optional `?drop_table=true` |
//! | `PUT`    | `/entities/{id}/fields` | Body: `{"fields":[...]}`, replaces the whole set |
//! | `POST`   | `/entities/{id}/materialize` | Retry table creation |
//! | `GET`    | `/apps/{app_id}/entities/code/{code}` | |
//! | `GET`    | `/apps/{app_id}/entities/name/{name}` | Oldest match wins |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use protean_core::{
  entity::{EntityDefinition, NewEntity, NewField},
  store::EntityBackend,
};
use serde::Deserialize;

use crate::{AppState, actor::Actor, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub app_id: i64,
}

/// `GET /entities?app_id=<id>`
pub async fn list<S: EntityBackend>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<EntityDefinition>>, ApiError> {
  Ok(Json(state.definitions.list(params.app_id).await?))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /entities`
pub async fn create<S: EntityBackend>(
  State(state): State<AppState<S>>,
  actor: Actor,
  Json(body): Json<NewEntity>,
) -> Result<impl IntoResponse, ApiError> {
  let entity = state.definitions.create(body, &actor.0).await?;
  Ok((StatusCode::CREATED, Json(entity)))
}

// ─── Lookup ───────────────────────────────────────────────────────────────────

/// `GET /entities/{id}`
pub async fn get_one<S: EntityBackend>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
) -> Result<Json<EntityDefinition>, ApiError> {
  Ok(Json(state.definitions.get(id).await?))
}

/// `GET /apps/{app_id}/entities/code/{code}`
pub async fn get_by_code<S: EntityBackend>(
  State(state): State<AppState<S>>,
  Path((app_id, code)): Path<(i64, String)>,
) -> Result<Json<EntityDefinition>, ApiError> {
  Ok(Json(state.definitions.get_by_code(app_id, &code).await?))
}

/// `GET /apps/{app_id}/entities/name/{name}`
pub async fn get_by_name<S: EntityBackend>(
  State(state): State<AppState<S>>,
  Path((app_id, name)): Path<(i64, String)>,
) -> Result<Json<EntityDefinition>, ApiError> {
  Ok(Json(state.definitions.get_by_name(app_id, &name).await?))
}

// ─── Fields ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FieldsBody {
  pub fields: Vec<NewField>,
}

/// `PUT /entities/{id}/fields`
pub async fn replace_fields<S: EntityBackend>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  actor: Actor,
  Json(body): Json<FieldsBody>,
) -> Result<Json<EntityDefinition>, ApiError> {
  Ok(Json(state.definitions.replace_fields(id, body.fields, &actor.0).await?))
}

// ─── Materialise ──────────────────────────────────────────────────────────────

/// `POST /entities/{id}/materialize`
pub async fn materialize<S: EntityBackend>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
) -> Result<Json<EntityDefinition>, ApiError> {
  Ok(Json(state.definitions.materialize(id).await?))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
  #[serde(default)]
  pub drop_table: bool,
}

/// `DELETE /entities/{id}[?drop_table=true]`
pub async fn delete_one<S: EntityBackend>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  Query(params): Query<DeleteParams>,
  actor: Actor,
) -> Result<StatusCode, ApiError> {
  state.definitions.delete(id, params.drop_table, &actor.0).await?;
  Ok(StatusCode::NO_CONTENT)
}

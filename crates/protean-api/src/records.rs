//! Handlers for single records, by surrogate id or by record identifier.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/records/{id}` | |
//! | `PUT`    | `/records/{id}` | Body: complete field values |
//! | `DELETE` | `/records/{id}` | |
//! | `GET`    | `/entities/{id}/records/{record_id}` | Row key once materialised |
//! | `PUT`    | `/entities/{id}/records/{record_id}` | |
//! | `DELETE` | `/entities/{id}/records/{record_id}` | |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use protean_core::{
  record::{Record, ValueMap},
  service::StoredRecord,
  store::EntityBackend,
};

use crate::{AppState, actor::Actor, error::ApiError};

// ─── By id ────────────────────────────────────────────────────────────────────

/// `GET /records/{id}`
pub async fn get_one<S: EntityBackend>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Record>, ApiError> {
  Ok(Json(state.data.get(id).await?))
}

/// `PUT /records/{id}`
pub async fn update_one<S: EntityBackend>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
  actor: Actor,
  Json(values): Json<ValueMap>,
) -> Result<Json<Record>, ApiError> {
  Ok(Json(state.data.update(id, values, &actor.0).await?))
}

/// `DELETE /records/{id}`
pub async fn delete_one<S: EntityBackend>(
  State(state): State<AppState<S>>,
  Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
  state.data.delete(id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── By record identifier ─────────────────────────────────────────────────────

/// `GET /entities/{id}/records/{record_id}`
pub async fn get_by_record_id<S: EntityBackend>(
  State(state): State<AppState<S>>,
  Path((entity_id, record_id)): Path<(i64, String)>,
) -> Result<Json<StoredRecord>, ApiError> {
  Ok(Json(state.data.get_by_record_id(entity_id, &record_id).await?))
}

/// `PUT /entities/{id}/records/{record_id}`
pub async fn update_by_record_id<S: EntityBackend>(
  State(state): State<AppState<S>>,
  Path((entity_id, record_id)): Path<(i64, String)>,
  actor: Actor,
  Json(values): Json<ValueMap>,
) -> Result<Json<StoredRecord>, ApiError> {
  let record = state
    .data
    .update_by_record_id(entity_id, &record_id, values, &actor.0)
    .await?;
  Ok(Json(record))
}

/// `DELETE /entities/{id}/records/{record_id}`
pub async fn delete_by_record_id<S: EntityBackend>(
  State(state): State<AppState<S>>,
  Path((entity_id, record_id)): Path<(i64, String)>,
) -> Result<StatusCode, ApiError> {
  state.data.delete_by_record_id(entity_id, &record_id).await?;
  Ok(StatusCode::NO_CONTENT)
}

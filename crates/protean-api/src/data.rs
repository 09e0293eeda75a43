//! Handlers for per-application record endpoints, addressed by entity code.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/apps/{app_id}/data/{code}` | Body: field values |
//! | `GET`  | `/apps/{app_id}/data/{code}` | `?page=&page_size=`, newest first |
//! | `GET`  | `/apps/{app_id}/odata/{code}` | `$filter`, `$orderby`, `$select`, `$top`, `$skip`, `$count`, `$stats` |

use std::collections::HashMap;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use protean_core::{
  query::{DEFAULT_TOP, QueryOptions},
  record::ValueMap,
  service::{QueryResult, StoredRecord},
  store::EntityBackend,
};
use serde::Deserialize;

use crate::{AppState, actor::Actor, error::ApiError};

/// `POST /apps/{app_id}/data/{code}`
pub async fn create<S: EntityBackend>(
  State(state): State<AppState<S>>,
  Path((app_id, code)): Path<(i64, String)>,
  actor: Actor,
  Json(values): Json<ValueMap>,
) -> Result<impl IntoResponse, ApiError> {
  let record = state.data.create(app_id, &code, values, &actor.0).await?;
  Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
  pub page:      Option<u32>,
  pub page_size: Option<u32>,
}

/// `GET /apps/{app_id}/data/{code}[?page=&page_size=]`
pub async fn list<S: EntityBackend>(
  State(state): State<AppState<S>>,
  Path((app_id, code)): Path<(i64, String)>,
  Query(params): Query<PageParams>,
) -> Result<Json<Vec<StoredRecord>>, ApiError> {
  let records = state
    .data
    .list(
      app_id,
      &code,
      params.page.unwrap_or(1),
      params.page_size.unwrap_or(DEFAULT_TOP),
    )
    .await?;
  Ok(Json(records))
}

/// `GET /apps/{app_id}/odata/{code}`
///
/// Malformed `$filter` or `$orderby` values are ignored rather than
/// rejected; the response is then unfiltered or default-ordered.
pub async fn query<S: EntityBackend>(
  State(state): State<AppState<S>>,
  Path((app_id, code)): Path<(i64, String)>,
  Query(params): Query<HashMap<String, String>>,
) -> Result<Json<QueryResult>, ApiError> {
  let opts = QueryOptions::from_params(&params);
  Ok(Json(state.data.query(app_id, &code, &opts).await?))
}

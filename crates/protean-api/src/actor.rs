//! Caller identity for audit columns.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

pub const ACTOR_HEADER: &str = "x-actor";
const DEFAULT_ACTOR: &str = "system";

/// Value of the optional `X-Actor` header, or `system`.
///
/// Recorded as `created_by`/`updated_by`; it is not an authentication
/// mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
  type Rejection = Infallible;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &S,
  ) -> Result<Self, Self::Rejection> {
    let actor = parts
      .headers
      .get(ACTOR_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .unwrap_or(DEFAULT_ACTOR);
    Ok(Actor(actor.to_owned()))
  }
}

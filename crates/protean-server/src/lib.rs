//! Wiring for the Protean HTTP server: configuration, store start-up and the
//! top-level router.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::Router;
use protean_api::{AppState, api_router};
use protean_core::{registry::EntityRegistry, store::EntityBackend};
use protean_store_sqlite::SqliteStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `PROTEAN_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  /// Public URL prefix used in `@odata.context`. Defaults to
  /// `http://{host}:{port}`.
  pub base_url:   Option<String>,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
}

fn default_host() -> String { "127.0.0.1".into() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("protean.db") }

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn base_url(&self) -> String {
    self
      .base_url
      .clone()
      .unwrap_or_else(|| format!("http://{}", self.address()))
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Start-up ─────────────────────────────────────────────────────────────────

/// Open the store at the configured path and load the entity registry.
pub async fn open_state(cfg: &ServerConfig) -> anyhow::Result<AppState<SqliteStore>> {
  use anyhow::Context as _;

  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let registry = EntityRegistry::load(&store)
    .await
    .context("failed to load entity definitions")?;

  Ok(AppState::new(Arc::new(store), Arc::new(registry), &cfg.base_url()))
}

/// The served router: the JSON API with request tracing.
pub fn router<S: EntityBackend + 'static>(state: AppState<S>) -> Router {
  api_router(state).layer(TraceLayer::new_for_http())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! In-process cache of live entity definitions.
//!
//! Built once at startup from a [`MetadataStore`] and kept current by the
//! definition service on every create, field replacement, materialisation
//! and delete. Shared by reference (`Arc<EntityRegistry>`); safe for any
//! number of concurrent readers and writers. Not persisted: the metadata
//! store stays the source of truth.

use std::{
  collections::HashMap,
  sync::{Arc, PoisonError, RwLock},
};

use crate::{Result, entity::EntityDefinition, store::MetadataStore};

#[derive(Default)]
struct Inner {
  by_id:   HashMap<i64, Arc<EntityDefinition>>,
  by_code: HashMap<(i64, String), i64>,
}

#[derive(Default)]
pub struct EntityRegistry {
  inner: RwLock<Inner>,
}

impl EntityRegistry {
  pub fn new() -> Self { Self::default() }

  /// Build a registry holding every non-deleted definition in `store`.
  pub async fn load<S: MetadataStore>(store: &S) -> Result<Self> {
    let registry = Self::new();
    let entities = store.list_all_entities().await?;
    let count = entities.len();
    for entity in entities {
      registry.upsert(entity);
    }
    tracing::info!(entities = count, "entity registry loaded");
    Ok(registry)
  }

  pub fn get(&self, id: i64) -> Option<Arc<EntityDefinition>> {
    let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
    inner.by_id.get(&id).cloned()
  }

  pub fn get_by_code(&self, app_id: i64, code: &str) -> Option<Arc<EntityDefinition>> {
    let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
    let id = inner.by_code.get(&(app_id, code.to_owned()))?;
    inner.by_id.get(id).cloned()
  }

  /// Insert or replace a definition. Deleted definitions are removed
  /// instead.
  pub fn upsert(&self, entity: EntityDefinition) -> Arc<EntityDefinition> {
    let entity = Arc::new(entity);
    let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(old) = inner.by_id.remove(&entity.id) {
      inner.by_code.remove(&(old.app_id, old.entity_code.clone()));
    }
    if !entity.deleted {
      inner
        .by_code
        .insert((entity.app_id, entity.entity_code.clone()), entity.id);
      inner.by_id.insert(entity.id, Arc::clone(&entity));
    }
    entity
  }

  pub fn remove(&self, id: i64) -> Option<Arc<EntityDefinition>> {
    let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
    let old = inner.by_id.remove(&id)?;
    inner.by_code.remove(&(old.app_id, old.entity_code.clone()));
    Some(old)
  }

  pub fn len(&self) -> usize {
    self.inner.read().unwrap_or_else(PoisonError::into_inner).by_id.len()
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

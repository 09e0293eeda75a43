//! [`EntityDefinitionService`]: validated definition lifecycle.

use std::sync::Arc;

use crate::{
  Error, Result,
  entity::{EntityDefinition, NewEntity, NewField, validate_entity, validate_fields},
  error::Context as _,
  registry::EntityRegistry,
  store::EntityBackend,
};

/// Creates, replaces and deletes entity definitions, triggers table
/// materialisation, and keeps the [`EntityRegistry`] in step.
///
/// Definition writes and DDL are separate statements. If materialisation
/// fails after the definition is stored, the definition stays with
/// `table_created = false` and [`Self::materialize`] can be retried.
pub struct EntityDefinitionService<S> {
  store:    Arc<S>,
  registry: Arc<EntityRegistry>,
}

impl<S> Clone for EntityDefinitionService<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), registry: Arc::clone(&self.registry) }
  }
}

impl<S: EntityBackend> EntityDefinitionService<S> {
  pub fn new(store: Arc<S>, registry: Arc<EntityRegistry>) -> Self {
    Self { store, registry }
  }

  pub async fn create(&self, input: NewEntity, actor: &str) -> Result<EntityDefinition> {
    validate_entity(&input)?;
    let name = input.entity_name.clone();
    let entity = self
      .store
      .create_entity(input, actor)
      .await
      .context(|| format!("create entity {name}"))?;
    tracing::info!(
      id = entity.id,
      code = %entity.entity_code,
      app_id = entity.app_id,
      "entity definition created"
    );
    self.registry.upsert(entity.clone());

    if entity.auto_create_table {
      return self.materialize_entity(entity).await;
    }
    Ok(entity)
  }

  /// Create the backing table of a definition whose table is not there yet.
  /// A no-op for definitions already marked `table_created`.
  pub async fn materialize(&self, id: i64) -> Result<EntityDefinition> {
    let entity = self.get(id).await?;
    if entity.table_created {
      return Ok(entity);
    }
    self.materialize_entity(entity).await
  }

  async fn materialize_entity(&self, mut entity: EntityDefinition) -> Result<EntityDefinition> {
    if let Err(e) = self.store.create_table(&entity).await {
      tracing::warn!(
        id = entity.id,
        table = %entity.table_name,
        error = %e,
        "materialisation failed; definition kept with table_created = false"
      );
      return Err(e);
    }
    self
      .store
      .set_table_created(entity.id, true)
      .await
      .context(|| format!("mark table {} created", entity.table_name))?;
    entity.table_created = true;
    tracing::info!(id = entity.id, table = %entity.table_name, "table materialised");
    self.registry.upsert(entity.clone());
    Ok(entity)
  }

  pub async fn get(&self, id: i64) -> Result<EntityDefinition> {
    self
      .store
      .get_entity(id)
      .await
      .context(|| format!("load entity {id}"))?
      .ok_or_else(|| Error::EntityNotFound(format!("id {id}")))
  }

  pub async fn get_by_code(&self, app_id: i64, code: &str) -> Result<EntityDefinition> {
    self
      .store
      .get_entity_by_code(app_id, code)
      .await
      .context(|| format!("load entity {code}"))?
      .ok_or_else(|| Error::EntityNotFound(format!("code {code:?} in app {app_id}")))
  }

  pub async fn get_by_name(&self, app_id: i64, name: &str) -> Result<EntityDefinition> {
    self
      .store
      .get_entity_by_name(app_id, name)
      .await
      .context(|| format!("load entity named {name}"))?
      .ok_or_else(|| Error::EntityNotFound(format!("name {name:?} in app {app_id}")))
  }

  pub async fn list(&self, app_id: i64) -> Result<Vec<EntityDefinition>> {
    self
      .store
      .list_entities(app_id)
      .await
      .context(|| format!("list entities of app {app_id}"))
  }

  /// Replace the complete field set. Callers must resend every field; the
  /// previous set is discarded, not merged.
  pub async fn replace_fields(
    &self,
    id: i64,
    fields: Vec<NewField>,
    actor: &str,
  ) -> Result<EntityDefinition> {
    let current = self.get(id).await?;
    validate_fields(&fields, current.layout())?;
    let entity = self
      .store
      .replace_fields(id, fields, actor)
      .await
      .context(|| format!("replace fields of entity {}", current.entity_code))?;
    tracing::info!(id, version = entity.version, fields = entity.fields.len(), "fields replaced");
    self.registry.upsert(entity.clone());
    Ok(entity)
  }

  /// Soft-delete a definition; with `drop_table`, also drop its table.
  pub async fn delete(&self, id: i64, drop_table: bool, actor: &str) -> Result<()> {
    let entity = self
      .store
      .soft_delete_entity(id, actor)
      .await
      .context(|| format!("delete entity {id}"))?;
    self.registry.remove(id);
    tracing::info!(id, code = %entity.entity_code, drop_table, "entity definition deleted");

    if drop_table {
      self.store.drop_table(&entity.table_name).await?;
      self
        .store
        .set_table_created(id, false)
        .await
        .context(|| format!("clear table flag of entity {id}"))?;
    }
    Ok(())
  }
}

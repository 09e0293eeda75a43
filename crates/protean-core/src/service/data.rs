//! [`EntityDataService`]: record CRUD and queries against the current
//! definition of an entity.

use std::sync::Arc;

use serde::Serialize;

use crate::{
  Error, Result,
  entity::EntityDefinition,
  error::Context as _,
  query::QueryOptions,
  record::{NewRecord, Record, ValueMap},
  registry::EntityRegistry,
  stats::{Stats, aggregate},
  store::EntityBackend,
};

/// A stored record: a document, or a row of a materialised table.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StoredRecord {
  Document(Record),
  Row(ValueMap),
}

/// Response envelope of [`EntityDataService::query`].
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
  #[serde(rename = "@odata.context")]
  pub context: String,
  pub value:   Vec<ValueMap>,
  #[serde(rename = "@odata.count", skip_serializing_if = "Option::is_none")]
  pub count:   Option<u64>,
  #[serde(rename = "@odata.stats", skip_serializing_if = "Option::is_none")]
  pub stats:   Option<Stats>,
}

/// Validates writes against the owning definition and routes reads and
/// writes to the document store, or to the materialised table once the
/// entity has one.
pub struct EntityDataService<S> {
  store:    Arc<S>,
  registry: Arc<EntityRegistry>,
  base_url: Arc<str>,
}

impl<S> Clone for EntityDataService<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      registry: Arc::clone(&self.registry),
      base_url: Arc::clone(&self.base_url),
    }
  }
}

/// Check required fields and keep only declared field names.
///
/// Required means `not_null` without a default; a missing key and an
/// explicit `null` are both missing. Values are not type-checked here.
pub fn prepare_values(entity: &EntityDefinition, mut values: ValueMap) -> Result<ValueMap> {
  if let Some(missing) = entity
    .fields
    .iter()
    .filter(|f| f.is_required())
    .find(|f| values.get(&f.field_name).is_none_or(|v| v.is_null()))
  {
    return Err(Error::Validation(format!(
      "missing required field {:?} for entity {}",
      missing.field_name, entity.entity_code
    )));
  }

  let before = values.len();
  values.retain(|k, _| entity.field(k).is_some());
  if values.len() != before {
    tracing::debug!(
      entity = %entity.entity_code,
      dropped = before - values.len(),
      "dropped undeclared keys from record"
    );
  }
  Ok(values)
}

impl<S: EntityBackend> EntityDataService<S> {
  pub fn new(store: Arc<S>, registry: Arc<EntityRegistry>, base_url: &str) -> Self {
    Self { store, registry, base_url: Arc::from(base_url.trim_end_matches('/')) }
  }

  async fn resolve(&self, app_id: i64, code: &str) -> Result<Arc<EntityDefinition>> {
    if let Some(entity) = self.registry.get_by_code(app_id, code) {
      return Ok(entity);
    }
    let entity = self
      .store
      .get_entity_by_code(app_id, code)
      .await
      .context(|| format!("load entity {code}"))?
      .ok_or_else(|| Error::EntityNotFound(format!("code {code:?} in app {app_id}")))?;
    Ok(self.registry.upsert(entity))
  }

  async fn resolve_id(&self, entity_id: i64) -> Result<Arc<EntityDefinition>> {
    if let Some(entity) = self.registry.get(entity_id) {
      return Ok(entity);
    }
    let entity = self
      .store
      .get_entity(entity_id)
      .await
      .context(|| format!("load entity {entity_id}"))?
      .ok_or_else(|| Error::EntityNotFound(format!("id {entity_id}")))?;
    Ok(self.registry.upsert(entity))
  }

  pub async fn create(
    &self,
    app_id: i64,
    code: &str,
    values: ValueMap,
    actor: &str,
  ) -> Result<StoredRecord> {
    let entity = self.resolve(app_id, code).await?;
    let data = prepare_values(&entity, values)?;

    if entity.is_table_backed() {
      let row = self
        .store
        .insert_row(&entity, data, actor)
        .await
        .context(|| format!("insert row into {}", entity.table_name))?;
      return Ok(StoredRecord::Row(row));
    }

    let record = self
      .store
      .insert_record(NewRecord {
        entity_id:   entity.id,
        entity_code: entity.entity_code.clone(),
        app_id,
        data,
        actor:       actor.to_owned(),
      })
      .await
      .context(|| format!("insert record for entity {code}"))?;
    tracing::debug!(record_id = %record.record_id, entity = code, "record created");
    Ok(StoredRecord::Document(record))
  }

  pub async fn get(&self, id: i64) -> Result<Record> {
    self
      .store
      .get_record(id)
      .await
      .context(|| format!("load record {id}"))?
      .ok_or_else(|| Error::RecordNotFound(format!("id {id}")))
  }

  /// Fetch by record identifier: a document's `record_id`, or the row key
  /// once the entity's table is materialised.
  pub async fn get_by_record_id(&self, entity_id: i64, record_id: &str) -> Result<StoredRecord> {
    let entity = self.resolve_id(entity_id).await?;
    let found = if entity.is_table_backed() {
      self
        .store
        .get_row(&entity, record_id)
        .await
        .context(|| format!("load row {record_id} of {}", entity.table_name))?
        .map(StoredRecord::Row)
    } else {
      self
        .store
        .get_record_by_record_id(entity_id, record_id)
        .await
        .context(|| format!("load record {record_id}"))?
        .map(StoredRecord::Document)
    };
    found.ok_or_else(|| Error::RecordNotFound(record_id.to_owned()))
  }

  /// One page (1-based) of an entity's records, newest first.
  pub async fn list(
    &self,
    app_id: i64,
    code: &str,
    page: u32,
    page_size: u32,
  ) -> Result<Vec<StoredRecord>> {
    let entity = self.resolve(app_id, code).await?;
    let page = page.max(1);
    let page_size = page_size.max(1);

    if entity.is_table_backed() {
      let opts = QueryOptions {
        top: page_size,
        skip: (page - 1).saturating_mul(page_size),
        ..QueryOptions::default()
      };
      let rows = self
        .store
        .query_rows(&entity, &opts)
        .await
        .context(|| format!("list rows of {}", entity.table_name))?;
      return Ok(rows.items.into_iter().map(StoredRecord::Row).collect());
    }

    let records = self
      .store
      .list_records(app_id, code, page, page_size)
      .await
      .context(|| format!("list records of entity {code}"))?;
    Ok(records.into_iter().map(StoredRecord::Document).collect())
  }

  /// Replace a record's values. The version grows by one; concurrent
  /// updates are not detected (last write wins).
  pub async fn update(&self, id: i64, values: ValueMap, actor: &str) -> Result<Record> {
    let current = self.get(id).await?;
    let entity = self.resolve_id(current.entity_id).await?;
    let data = prepare_values(&entity, values)?;
    self
      .store
      .update_record(id, data, actor)
      .await
      .context(|| format!("update record {}", current.record_id))
  }

  pub async fn update_by_record_id(
    &self,
    entity_id: i64,
    record_id: &str,
    values: ValueMap,
    actor: &str,
  ) -> Result<StoredRecord> {
    let entity = self.resolve_id(entity_id).await?;
    if entity.is_table_backed() {
      let data = prepare_values(&entity, values)?;
      let row = self
        .store
        .update_row(&entity, record_id, data, actor)
        .await
        .context(|| format!("update row {record_id} of {}", entity.table_name))?;
      return Ok(StoredRecord::Row(row));
    }

    let current = self
      .store
      .get_record_by_record_id(entity_id, record_id)
      .await
      .context(|| format!("load record {record_id}"))?
      .ok_or_else(|| Error::RecordNotFound(record_id.to_owned()))?;
    Ok(StoredRecord::Document(self.update(current.id, values, actor).await?))
  }

  pub async fn delete(&self, id: i64) -> Result<()> {
    self
      .store
      .delete_record(id)
      .await
      .context(|| format!("delete record {id}"))
  }

  pub async fn delete_by_record_id(&self, entity_id: i64, record_id: &str) -> Result<()> {
    let entity = self.resolve_id(entity_id).await?;
    if entity.is_table_backed() {
      return self
        .store
        .delete_row(&entity, record_id)
        .await
        .context(|| format!("delete row {record_id} of {}", entity.table_name));
    }
    self
      .store
      .delete_record_by_record_id(entity_id, record_id)
      .await
      .context(|| format!("delete record {record_id}"))
  }

  /// Run a `$`-parameter query. Stats, when requested, cover the returned
  /// page only and are computed before `$select` is applied.
  pub async fn query(&self, app_id: i64, code: &str, opts: &QueryOptions) -> Result<QueryResult> {
    let entity = self.resolve(app_id, code).await?;

    let (rows, total) = if entity.is_table_backed() {
      let page = self
        .store
        .query_rows(&entity, opts)
        .await
        .context(|| format!("query table {}", entity.table_name))?;
      (page.items, page.total)
    } else {
      let page = self
        .store
        .query_records(&entity, opts)
        .await
        .context(|| format!("query records of entity {code}"))?;
      let rows = page.items.into_iter().map(|r| r.into_row(&entity)).collect::<Vec<_>>();
      (rows, page.total)
    };

    let stats = opts.stats.then(|| aggregate(&rows, &entity.fields));
    Ok(QueryResult {
      context: format!("{}/$metadata#{}", self.base_url, entity.entity_code),
      value: rows.into_iter().map(|r| opts.project(r)).collect(),
      count: if opts.count { total } else { None },
      stats,
    })
  }
}

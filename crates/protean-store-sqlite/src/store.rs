//! [`SqliteStore`]: the SQLite implementation of the metadata and schema
//! traits. Documents and table rows live in `documents.rs` and `tables.rs`.

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;

use protean_core::{
  entity::{
    EntityDefinition, EntityKind, NewEntity, NewField, TableLayout, is_reserved_table,
    is_valid_identifier,
  },
  store::{MetadataStore, SchemaMaterializer},
};

use crate::{
  Result,
  ddl::{drop_table_sql, entity_table_sql},
  encode::{
    ENTITY_COLUMNS, FIELD_COLUMNS, RawEntity, RawField, encode_dt, encode_json, random_hex,
  },
  schema::schema_sql,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Protean entity store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let script = schema_sql();
    self
      .call(move |conn| {
        conn.execute_batch(&script)?;
        Ok(())
      })
      .await
  }

  /// Run `f` on the connection thread.
  pub(crate) async fn call<F, R>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, tokio_rusqlite::Error>
      + Send
      + 'static,
    R: Send + 'static,
  {
    Ok(self.conn.call(f).await?)
  }
}

// ─── Definition rows ─────────────────────────────────────────────────────────

/// Load one definition row plus its live fields, ordered by `sort_order`.
fn load_entity(
  conn: &rusqlite::Connection,
  filter: &str,
  params: impl rusqlite::Params,
) -> rusqlite::Result<Option<RawEntity>> {
  let sql = format!("SELECT {ENTITY_COLUMNS} FROM entity_definitions WHERE {filter}");
  let raw = conn.query_row(&sql, params, RawEntity::from_row).optional()?;
  raw.map(|e| with_fields(conn, e)).transpose()
}

fn load_entities(
  conn: &rusqlite::Connection,
  filter: &str,
  params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<RawEntity>> {
  let sql = format!(
    "SELECT {ENTITY_COLUMNS} FROM entity_definitions WHERE {filter} ORDER BY sort_order, id"
  );
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(params, RawEntity::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(|e| with_fields(conn, e)).collect()
}

fn with_fields(conn: &rusqlite::Connection, mut entity: RawEntity) -> rusqlite::Result<RawEntity> {
  let mut stmt = conn.prepare_cached(&format!(
    "SELECT {FIELD_COLUMNS} FROM entity_field_definitions
     WHERE entity_id = ?1 AND deleted = 0
     ORDER BY sort_order, id"
  ))?;
  entity.fields = stmt
    .query_map(rusqlite::params![entity.id], RawField::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(entity)
}

/// Insert `fields` for `entity_id`. Unset codes default to the field name,
/// unset physical types to the mapping of `layout`, unset sort orders to the
/// list position.
fn insert_fields(
  conn: &rusqlite::Connection,
  entity_id: i64,
  layout: TableLayout,
  fields: &[NewField],
  actor: &str,
  now: &str,
) -> rusqlite::Result<()> {
  let mut stmt = conn.prepare_cached(
    "INSERT INTO entity_field_definitions (
       entity_id, field_name, field_code, display_name, description,
       field_type, db_type, field_length, decimal_places,
       is_primary_key, is_not_null, is_unique, is_indexed,
       default_value, sort_order, status, validation_rules, properties,
       created_by, created_at, updated_by, updated_at
     ) VALUES (
       ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
       ?12, ?13, ?14, ?15, 'ACTIVE', ?16, ?17, ?18, ?19, ?18, ?19
     )",
  )?;
  for (i, f) in fields.iter().enumerate() {
    let name = f.field_name.trim();
    let db_type = f
      .db_type
      .clone()
      .filter(|t| !t.trim().is_empty())
      .unwrap_or_else(|| f.field_type.sql_type(f.field_length, f.decimal_places, layout));
    let properties = f.properties.as_ref().map(serde_json::Value::to_string);
    stmt.execute(rusqlite::params![
      entity_id,
      name,
      f.field_code.as_deref().unwrap_or(name),
      f.display_name,
      f.description,
      f.field_type.as_ref(),
      db_type,
      f.field_length,
      f.decimal_places,
      f.is_primary_key,
      f.is_not_null || f.is_primary_key,
      f.is_unique,
      f.is_indexed,
      f.default_value,
      f.sort_order.unwrap_or(i32::try_from(i).unwrap_or(i32::MAX)),
      f.validation_rules,
      properties,
      actor,
      now,
    ])?;
  }
  Ok(())
}

fn entity_layout(
  conn: &rusqlite::Connection,
  id: i64,
) -> Result<Option<TableLayout>, tokio_rusqlite::Error> {
  let kind: Option<String> = conn
    .query_row(
      "SELECT entity_type FROM entity_definitions WHERE id = ?1 AND deleted = 0",
      rusqlite::params![id],
      |r| r.get(0),
    )
    .optional()?;
  kind
    .map(|k| {
      k.parse::<EntityKind>()
        .map(EntityKind::layout)
        .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))
    })
    .transpose()
}

// ─── MetadataStore impl ──────────────────────────────────────────────────────

impl MetadataStore for SqliteStore {
  async fn create_entity(
    &self,
    input: NewEntity,
    actor: &str,
  ) -> protean_core::Result<EntityDefinition> {
    let code = input
      .entity_code
      .as_deref()
      .map(str::trim)
      .map(str::to_owned)
      .unwrap_or_else(|| format!("entity_{}", random_hex::<6>()));
    let app_id = input.app_id;
    let actor = actor.to_owned();
    let now = encode_dt(Utc::now());
    let properties = encode_json(input.properties.as_ref())?;
    let table_name = input.table_name.trim().to_owned();

    // Conflicts come back as the inner `Err`, database failures as the outer.
    let raw: RawEntity = self
      .call(move |conn| {
        let tx = conn.transaction()?;
        let taken = tx
          .query_row(
            "SELECT 1 FROM entity_definitions
             WHERE entity_code = ?1 AND app_id = ?2 AND deleted = 0",
            rusqlite::params![code, app_id],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if taken {
          return Ok(Err(protean_core::Error::DuplicateCode { code, app_id }));
        }
        let owner: Option<String> = tx
          .query_row(
            "SELECT entity_code FROM entity_definitions
             WHERE lower(table_name) = lower(?1) AND deleted = 0",
            rusqlite::params![table_name],
            |r| r.get(0),
          )
          .optional()?;
        if let Some(owner) = owner {
          return Ok(Err(protean_core::Error::Validation(format!(
            "table {table_name:?} already backs entity {owner}"
          ))));
        }

        tx.execute(
          "INSERT INTO entity_definitions (
             entity_name, entity_code, table_name, display_name, description,
             app_id, entity_type, status, auto_create_table, table_created,
             version, sort_order, properties,
             created_by, created_at, updated_by, updated_at, deleted
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 1, ?10, ?11, ?12, ?13, ?12, ?13, 0)",
          rusqlite::params![
            input.entity_name.trim(),
            code,
            table_name,
            input.display_name,
            input.description,
            app_id,
            input.entity_type.as_ref(),
            input.status.as_ref(),
            input.auto_create_table,
            input.sort_order,
            properties,
            actor,
            now,
          ],
        )?;
        let id = tx.last_insert_rowid();
        insert_fields(&tx, id, input.entity_type.layout(), &input.fields, &actor, &now)?;
        let raw = load_entity(&tx, "id = ?1", rusqlite::params![id])?
          .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(Ok(raw))
      })
      .await??;

    Ok(raw.into_entity()?)
  }

  async fn get_entity(&self, id: i64) -> protean_core::Result<Option<EntityDefinition>> {
    let raw = self
      .call(move |conn| Ok(load_entity(conn, "id = ?1 AND deleted = 0", rusqlite::params![id])?))
      .await?;
    Ok(raw.map(RawEntity::into_entity).transpose()?)
  }

  async fn get_entity_by_code(
    &self,
    app_id: i64,
    code: &str,
  ) -> protean_core::Result<Option<EntityDefinition>> {
    let code = code.to_owned();
    let raw = self
      .call(move |conn| {
        Ok(load_entity(
          conn,
          "app_id = ?1 AND entity_code = ?2 AND deleted = 0",
          rusqlite::params![app_id, code],
        )?)
      })
      .await?;
    Ok(raw.map(RawEntity::into_entity).transpose()?)
  }

  async fn get_entity_by_name(
    &self,
    app_id: i64,
    name: &str,
  ) -> protean_core::Result<Option<EntityDefinition>> {
    let name = name.to_owned();
    let raw = self
      .call(move |conn| {
        // Names are not unique; the oldest live definition wins.
        Ok(load_entity(
          conn,
          "app_id = ?1 AND entity_name = ?2 AND deleted = 0 ORDER BY id LIMIT 1",
          rusqlite::params![app_id, name],
        )?)
      })
      .await?;
    Ok(raw.map(RawEntity::into_entity).transpose()?)
  }

  async fn list_entities(&self, app_id: i64) -> protean_core::Result<Vec<EntityDefinition>> {
    let raws = self
      .call(move |conn| {
        Ok(load_entities(conn, "app_id = ?1 AND deleted = 0", rusqlite::params![app_id])?)
      })
      .await?;
    Ok(raws.into_iter().map(RawEntity::into_entity).collect::<Result<_>>()?)
  }

  async fn list_all_entities(&self) -> protean_core::Result<Vec<EntityDefinition>> {
    let raws = self
      .call(|conn| Ok(load_entities(conn, "deleted = 0", [])?))
      .await?;
    Ok(raws.into_iter().map(RawEntity::into_entity).collect::<Result<_>>()?)
  }

  async fn replace_fields(
    &self,
    id: i64,
    fields: Vec<NewField>,
    actor: &str,
  ) -> protean_core::Result<EntityDefinition> {
    let actor = actor.to_owned();
    let now = encode_dt(Utc::now());

    let raw: Option<RawEntity> = self
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(layout) = entity_layout(&tx, id)? else {
          return Ok(None);
        };
        tx.execute(
          "DELETE FROM entity_field_definitions WHERE entity_id = ?1",
          rusqlite::params![id],
        )?;
        insert_fields(&tx, id, layout, &fields, &actor, &now)?;
        tx.execute(
          "UPDATE entity_definitions
           SET version = version + 1, updated_by = ?2, updated_at = ?3
           WHERE id = ?1",
          rusqlite::params![id, actor, now],
        )?;
        let raw = load_entity(&tx, "id = ?1", rusqlite::params![id])?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    let raw = raw.ok_or_else(|| protean_core::Error::EntityNotFound(format!("id {id}")))?;
    Ok(raw.into_entity()?)
  }

  async fn set_table_created(&self, id: i64, created: bool) -> protean_core::Result<()> {
    let changed = self
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE entity_definitions SET table_created = ?2 WHERE id = ?1",
          rusqlite::params![id, created],
        )?)
      })
      .await?;
    if changed == 0 {
      return Err(protean_core::Error::EntityNotFound(format!("id {id}")));
    }
    Ok(())
  }

  async fn soft_delete_entity(
    &self,
    id: i64,
    actor: &str,
  ) -> protean_core::Result<EntityDefinition> {
    let actor = actor.to_owned();
    let now = encode_dt(Utc::now());

    let raw: Option<RawEntity> = self
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(raw) = load_entity(&tx, "id = ?1 AND deleted = 0", rusqlite::params![id])? else {
          return Ok(None);
        };
        tx.execute(
          "UPDATE entity_definitions SET deleted = 1, updated_by = ?2, updated_at = ?3
           WHERE id = ?1",
          rusqlite::params![id, actor, now],
        )?;
        tx.execute(
          "UPDATE entity_field_definitions SET deleted = 1, updated_by = ?2, updated_at = ?3
           WHERE entity_id = ?1 AND deleted = 0",
          rusqlite::params![id, actor, now],
        )?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    let raw = raw.ok_or_else(|| protean_core::Error::EntityNotFound(format!("id {id}")))?;
    Ok(raw.into_entity()?)
  }
}

// ─── SchemaMaterializer impl ─────────────────────────────────────────────────

fn schema_error(table: &str, e: impl std::fmt::Display) -> protean_core::Error {
  protean_core::Error::Schema { table: table.to_owned(), message: e.to_string() }
}

/// Entity DDL may only touch valid, non-reserved table names.
fn check_table_name(table: &str) -> protean_core::Result<()> {
  if !is_valid_identifier(table) {
    return Err(protean_core::Error::Validation(format!("invalid table name {table:?}")));
  }
  if is_reserved_table(table) {
    return Err(protean_core::Error::Validation(format!("table name {table:?} is reserved")));
  }
  Ok(())
}

impl SchemaMaterializer for SqliteStore {
  async fn create_table(&self, entity: &EntityDefinition) -> protean_core::Result<()> {
    check_table_name(&entity.table_name)?;
    let statements = entity_table_sql(entity);
    for sql in &statements {
      tracing::debug!(table = %entity.table_name, %sql, "executing DDL");
    }

    let outcome = self
      .call(move |conn| {
        let tx = conn.transaction()?;
        for sql in &statements {
          tx.execute_batch(sql)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await;
    outcome.map_err(|e| schema_error(&entity.table_name, e))
  }

  async fn drop_table(&self, table_name: &str) -> protean_core::Result<()> {
    check_table_name(table_name)?;
    let sql = drop_table_sql(table_name);
    tracing::debug!(table = table_name, %sql, "executing DDL");
    self
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await
      .map_err(|e| schema_error(table_name, e))
  }

  async fn table_exists(&self, table_name: &str) -> protean_core::Result<bool> {
    let name = table_name.to_owned();
    let found = self
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            rusqlite::params![name],
            |_| Ok(()),
          )
          .optional()?
          .is_some())
      })
      .await?;
    Ok(found)
  }
}

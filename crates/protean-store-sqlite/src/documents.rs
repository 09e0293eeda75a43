//! [`DocumentStore`] impl: one JSON document per record in
//! `entity_data_storage`.

use chrono::Utc;
use rusqlite::OptionalExtension as _;

use protean_core::{
  Error as CoreError,
  entity::EntityDefinition,
  query::QueryOptions,
  record::{NewRecord, Page, Record, RecordStatus, ValueMap},
  store::DocumentStore,
};

use crate::{
  SqliteStore,
  encode::{RECORD_COLUMNS, RawRecord, encode_dt, new_record_id},
  query::compile_documents,
};

fn load_record(
  conn: &rusqlite::Connection,
  filter: &str,
  params: impl rusqlite::Params,
) -> rusqlite::Result<Option<RawRecord>> {
  conn
    .query_row(
      &format!("SELECT {RECORD_COLUMNS} FROM entity_data_storage WHERE {filter}"),
      params,
      RawRecord::from_row,
    )
    .optional()
}

impl DocumentStore for SqliteStore {
  async fn insert_record(&self, input: NewRecord) -> protean_core::Result<Record> {
    let now = Utc::now();
    let record = Record {
      id:          0,
      record_id:   new_record_id(),
      entity_id:   input.entity_id,
      entity_code: input.entity_code,
      app_id:      input.app_id,
      data:        input.data,
      version:     1,
      status:      RecordStatus::Active,
      properties:  None,
      created_by:  input.actor.clone(),
      created_at:  now,
      updated_by:  input.actor,
      updated_at:  now,
      deleted:     false,
    };

    let record_id = record.record_id.clone();
    let entity_id = record.entity_id;
    let entity_code = record.entity_code.clone();
    let app_id = record.app_id;
    let data_json = serde_json::to_string(&record.data)?;
    let status = record.status.as_ref().to_owned();
    let actor = record.created_by.clone();
    let at = encode_dt(now);

    let id = self
      .call(move |conn| {
        conn.execute(
          "INSERT INTO entity_data_storage (
             entity_id, entity_code, app_id, record_id, data_json, version,
             status, created_by, created_at, updated_by, updated_at, deleted
           ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?8, ?7, ?8, 0)",
          rusqlite::params![entity_id, entity_code, app_id, record_id, data_json, status, actor, at],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(Record { id, ..record })
  }

  async fn get_record(&self, id: i64) -> protean_core::Result<Option<Record>> {
    let raw = self
      .call(move |conn| Ok(load_record(conn, "id = ?1 AND deleted = 0", rusqlite::params![id])?))
      .await?;
    Ok(raw.map(RawRecord::into_record).transpose()?)
  }

  async fn get_record_by_record_id(
    &self,
    entity_id: i64,
    record_id: &str,
  ) -> protean_core::Result<Option<Record>> {
    let record_id = record_id.to_owned();
    let raw = self
      .call(move |conn| {
        Ok(load_record(
          conn,
          "entity_id = ?1 AND record_id = ?2 AND deleted = 0",
          rusqlite::params![entity_id, record_id],
        )?)
      })
      .await?;
    Ok(raw.map(RawRecord::into_record).transpose()?)
  }

  async fn list_records(
    &self,
    app_id: i64,
    entity_code: &str,
    page: u32,
    page_size: u32,
  ) -> protean_core::Result<Vec<Record>> {
    let entity_code = entity_code.to_owned();
    let limit = i64::from(page_size.max(1));
    let offset = i64::from(page.max(1) - 1) * limit;

    let raws = self
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {RECORD_COLUMNS} FROM entity_data_storage
           WHERE app_id = ?1 AND entity_code = ?2 AND deleted = 0
           ORDER BY created_at DESC, id DESC
           LIMIT ?3 OFFSET ?4"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![app_id, entity_code, limit, offset],
            RawRecord::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(raws.into_iter().map(RawRecord::into_record).collect::<crate::Result<_>>()?)
  }

  async fn update_record(
    &self,
    id: i64,
    data: ValueMap,
    actor: &str,
  ) -> protean_core::Result<Record> {
    let data_json = serde_json::to_string(&data)?;
    let actor = actor.to_owned();
    let at = encode_dt(Utc::now());

    let raw = self
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE entity_data_storage
           SET data_json = ?2, version = version + 1, updated_by = ?3, updated_at = ?4
           WHERE id = ?1 AND deleted = 0",
          rusqlite::params![id, data_json, actor, at],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(load_record(conn, "id = ?1", rusqlite::params![id])?)
      })
      .await?;

    let raw = raw.ok_or_else(|| CoreError::RecordNotFound(format!("id {id}")))?;
    Ok(raw.into_record()?)
  }

  async fn delete_record(&self, id: i64) -> protean_core::Result<()> {
    let deleted = self
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM entity_data_storage WHERE id = ?1", rusqlite::params![id])?)
      })
      .await?;
    if deleted == 0 {
      return Err(CoreError::RecordNotFound(format!("id {id}")));
    }
    Ok(())
  }

  async fn delete_record_by_record_id(
    &self,
    entity_id: i64,
    record_id: &str,
  ) -> protean_core::Result<()> {
    let rid = record_id.to_owned();
    let deleted = self
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM entity_data_storage WHERE entity_id = ?1 AND record_id = ?2",
          rusqlite::params![entity_id, rid],
        )?)
      })
      .await?;
    if deleted == 0 {
      return Err(CoreError::RecordNotFound(record_id.to_owned()));
    }
    Ok(())
  }

  async fn query_records(
    &self,
    entity: &EntityDefinition,
    opts: &QueryOptions,
  ) -> protean_core::Result<Page<Record>> {
    let compiled = compile_documents(entity, opts);
    tracing::debug!(sql = %compiled.sql, params = compiled.params.len(), "document query");

    let (raws, total) = self
      .call(move |conn| {
        let mut stmt = conn.prepare(&compiled.sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(compiled.params.iter()), RawRecord::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let total = compiled
          .count_sql
          .as_deref()
          .map(|sql| {
            conn.query_row(sql, rusqlite::params_from_iter(compiled.count_params.iter()), |r| {
              r.get::<_, i64>(0)
            })
          })
          .transpose()?;
        Ok((rows, total))
      })
      .await?;

    Ok(Page {
      items: raws.into_iter().map(RawRecord::into_record).collect::<crate::Result<_>>()?,
      total: total.map(|n| u64::try_from(n).unwrap_or(0)),
    })
  }
}

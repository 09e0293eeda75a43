//! [`TableStore`] impl: rows of materialised entity tables.

use chrono::Utc;
use rusqlite::{OptionalExtension as _, types::Value as SqlValue};
use serde_json::Value;

use protean_core::{
  Error as CoreError,
  entity::{EntityDefinition, FieldType, TableLayout},
  query::QueryOptions,
  record::{Page, RecordStatus, ValueMap},
  store::TableStore,
};

use crate::{
  SqliteStore,
  ddl::quote_ident,
  encode::{encode_dt, from_sql_value, new_record_id, to_sql_value},
  query::{compile_table, table_columns},
};

/// Column name and declared field type, in `SELECT` order. System columns
/// have no field type.
fn column_types(entity: &EntityDefinition) -> Vec<(String, Option<FieldType>)> {
  table_columns(entity)
    .into_iter()
    .map(|c| {
      let ty = entity.field(&c).map(|f| f.field_type);
      (c, ty)
    })
    .collect()
}

/// Decode one row into a value map. Booleans come back as `true`/`false`,
/// JSON columns as parsed JSON.
fn decode_row(
  row: &rusqlite::Row<'_>,
  columns: &[(String, Option<FieldType>)],
) -> rusqlite::Result<ValueMap> {
  let mut map = ValueMap::new();
  for (i, (name, ty)) in columns.iter().enumerate() {
    let raw: SqlValue = row.get(i)?;
    let value = match (ty, raw) {
      (Some(FieldType::Boolean), SqlValue::Integer(n)) => Value::Bool(n != 0),
      (Some(FieldType::Json), SqlValue::Text(s)) => {
        serde_json::from_str(&s).unwrap_or(Value::String(s))
      }
      (_, raw) => from_sql_value(raw),
    };
    map.insert(name.clone(), value);
  }
  Ok(map)
}

/// `SELECT` list matching [`column_types`].
fn select_list(types: &[(String, Option<FieldType>)]) -> String {
  types.iter().map(|(c, _)| quote_ident(c)).collect::<Vec<_>>().join(", ")
}

fn key_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

/// Give native rows an `id`, unless a field is already called `id`: the key
/// value, or for a composite key the key values joined with `,` in field
/// order. Key values that themselves contain `,` cannot be addressed by
/// that identifier.
fn with_row_id(entity: &EntityDefinition, mut row: ValueMap) -> ValueMap {
  if row.contains_key("id") {
    return row;
  }
  let values: Option<Vec<&Value>> = entity
    .fields
    .iter()
    .filter(|f| f.is_primary_key)
    .map(|f| row.get(&f.field_name))
    .collect();
  let id = match values.as_deref() {
    None | Some([]) => None,
    Some([single]) => Some((*single).clone()),
    Some(many) => Some(Value::String(
      many.iter().map(|v| key_text(v)).collect::<Vec<_>>().join(","),
    )),
  };
  if let Some(id) = id {
    row.insert("id".into(), id);
  }
  row
}

/// `WHERE` clause selecting the row `key` names. `None` when `key` cannot
/// name a row of this table.
///
/// Key parts are bound as text; the columns' numeric affinity converts them
/// for the comparison.
fn key_condition(entity: &EntityDefinition, key: &str) -> Option<(String, Vec<SqlValue>)> {
  if entity.layout() == TableLayout::Template {
    return Some(("\"record_id\" = ?".to_owned(), vec![SqlValue::Text(key.to_owned())]));
  }
  let columns: Vec<&str> = entity
    .fields
    .iter()
    .filter(|f| f.is_primary_key)
    .map(|f| f.field_name.as_str())
    .collect();
  let parts: Vec<&str> = match columns.len() {
    0 => return None,
    1 => vec![key],
    _ => key.split(',').collect(),
  };
  if parts.len() != columns.len() {
    return None;
  }
  let sql = columns
    .iter()
    .map(|c| format!("{} = ?", quote_ident(c)))
    .collect::<Vec<_>>()
    .join(" AND ");
  Some((sql, parts.into_iter().map(|p| SqlValue::Text(p.to_owned())).collect()))
}

impl TableStore for SqliteStore {
  async fn insert_row(
    &self,
    entity: &EntityDefinition,
    data: ValueMap,
    actor: &str,
  ) -> protean_core::Result<ValueMap> {
    let mut columns: Vec<String> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    if entity.layout() == TableLayout::Template {
      let now = encode_dt(Utc::now());
      columns.extend(["record_id", "created_at", "updated_at", "version", "status"].map(String::from));
      values.extend([
        SqlValue::Text(new_record_id()),
        SqlValue::Text(now.clone()),
        SqlValue::Text(now),
        SqlValue::Integer(1),
        SqlValue::Text(RecordStatus::Active.as_ref().to_owned()),
      ]);
    }
    for (name, value) in &data {
      if let Some(field) = entity.field(name) {
        columns.push(field.field_name.clone());
        values.push(to_sql_value(value));
      }
    }

    let table = quote_ident(&entity.table_name);
    let insert_sql = if columns.is_empty() {
      format!("INSERT INTO {table} DEFAULT VALUES")
    } else {
      let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
      let marks = vec!["?"; columns.len()].join(", ");
      format!("INSERT INTO {table} ({}) VALUES ({marks})", names.join(", "))
    };
    let types = column_types(entity);
    let select_sql = format!("SELECT {} FROM {table} WHERE rowid = ?1", select_list(&types));
    tracing::debug!(table = %entity.table_name, actor, sql = %insert_sql, "inserting row");

    let row = self
      .call(move |conn| {
        conn.execute(&insert_sql, rusqlite::params_from_iter(values.iter()))?;
        let rowid = conn.last_insert_rowid();
        Ok(conn.query_row(&select_sql, rusqlite::params![rowid], |r| decode_row(r, &types))?)
      })
      .await?;

    Ok(with_row_id(entity, row))
  }

  async fn query_rows(
    &self,
    entity: &EntityDefinition,
    opts: &QueryOptions,
  ) -> protean_core::Result<Page<ValueMap>> {
    let compiled = compile_table(entity, opts);
    let types = column_types(entity);
    tracing::debug!(sql = %compiled.sql, params = compiled.params.len(), "table query");

    let (rows, total) = self
      .call(move |conn| {
        let mut stmt = conn.prepare(&compiled.sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(compiled.params.iter()), |r| {
            decode_row(r, &types)
          })?
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
      items: rows.into_iter().map(|r| with_row_id(entity, r)).collect(),
      total: total.map(|n| u64::try_from(n).unwrap_or(0)),
    })
  }

  async fn get_row(
    &self,
    entity: &EntityDefinition,
    key: &str,
  ) -> protean_core::Result<Option<ValueMap>> {
    let Some((condition, params)) = key_condition(entity, key) else {
      return Ok(None);
    };
    let types = column_types(entity);
    let sql = format!(
      "SELECT {} FROM {} WHERE {condition}",
      select_list(&types),
      quote_ident(&entity.table_name)
    );

    let row = self
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params_from_iter(params.iter()), |r| decode_row(r, &types))
            .optional()?,
        )
      })
      .await?;
    Ok(row.map(|r| with_row_id(entity, r)))
  }

  async fn update_row(
    &self,
    entity: &EntityDefinition,
    key: &str,
    data: ValueMap,
    actor: &str,
  ) -> protean_core::Result<ValueMap> {
    let Some((condition, key_params)) = key_condition(entity, key) else {
      return Err(CoreError::RecordNotFound(key.to_owned()));
    };

    let mut assignments: Vec<String> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();
    if entity.layout() == TableLayout::Template {
      assignments.push("\"version\" = \"version\" + 1".to_owned());
      assignments.push("\"updated_at\" = ?".to_owned());
      values.push(SqlValue::Text(encode_dt(Utc::now())));
    }
    for (name, value) in &data {
      if let Some(field) = entity.field(name) {
        assignments.push(format!("{} = ?", quote_ident(&field.field_name)));
        values.push(to_sql_value(value));
      }
    }
    if assignments.is_empty() {
      return self
        .get_row(entity, key)
        .await?
        .ok_or_else(|| CoreError::RecordNotFound(key.to_owned()));
    }
    values.extend(key_params);

    let table = quote_ident(&entity.table_name);
    let update_sql = format!(
      "UPDATE {table} SET {} WHERE {condition} RETURNING rowid",
      assignments.join(", ")
    );
    let types = column_types(entity);
    let select_sql = format!("SELECT {} FROM {table} WHERE rowid = ?1", select_list(&types));
    tracing::debug!(table = %entity.table_name, actor, sql = %update_sql, "updating row");

    let row = self
      .call(move |conn| {
        let tx = conn.transaction()?;
        let rowid: Option<i64> = tx
          .query_row(&update_sql, rusqlite::params_from_iter(values.iter()), |r| r.get(0))
          .optional()?;
        let row = rowid
          .map(|id| tx.query_row(&select_sql, rusqlite::params![id], |r| decode_row(r, &types)))
          .transpose()?;
        tx.commit()?;
        Ok(row)
      })
      .await?;

    row
      .map(|r| with_row_id(entity, r))
      .ok_or_else(|| CoreError::RecordNotFound(key.to_owned()))
  }

  async fn delete_row(&self, entity: &EntityDefinition, key: &str) -> protean_core::Result<()> {
    let Some((condition, params)) = key_condition(entity, key) else {
      return Err(CoreError::RecordNotFound(key.to_owned()));
    };
    let sql = format!("DELETE FROM {} WHERE {condition}", quote_ident(&entity.table_name));

    let deleted = self
      .call(move |conn| Ok(conn.execute(&sql, rusqlite::params_from_iter(params.iter()))?))
      .await?;
    if deleted == 0 {
      return Err(CoreError::RecordNotFound(key.to_owned()));
    }
    tracing::debug!(table = %entity.table_name, key, "row deleted");
    Ok(())
  }
}

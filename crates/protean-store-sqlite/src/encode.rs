//! Encoding and decoding helpers between domain types and the plain values
//! stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds,
//! `Z` suffix) so that lexical order equals time order. Enums are stored as
//! their `SCREAMING_SNAKE_CASE` names, booleans as 0/1, and free-form JSON
//! (`properties`, `data_json`) as compact JSON text.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use protean_core::{
  entity::{EntityDefinition, FieldDefinition},
  record::{Record, ValueMap},
};
use rand_core::{OsRng, RngCore as _};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_enum<T: FromStr>(column: &'static str, value: &str) -> Result<T> {
  value
    .parse()
    .map_err(|_| Error::Decode { column, value: value.to_owned() })
}

// ─── JSON ────────────────────────────────────────────────────────────────────

pub fn encode_json(value: Option<&Value>) -> Result<Option<String>> {
  Ok(value.map(serde_json::to_string).transpose()?)
}

pub fn decode_json(s: Option<&str>) -> Result<Option<Value>> {
  Ok(s.map(serde_json::from_str).transpose()?)
}

/// SQL value bound for a JSON field value. Arrays and objects are stored as
/// JSON text.
pub fn to_sql_value(value: &Value) -> SqlValue {
  match value {
    Value::Null => SqlValue::Null,
    Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
    Value::Number(n) => match n.as_i64() {
      Some(i) => SqlValue::Integer(i),
      None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
    },
    Value::String(s) => SqlValue::Text(s.clone()),
    Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
  }
}

/// JSON value of a column read back from SQLite.
pub fn from_sql_value(value: SqlValue) -> Value {
  match value {
    SqlValue::Null => Value::Null,
    SqlValue::Integer(i) => i.into(),
    SqlValue::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
    SqlValue::Text(s) => s.into(),
    SqlValue::Blob(b) => hex::encode(b).into(),
  }
}

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// `N` random bytes from the OS generator, hex encoded.
pub fn random_hex<const N: usize>() -> String {
  let mut buf = [0u8; N];
  OsRng.fill_bytes(&mut buf);
  hex::encode(buf)
}

/// 128-bit record identifier: 32 lowercase hex characters.
pub fn new_record_id() -> String { random_hex::<16>() }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const ENTITY_COLUMNS: &str = "id, entity_name, entity_code, table_name, \
  display_name, description, app_id, entity_type, status, auto_create_table, \
  table_created, version, sort_order, properties, created_by, created_at, \
  updated_by, updated_at, deleted";

pub const FIELD_COLUMNS: &str = "id, entity_id, field_name, field_code, \
  display_name, description, field_type, db_type, field_length, \
  decimal_places, is_primary_key, is_not_null, is_unique, is_indexed, \
  default_value, sort_order, status, validation_rules, properties, \
  created_by, created_at, updated_by, updated_at";

pub const RECORD_COLUMNS: &str = "id, record_id, entity_id, entity_code, \
  app_id, data_json, version, status, properties, created_by, created_at, \
  updated_by, updated_at, deleted";

/// Raw values read directly from an `entity_definitions` row, plus its
/// field rows.
pub struct RawEntity {
  pub id:                i64,
  pub entity_name:       String,
  pub entity_code:       String,
  pub table_name:        String,
  pub display_name:      Option<String>,
  pub description:       Option<String>,
  pub app_id:            i64,
  pub entity_type:       String,
  pub status:            String,
  pub auto_create_table: bool,
  pub table_created:     bool,
  pub version:           i64,
  pub sort_order:        i32,
  pub properties:        Option<String>,
  pub created_by:        String,
  pub created_at:        String,
  pub updated_by:        String,
  pub updated_at:        String,
  pub deleted:           bool,
  pub fields:            Vec<RawField>,
}

impl RawEntity {
  /// Read the [`ENTITY_COLUMNS`] of `row`; fields are loaded separately.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                row.get(0)?,
      entity_name:       row.get(1)?,
      entity_code:       row.get(2)?,
      table_name:        row.get(3)?,
      display_name:      row.get(4)?,
      description:       row.get(5)?,
      app_id:            row.get(6)?,
      entity_type:       row.get(7)?,
      status:            row.get(8)?,
      auto_create_table: row.get(9)?,
      table_created:     row.get(10)?,
      version:           row.get(11)?,
      sort_order:        row.get(12)?,
      properties:        row.get(13)?,
      created_by:        row.get(14)?,
      created_at:        row.get(15)?,
      updated_by:        row.get(16)?,
      updated_at:        row.get(17)?,
      deleted:           row.get(18)?,
      fields:            Vec::new(),
    })
  }

  pub fn into_entity(self) -> Result<EntityDefinition> {
    Ok(EntityDefinition {
      id:                self.id,
      entity_name:       self.entity_name,
      entity_code:       self.entity_code,
      table_name:        self.table_name,
      display_name:      self.display_name,
      description:       self.description,
      app_id:            self.app_id,
      entity_type:       decode_enum("entity_type", &self.entity_type)?,
      status:            decode_enum("status", &self.status)?,
      auto_create_table: self.auto_create_table,
      table_created:     self.table_created,
      version:           self.version,
      sort_order:        self.sort_order,
      properties:        decode_json(self.properties.as_deref())?,
      created_by:        self.created_by,
      created_at:        decode_dt(&self.created_at)?,
      updated_by:        self.updated_by,
      updated_at:        decode_dt(&self.updated_at)?,
      deleted:           self.deleted,
      fields:            self
        .fields
        .into_iter()
        .map(RawField::into_field)
        .collect::<Result<_>>()?,
    })
  }
}

/// Raw values read directly from an `entity_field_definitions` row.
pub struct RawField {
  pub id:               i64,
  pub entity_id:        i64,
  pub field_name:       String,
  pub field_code:       String,
  pub display_name:     Option<String>,
  pub description:      Option<String>,
  pub field_type:       String,
  pub db_type:          String,
  pub field_length:     Option<u32>,
  pub decimal_places:   Option<u32>,
  pub is_primary_key:   bool,
  pub is_not_null:      bool,
  pub is_unique:        bool,
  pub is_indexed:       bool,
  pub default_value:    Option<String>,
  pub sort_order:       i32,
  pub status:           String,
  pub validation_rules: Option<String>,
  pub properties:       Option<String>,
  pub created_by:       String,
  pub created_at:       String,
  pub updated_by:       String,
  pub updated_at:       String,
}

impl RawField {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      entity_id:        row.get(1)?,
      field_name:       row.get(2)?,
      field_code:       row.get(3)?,
      display_name:     row.get(4)?,
      description:      row.get(5)?,
      field_type:       row.get(6)?,
      db_type:          row.get(7)?,
      field_length:     row.get(8)?,
      decimal_places:   row.get(9)?,
      is_primary_key:   row.get(10)?,
      is_not_null:      row.get(11)?,
      is_unique:        row.get(12)?,
      is_indexed:       row.get(13)?,
      default_value:    row.get(14)?,
      sort_order:       row.get(15)?,
      status:           row.get(16)?,
      validation_rules: row.get(17)?,
      properties:       row.get(18)?,
      created_by:       row.get(19)?,
      created_at:       row.get(20)?,
      updated_by:       row.get(21)?,
      updated_at:       row.get(22)?,
    })
  }

  pub fn into_field(self) -> Result<FieldDefinition> {
    Ok(FieldDefinition {
      id:               self.id,
      entity_id:        self.entity_id,
      field_name:       self.field_name,
      field_code:       self.field_code,
      display_name:     self.display_name,
      description:      self.description,
      field_type:       decode_enum("field_type", &self.field_type)?,
      db_type:          self.db_type,
      field_length:     self.field_length,
      decimal_places:   self.decimal_places,
      is_primary_key:   self.is_primary_key,
      is_not_null:      self.is_not_null,
      is_unique:        self.is_unique,
      is_indexed:       self.is_indexed,
      default_value:    self.default_value,
      sort_order:       self.sort_order,
      status:           decode_enum("status", &self.status)?,
      validation_rules: self.validation_rules,
      properties:       decode_json(self.properties.as_deref())?,
      created_by:       self.created_by,
      created_at:       decode_dt(&self.created_at)?,
      updated_by:       self.updated_by,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from an `entity_data_storage` row.
pub struct RawRecord {
  pub id:          i64,
  pub record_id:   String,
  pub entity_id:   i64,
  pub entity_code: String,
  pub app_id:      i64,
  pub data_json:   String,
  pub version:     i64,
  pub status:      String,
  pub properties:  Option<String>,
  pub created_by:  String,
  pub created_at:  String,
  pub updated_by:  String,
  pub updated_at:  String,
  pub deleted:     bool,
}

impl RawRecord {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      record_id:   row.get(1)?,
      entity_id:   row.get(2)?,
      entity_code: row.get(3)?,
      app_id:      row.get(4)?,
      data_json:   row.get(5)?,
      version:     row.get(6)?,
      status:      row.get(7)?,
      properties:  row.get(8)?,
      created_by:  row.get(9)?,
      created_at:  row.get(10)?,
      updated_by:  row.get(11)?,
      updated_at:  row.get(12)?,
      deleted:     row.get(13)?,
    })
  }

  pub fn into_record(self) -> Result<Record> {
    let data: ValueMap = serde_json::from_str(&self.data_json)?;
    Ok(Record {
      id: self.id,
      record_id: self.record_id,
      entity_id: self.entity_id,
      entity_code: self.entity_code,
      app_id: self.app_id,
      data,
      version: self.version,
      status: decode_enum("status", &self.status)?,
      properties: decode_json(self.properties.as_deref())?,
      created_by: self.created_by,
      created_at: decode_dt(&self.created_at)?,
      updated_by: self.updated_by,
      updated_at: decode_dt(&self.updated_at)?,
      deleted: self.deleted,
    })
  }
}

//! Entity and field definitions: the metadata half of the engine.
//!
//! An [`EntityDefinition`] names a record type and exclusively owns its
//! ordered [`FieldDefinition`] list. Definitions are soft-deleted, never
//! removed, and every field-set replacement bumps the entity version.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result};

// ─── Enums ───────────────────────────────────────────────────────────────────

/// Logical type of a field, independent of the physical column type.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum FieldType {
  String,
  Integer,
  Long,
  Decimal,
  Boolean,
  Datetime,
  Text,
  Json,
}

impl FieldType {
  pub fn is_numeric(self) -> bool {
    matches!(self, Self::Integer | Self::Long | Self::Decimal)
  }

  pub fn is_textual(self) -> bool { matches!(self, Self::String | Self::Text) }

  /// Physical SQL type for this logical type.
  ///
  /// `length` applies to `STRING` (default 255); `precision`/`scale` apply to
  /// `DECIMAL`, whose defaults depend on the layout: `(19,2)` for native
  /// tables, `(10,2)` for template tables.
  pub fn sql_type(
    self,
    length: Option<u32>,
    scale: Option<u32>,
    layout: TableLayout,
  ) -> String {
    match self {
      Self::String => format!("VARCHAR({})", length.unwrap_or(255)),
      Self::Integer => "INT".to_owned(),
      Self::Long => "BIGINT".to_owned(),
      Self::Decimal => {
        let (default_precision, default_scale) = match layout {
          TableLayout::Native => (19, 2),
          TableLayout::Template => (10, 2),
        };
        format!(
          "DECIMAL({},{})",
          length.unwrap_or(default_precision),
          scale.unwrap_or(default_scale)
        )
      }
      Self::Boolean => match layout {
        TableLayout::Native => "BOOLEAN".to_owned(),
        TableLayout::Template => "TINYINT(1)".to_owned(),
      },
      Self::Datetime => "DATETIME".to_owned(),
      Self::Text => "TEXT".to_owned(),
      Self::Json => "JSON".to_owned(),
    }
  }
}

/// Whether the entity maps onto a pre-existing style table with real
/// columns, or is managed by this engine.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
  Static,
  #[default]
  Dynamic,
}

impl EntityKind {
  /// The materialisation path used for this kind of entity.
  pub fn layout(self) -> TableLayout {
    match self {
      Self::Static => TableLayout::Native,
      Self::Dynamic => TableLayout::Template,
    }
  }
}

/// The two materialisation paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLayout {
  /// One real column per field; the primary key is built from the fields
  /// flagged as keys (composite when several are flagged).
  Native,
  /// System columns (surrogate id, record id, timestamps, version, status)
  /// followed by the user fields.
  Template,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
  #[default]
  Active,
  Inactive,
  Draft,
}

/// Validation status of a single field definition.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldStatus {
  #[default]
  Active,
  Inactive,
}

// ─── System columns ──────────────────────────────────────────────────────────

/// Columns the template layout prepends to every materialised table.
pub const SYSTEM_COLUMNS: &[&str] =
  &["id", "record_id", "created_at", "updated_at", "version", "status"];

pub fn is_system_column(name: &str) -> bool {
  SYSTEM_COLUMNS.iter().any(|c| c.eq_ignore_ascii_case(name))
}

/// Tables owned by the engine itself. No entity may be materialised into,
/// or drop, one of these.
pub const SYSTEM_TABLES: &[&str] =
  &["entity_definitions", "entity_field_definitions", "entity_data_storage"];

/// A system table, or a name in SQLite's reserved `sqlite_` namespace.
pub fn is_reserved_table(name: &str) -> bool {
  let name = name.trim();
  SYSTEM_TABLES.iter().any(|t| t.eq_ignore_ascii_case(name))
    || name.get(..7).is_some_and(|p| p.eq_ignore_ascii_case("sqlite_"))
}

/// SQL identifiers accepted for table and field names: ASCII letter or `_`
/// followed by letters, digits or `_`, at most 64 characters.
pub fn is_valid_identifier(name: &str) -> bool {
  let mut chars = name.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
    _ => return false,
  }
  name.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ─── Definitions ─────────────────────────────────────────────────────────────

/// One attribute of an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
  pub id:               i64,
  pub entity_id:        i64,
  pub field_name:       String,
  pub field_code:       String,
  pub display_name:     Option<String>,
  pub description:      Option<String>,
  pub field_type:       FieldType,
  /// Physical column type; derived from `field_type` when not supplied.
  pub db_type:          String,
  /// String length, or decimal precision.
  pub field_length:     Option<u32>,
  pub decimal_places:   Option<u32>,
  pub is_primary_key:   bool,
  pub is_not_null:      bool,
  pub is_unique:        bool,
  pub is_indexed:       bool,
  pub default_value:    Option<String>,
  pub sort_order:       i32,
  pub status:           FieldStatus,
  pub validation_rules: Option<String>,
  pub properties:       Option<serde_json::Value>,
  pub created_by:       String,
  pub created_at:       DateTime<Utc>,
  pub updated_by:       String,
  pub updated_at:       DateTime<Utc>,
}

impl FieldDefinition {
  /// A write must carry a value for this field.
  pub fn is_required(&self) -> bool {
    self.is_not_null && self.default_value.is_none()
  }
}

/// A logical record type together with its ordered field list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
  pub id:                i64,
  pub entity_name:       String,
  pub entity_code:       String,
  pub table_name:        String,
  pub display_name:      Option<String>,
  pub description:       Option<String>,
  pub app_id:            i64,
  pub entity_type:       EntityKind,
  pub status:            EntityStatus,
  pub auto_create_table: bool,
  pub table_created:     bool,
  pub version:           i64,
  pub sort_order:        i32,
  pub properties:        Option<serde_json::Value>,
  pub created_by:        String,
  pub created_at:        DateTime<Utc>,
  pub updated_by:        String,
  pub updated_at:        DateTime<Utc>,
  pub deleted:           bool,
  /// Ordered by `sort_order`, then insertion order.
  pub fields:            Vec<FieldDefinition>,
}

impl EntityDefinition {
  pub fn layout(&self) -> TableLayout { self.entity_type.layout() }

  pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
    self.fields.iter().find(|f| f.field_name == name)
  }

  /// Rows live in the materialised table rather than the document store.
  pub fn is_table_backed(&self) -> bool { self.table_created }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input for one field of [`NewEntity`] or a field-set replacement.
#[derive(Debug, Clone, Deserialize)]
pub struct NewField {
  pub field_name:       String,
  pub field_code:       Option<String>,
  pub display_name:     Option<String>,
  pub description:      Option<String>,
  pub field_type:       FieldType,
  pub db_type:          Option<String>,
  pub field_length:     Option<u32>,
  pub decimal_places:   Option<u32>,
  #[serde(default)]
  pub is_primary_key:   bool,
  #[serde(default)]
  pub is_not_null:      bool,
  #[serde(default)]
  pub is_unique:        bool,
  #[serde(default)]
  pub is_indexed:       bool,
  pub default_value:    Option<String>,
  pub sort_order:       Option<i32>,
  pub validation_rules: Option<String>,
  pub properties:       Option<serde_json::Value>,
}

impl NewField {
  /// Convenience constructor with every optional attribute unset.
  pub fn new(field_name: impl Into<String>, field_type: FieldType) -> Self {
    Self {
      field_name: field_name.into(),
      field_code: None,
      display_name: None,
      description: None,
      field_type,
      db_type: None,
      field_length: None,
      decimal_places: None,
      is_primary_key: false,
      is_not_null: false,
      is_unique: false,
      is_indexed: false,
      default_value: None,
      sort_order: None,
      validation_rules: None,
      properties: None,
    }
  }

  pub fn primary_key(mut self) -> Self {
    self.is_primary_key = true;
    self.is_not_null = true;
    self
  }

  pub fn not_null(mut self) -> Self {
    self.is_not_null = true;
    self
  }

  pub fn unique(mut self) -> Self {
    self.is_unique = true;
    self
  }

  pub fn indexed(mut self) -> Self {
    self.is_indexed = true;
    self
  }

  pub fn default_value(mut self, value: impl Into<String>) -> Self {
    self.default_value = Some(value.into());
    self
  }

  pub fn display_name(mut self, name: impl Into<String>) -> Self {
    self.display_name = Some(name.into());
    self
  }
}

/// Input to [`crate::store::MetadataStore::create`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewEntity {
  pub entity_name:       String,
  /// Generated by the store when absent.
  pub entity_code:       Option<String>,
  pub table_name:        String,
  pub display_name:      Option<String>,
  pub description:       Option<String>,
  pub app_id:            i64,
  #[serde(default)]
  pub entity_type:       EntityKind,
  #[serde(default)]
  pub status:            EntityStatus,
  #[serde(default)]
  pub auto_create_table: bool,
  #[serde(default)]
  pub sort_order:        i32,
  pub properties:        Option<serde_json::Value>,
  pub fields:            Vec<NewField>,
}

impl NewEntity {
  pub fn new(
    app_id: i64,
    entity_name: impl Into<String>,
    table_name: impl Into<String>,
    fields: Vec<NewField>,
  ) -> Self {
    Self {
      entity_name: entity_name.into(),
      entity_code: None,
      table_name: table_name.into(),
      display_name: None,
      description: None,
      app_id,
      entity_type: EntityKind::default(),
      status: EntityStatus::default(),
      auto_create_table: false,
      sort_order: 0,
      properties: None,
      fields,
    }
  }

  pub fn with_code(mut self, code: impl Into<String>) -> Self {
    self.entity_code = Some(code.into());
    self
  }

  pub fn with_kind(mut self, kind: EntityKind) -> Self {
    self.entity_type = kind;
    self
  }

  pub fn auto_create_table(mut self) -> Self {
    self.auto_create_table = true;
    self
  }
}

// ─── Validation ──────────────────────────────────────────────────────────────

/// Check a field list against the rules of the given layout.
///
/// - at least one field, every name a valid identifier, names unique;
/// - native layout: at least one key field;
/// - template layout: at most one key field, and no field may shadow a
///   system column.
pub fn validate_fields(fields: &[NewField], layout: TableLayout) -> Result<()> {
  if fields.is_empty() {
    return Err(Error::Validation("entity must declare at least one field".into()));
  }

  let mut seen = HashSet::new();
  for field in fields {
    let name = field.field_name.trim();
    if name.is_empty() {
      return Err(Error::Validation("field name is required".into()));
    }
    if !is_valid_identifier(name) {
      return Err(Error::Validation(format!("invalid field name {name:?}")));
    }
    if !seen.insert(name.to_ascii_lowercase()) {
      return Err(Error::Validation(format!("duplicate field name {name:?}")));
    }
    if layout == TableLayout::Template && is_system_column(name) {
      return Err(Error::Validation(format!(
        "field name {name:?} is reserved for a system column"
      )));
    }
  }

  let keys = fields.iter().filter(|f| f.is_primary_key).count();
  match layout {
    TableLayout::Native if keys == 0 => {
      Err(Error::Validation("no primary key field present".into()))
    }
    TableLayout::Template if keys > 1 => Err(Error::Validation(format!(
      "at most one primary key field is allowed, found {keys}"
    ))),
    _ => Ok(()),
  }
}

/// Check the entity-level attributes and its fields.
pub fn validate_entity(input: &NewEntity) -> Result<()> {
  if input.entity_name.trim().is_empty() {
    return Err(Error::Validation("entity name is required".into()));
  }
  let table = input.table_name.trim();
  if table.is_empty() {
    return Err(Error::Validation("table name is required".into()));
  }
  if !is_valid_identifier(table) {
    return Err(Error::Validation(format!("invalid table name {table:?}")));
  }
  if is_reserved_table(table) {
    return Err(Error::Validation(format!("table name {table:?} is reserved")));
  }
  if let Some(code) = &input.entity_code
    && code.trim().is_empty()
  {
    return Err(Error::Validation("entity code must not be blank".into()));
  }
  validate_fields(&input.fields, input.entity_type.layout())
}

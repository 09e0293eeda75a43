//! Schema of the engine's own tables, declared as static specs and rendered
//! with the same generator that materialises entity tables.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

use crate::ddl::{Column, CreateTable, create_index_sql};

pub const SCHEMA_VERSION: u32 = 1;

pub struct ColumnSpec {
  pub name:        &'static str,
  pub sql_type:    &'static str,
  pub constraints: &'static str,
}

pub struct IndexSpec {
  pub name:      &'static str,
  pub columns:   &'static [&'static str],
  pub unique:    bool,
  /// Partial-index condition.
  pub predicate: Option<&'static str>,
}

pub struct TableSpec {
  pub name:    &'static str,
  pub columns: &'static [ColumnSpec],
  pub indexes: &'static [IndexSpec],
}

const fn col(
  name: &'static str,
  sql_type: &'static str,
  constraints: &'static str,
) -> ColumnSpec {
  ColumnSpec { name, sql_type, constraints }
}

const ID: ColumnSpec = col("id", "INTEGER", "PRIMARY KEY AUTOINCREMENT");
const CREATED_BY: ColumnSpec = col("created_by", "TEXT", "NOT NULL");
const CREATED_AT: ColumnSpec = col("created_at", "TEXT", "NOT NULL");
const UPDATED_BY: ColumnSpec = col("updated_by", "TEXT", "NOT NULL");
const UPDATED_AT: ColumnSpec = col("updated_at", "TEXT", "NOT NULL");
const DELETED: ColumnSpec = col("deleted", "INTEGER", "NOT NULL DEFAULT 0");

pub static ENTITY_DEFINITIONS: TableSpec = TableSpec {
  name:    "entity_definitions",
  columns: &[
    ID,
    col("entity_name", "TEXT", "NOT NULL"),
    col("entity_code", "TEXT", "NOT NULL"),
    col("table_name", "TEXT", "NOT NULL"),
    col("display_name", "TEXT", ""),
    col("description", "TEXT", ""),
    col("app_id", "INTEGER", "NOT NULL"),
    col("entity_type", "TEXT", "NOT NULL DEFAULT 'DYNAMIC'"),
    col("status", "TEXT", "NOT NULL DEFAULT 'ACTIVE'"),
    col("auto_create_table", "INTEGER", "NOT NULL DEFAULT 0"),
    col("table_created", "INTEGER", "NOT NULL DEFAULT 0"),
    col("version", "INTEGER", "NOT NULL DEFAULT 1"),
    col("sort_order", "INTEGER", "NOT NULL DEFAULT 0"),
    col("properties", "TEXT", ""),
    CREATED_BY,
    CREATED_AT,
    UPDATED_BY,
    UPDATED_AT,
    DELETED,
  ],
  indexes: &[
    // Codes are unique per application among live definitions only.
    IndexSpec {
      name:      "entity_definitions_code_app_uidx",
      columns:   &["entity_code", "app_id"],
      unique:    true,
      predicate: Some("deleted = 0"),
    },
    IndexSpec {
      name:      "entity_definitions_app_idx",
      columns:   &["app_id", "sort_order"],
      unique:    false,
      predicate: None,
    },
  ],
};

pub static ENTITY_FIELD_DEFINITIONS: TableSpec = TableSpec {
  name:    "entity_field_definitions",
  columns: &[
    ID,
    col("entity_id", "INTEGER", "NOT NULL REFERENCES entity_definitions(id)"),
    col("field_name", "TEXT", "NOT NULL"),
    col("field_code", "TEXT", "NOT NULL"),
    col("display_name", "TEXT", ""),
    col("description", "TEXT", ""),
    col("field_type", "TEXT", "NOT NULL"),
    col("db_type", "TEXT", "NOT NULL"),
    col("field_length", "INTEGER", ""),
    col("decimal_places", "INTEGER", ""),
    col("is_primary_key", "INTEGER", "NOT NULL DEFAULT 0"),
    col("is_not_null", "INTEGER", "NOT NULL DEFAULT 0"),
    col("is_unique", "INTEGER", "NOT NULL DEFAULT 0"),
    col("is_indexed", "INTEGER", "NOT NULL DEFAULT 0"),
    col("default_value", "TEXT", ""),
    col("sort_order", "INTEGER", "NOT NULL DEFAULT 0"),
    col("status", "TEXT", "NOT NULL DEFAULT 'ACTIVE'"),
    col("validation_rules", "TEXT", ""),
    col("properties", "TEXT", ""),
    CREATED_BY,
    CREATED_AT,
    UPDATED_BY,
    UPDATED_AT,
    DELETED,
  ],
  indexes: &[IndexSpec {
    name:      "entity_field_definitions_entity_idx",
    columns:   &["entity_id", "sort_order"],
    unique:    false,
    predicate: None,
  }],
};

pub static ENTITY_DATA_STORAGE: TableSpec = TableSpec {
  name:    "entity_data_storage",
  columns: &[
    ID,
    col("entity_id", "INTEGER", "NOT NULL REFERENCES entity_definitions(id)"),
    col("entity_code", "TEXT", "NOT NULL"),
    col("app_id", "INTEGER", "NOT NULL"),
    col("record_id", "TEXT", "NOT NULL UNIQUE"),
    col("data_json", "TEXT", "NOT NULL"),
    col("version", "INTEGER", "NOT NULL DEFAULT 1"),
    col("status", "TEXT", "NOT NULL DEFAULT 'ACTIVE'"),
    col("properties", "TEXT", ""),
    CREATED_BY,
    CREATED_AT,
    UPDATED_BY,
    UPDATED_AT,
    DELETED,
  ],
  indexes: &[
    IndexSpec {
      name:      "entity_data_storage_listing_idx",
      columns:   &["app_id", "entity_code", "created_at"],
      unique:    false,
      predicate: None,
    },
    IndexSpec {
      name:      "entity_data_storage_entity_idx",
      columns:   &["entity_id"],
      unique:    false,
      predicate: None,
    },
  ],
};

pub static SYSTEM_TABLES: &[&TableSpec] =
  &[&ENTITY_DEFINITIONS, &ENTITY_FIELD_DEFINITIONS, &ENTITY_DATA_STORAGE];

impl TableSpec {
  pub fn statements(&self) -> Vec<String> {
    let create = CreateTable {
      table:         self.name.to_owned(),
      if_not_exists: true,
      columns:       self
        .columns
        .iter()
        .map(|c| Column {
          name:        c.name.to_owned(),
          sql_type:    c.sql_type.to_owned(),
          constraints: (!c.constraints.is_empty())
            .then(|| c.constraints.to_owned())
            .into_iter()
            .collect(),
          comment:     None,
        })
        .collect(),
      primary_key:   Vec::new(),
    };
    let mut out = vec![create.to_sql()];
    out.extend(self.indexes.iter().map(|i| {
      create_index_sql(i.name, self.name, i.columns, i.unique, i.predicate)
    }));
    out
  }
}

/// Full schema script; idempotent thanks to `IF NOT EXISTS`.
pub fn schema_sql() -> String {
  let mut script = String::from("PRAGMA journal_mode = WAL;\nPRAGMA foreign_keys = ON;\n");
  for table in SYSTEM_TABLES {
    for stmt in table.statements() {
      script.push_str(&stmt);
      script.push_str(";\n");
    }
  }
  script.push_str(&format!("PRAGMA user_version = {SCHEMA_VERSION};\n"));
  script
}

//! DDL generation for the system tables and for materialised entity tables.
//!
//! Two layouts are supported for entity tables (see
//! [`protean_core::entity::TableLayout`]):
//!
//! - **native**: one column per field, `PRIMARY KEY` built from the key
//!   fields (composite when several are flagged);
//! - **template**: the system columns first, then one column per field. A key
//!   flag on a user field becomes `UNIQUE NOT NULL` since the surrogate `id`
//!   is the primary key.
//!
//! Every identifier is double-quoted. Field display names become inline
//! `/* ... */` comments, which SQLite keeps in `sqlite_master`.

use protean_core::entity::{EntityDefinition, FieldDefinition, FieldType, TableLayout};

// ─── Building blocks ─────────────────────────────────────────────────────────

pub fn quote_ident(name: &str) -> String { format!("\"{}\"", name.replace('"', "\"\"")) }

fn quote_literal(value: &str) -> String { format!("'{}'", value.replace('\'', "''")) }

/// One column of a `CREATE TABLE`.
#[derive(Debug, Clone)]
pub struct Column {
  pub name:        String,
  pub sql_type:    String,
  pub constraints: Vec<String>,
  pub comment:     Option<String>,
}

impl Column {
  fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
    Self {
      name:        name.into(),
      sql_type:    sql_type.into(),
      constraints: Vec::new(),
      comment:     None,
    }
  }

  fn with(mut self, constraint: impl Into<String>) -> Self {
    self.constraints.push(constraint.into());
    self
  }

  fn render(&self) -> String {
    let mut out = format!("{} {}", quote_ident(&self.name), self.sql_type);
    for c in &self.constraints {
      out.push(' ');
      out.push_str(c);
    }
    if let Some(comment) = &self.comment {
      // A literal `*/` would end the comment early.
      out.push_str(&format!(" /* {} */", comment.replace("*/", "* /")));
    }
    out
  }
}

/// A complete `CREATE TABLE` statement.
#[derive(Debug, Clone)]
pub struct CreateTable {
  pub table:         String,
  pub if_not_exists: bool,
  pub columns:       Vec<Column>,
  /// Table-level `PRIMARY KEY (...)`; empty when a column carries it.
  pub primary_key:   Vec<String>,
}

impl CreateTable {
  pub fn to_sql(&self) -> String {
    let mut lines: Vec<String> = self.columns.iter().map(Column::render).collect();
    if !self.primary_key.is_empty() {
      let keys: Vec<String> = self.primary_key.iter().map(|k| quote_ident(k)).collect();
      lines.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }
    format!(
      "CREATE TABLE {}{} (\n  {}\n)",
      if self.if_not_exists { "IF NOT EXISTS " } else { "" },
      quote_ident(&self.table),
      lines.join(",\n  ")
    )
  }
}

pub fn create_index_sql(
  name: &str,
  table: &str,
  columns: &[&str],
  unique: bool,
  predicate: Option<&str>,
) -> String {
  let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
  let mut sql = format!(
    "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
    if unique { "UNIQUE " } else { "" },
    quote_ident(name),
    quote_ident(table),
    cols.join(", ")
  );
  if let Some(p) = predicate {
    sql.push_str(" WHERE ");
    sql.push_str(p);
  }
  sql
}

pub fn drop_table_sql(table: &str) -> String {
  format!("DROP TABLE IF EXISTS {}", quote_ident(table))
}

// ─── Entity tables ───────────────────────────────────────────────────────────

/// The `DEFAULT` clause of a field. Numbers and the SQL time keywords are
/// emitted bare; booleans as 0/1; everything else as a string literal.
fn default_clause(field: &FieldDefinition) -> Option<String> {
  let raw = field.default_value.as_deref()?;
  let value = raw.trim();
  let literal = match field.field_type {
    FieldType::Integer | FieldType::Long | FieldType::Decimal
      if value.parse::<f64>().is_ok_and(f64::is_finite) =>
    {
      value.to_owned()
    }
    FieldType::Boolean if value.eq_ignore_ascii_case("true") => "1".to_owned(),
    FieldType::Boolean if value.eq_ignore_ascii_case("false") => "0".to_owned(),
    FieldType::Datetime
      if ["CURRENT_TIMESTAMP", "CURRENT_DATE", "CURRENT_TIME"]
        .iter()
        .any(|k| value.eq_ignore_ascii_case(k)) =>
    {
      value.to_ascii_uppercase()
    }
    _ => quote_literal(raw),
  };
  Some(format!("DEFAULT {literal}"))
}

fn field_column(field: &FieldDefinition, layout: TableLayout) -> Column {
  let mut col = Column::new(&field.field_name, &field.db_type);
  let template_key = layout == TableLayout::Template && field.is_primary_key;
  if field.is_not_null || field.is_primary_key {
    col = col.with("NOT NULL");
  }
  if template_key || (field.is_unique && !field.is_primary_key) {
    col = col.with("UNIQUE");
  }
  if let Some(default) = default_clause(field) {
    col = col.with(default);
  }
  col.comment = field.display_name.clone();
  col
}

fn template_system_columns() -> Vec<Column> {
  vec![
    Column::new("id", "INTEGER").with("PRIMARY KEY AUTOINCREMENT"),
    Column::new("record_id", "VARCHAR(32)").with("NOT NULL").with("UNIQUE"),
    Column::new("created_at", "DATETIME").with("NOT NULL"),
    Column::new("updated_at", "DATETIME").with("NOT NULL"),
    Column::new("version", "INT").with("NOT NULL").with("DEFAULT 1"),
    Column::new("status", "VARCHAR(16)").with("NOT NULL").with("DEFAULT 'ACTIVE'"),
  ]
}

/// The statements that materialise `entity`: `CREATE TABLE`, then one
/// index per indexed field.
pub fn entity_table_sql(entity: &EntityDefinition) -> Vec<String> {
  let layout = entity.layout();
  let mut table = CreateTable {
    table:         entity.table_name.clone(),
    if_not_exists: false,
    columns:       Vec::new(),
    primary_key:   Vec::new(),
  };

  if layout == TableLayout::Template {
    table.columns = template_system_columns();
  } else {
    table.primary_key = entity
      .fields
      .iter()
      .filter(|f| f.is_primary_key)
      .map(|f| f.field_name.clone())
      .collect();
  }
  table
    .columns
    .extend(entity.fields.iter().map(|f| field_column(f, layout)));

  let mut statements = vec![table.to_sql()];
  statements.extend(entity.fields.iter().filter(|f| f.is_indexed).map(|f| {
    create_index_sql(
      &format!("idx_{}_{}", entity.table_name, f.field_name),
      &entity.table_name,
      &[&f.field_name],
      false,
      None,
    )
  }));
  statements
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use protean_core::entity::{EntityKind, EntityStatus, FieldStatus};

  use super::*;

  fn field(name: &str, ty: FieldType, layout: TableLayout) -> FieldDefinition {
    FieldDefinition {
      id:               0,
      entity_id:        0,
      field_name:       name.into(),
      field_code:       name.into(),
      display_name:     None,
      description:      None,
      field_type:       ty,
      db_type:          ty.sql_type(None, None, layout),
      field_length:     None,
      decimal_places:   None,
      is_primary_key:   false,
      is_not_null:      false,
      is_unique:        false,
      is_indexed:       false,
      default_value:    None,
      sort_order:       0,
      status:           FieldStatus::Active,
      validation_rules: None,
      properties:       None,
      created_by:       "test".into(),
      created_at:       Utc::now(),
      updated_by:       "test".into(),
      updated_at:       Utc::now(),
    }
  }

  fn entity(kind: EntityKind, fields: Vec<FieldDefinition>) -> EntityDefinition {
    EntityDefinition {
      id: 1,
      entity_name: "Product".into(),
      entity_code: "product".into(),
      table_name: "product".into(),
      display_name: None,
      description: None,
      app_id: 1,
      entity_type: kind,
      status: EntityStatus::Active,
      auto_create_table: true,
      table_created: false,
      version: 1,
      sort_order: 0,
      properties: None,
      created_by: "test".into(),
      created_at: Utc::now(),
      updated_by: "test".into(),
      updated_at: Utc::now(),
      deleted: false,
      fields,
    }
  }

  #[test]
  fn template_layout_prepends_system_columns() {
    let mut sku = field("sku", FieldType::String, TableLayout::Template);
    sku.is_primary_key = true;
    let mut price = field("price", FieldType::Decimal, TableLayout::Template);
    price.display_name = Some("Unit price".into());

    let sql = entity_table_sql(&entity(EntityKind::Dynamic, vec![sku, price]));
    assert_eq!(sql.len(), 1);
    let create = &sql[0];
    assert!(create.starts_with("CREATE TABLE \"product\" ("));
    assert!(create.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
    assert!(create.contains("\"record_id\" VARCHAR(32) NOT NULL UNIQUE"));
    assert!(create.contains("\"sku\" VARCHAR(255) NOT NULL UNIQUE"));
    assert!(create.contains("\"price\" DECIMAL(10,2) /* Unit price */"));
    assert!(!create.contains("PRIMARY KEY (\""));
    let id_at = create.find("\"id\"").unwrap();
    let sku_at = create.find("\"sku\"").unwrap();
    assert!(id_at < sku_at);
  }

  #[test]
  fn native_layout_builds_composite_key() {
    let mut order = field("order_no", FieldType::Long, TableLayout::Native);
    order.is_primary_key = true;
    let mut line = field("line_no", FieldType::Integer, TableLayout::Native);
    line.is_primary_key = true;
    let mut qty = field("qty", FieldType::Integer, TableLayout::Native);
    qty.is_indexed = true;

    let sql = entity_table_sql(&entity(EntityKind::Static, vec![order, line, qty]));
    assert!(sql[0].contains("\"order_no\" BIGINT NOT NULL"));
    assert!(sql[0].contains("PRIMARY KEY (\"order_no\", \"line_no\")"));
    assert!(!sql[0].contains("record_id"));
    assert_eq!(
      sql[1],
      "CREATE INDEX IF NOT EXISTS \"idx_product_qty\" ON \"product\" (\"qty\")"
    );
  }

  #[test]
  fn defaults_are_quoted_by_type() {
    let mut n = field("n", FieldType::Integer, TableLayout::Native);
    n.default_value = Some("42".into());
    assert_eq!(default_clause(&n).unwrap(), "DEFAULT 42");

    let mut s = field("s", FieldType::String, TableLayout::Native);
    s.default_value = Some("it's".into());
    assert_eq!(default_clause(&s).unwrap(), "DEFAULT 'it''s'");

    let mut b = field("b", FieldType::Boolean, TableLayout::Native);
    b.default_value = Some("TRUE".into());
    assert_eq!(default_clause(&b).unwrap(), "DEFAULT 1");

    let mut t = field("t", FieldType::Datetime, TableLayout::Native);
    t.default_value = Some("current_timestamp".into());
    assert_eq!(default_clause(&t).unwrap(), "DEFAULT CURRENT_TIMESTAMP");

    let mut bad = field("bad", FieldType::Integer, TableLayout::Native);
    bad.default_value = Some("1; DROP TABLE x".into());
    assert_eq!(default_clause(&bad).unwrap(), "DEFAULT '1; DROP TABLE x'");
  }

  #[test]
  fn comments_cannot_be_closed_early() {
    let mut f = field("f", FieldType::Text, TableLayout::Native);
    f.display_name = Some("a */ b".into());
    assert_eq!(field_column(&f, TableLayout::Native).render(), "\"f\" TEXT /* a * / b */");
  }

  #[test]
  fn partial_unique_index() {
    assert_eq!(
      create_index_sql("u", "t", &["a", "b"], true, Some("deleted = 0")),
      "CREATE UNIQUE INDEX IF NOT EXISTS \"u\" ON \"t\" (\"a\", \"b\") WHERE deleted = 0"
    );
    assert_eq!(drop_table_sql("t"), "DROP TABLE IF EXISTS \"t\"");
  }
}

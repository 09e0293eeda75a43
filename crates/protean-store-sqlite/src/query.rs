//! Compiles [`QueryOptions`] into parameterised SQL.
//!
//! Two targets share one predicate AST:
//!
//! - the document table, where a field is `json_extract(data_json, ?)` with
//!   the JSON path bound as a parameter;
//! - a materialised entity table, where a field is its quoted column.
//!
//! Literal values are always bound, never spliced into the SQL text. Params
//! are pushed in the order their placeholders appear: `WHERE`, then
//! `ORDER BY`, then `LIMIT`/`OFFSET`. The count statement reuses the `WHERE`
//! params alone.

use protean_core::{
  entity::{EntityDefinition, SYSTEM_COLUMNS, TableLayout, is_system_column},
  query::{OrderClause, Predicate, QueryOptions, Scalar},
};
use rusqlite::types::Value as SqlValue;

use crate::{ddl::quote_ident, encode::RECORD_COLUMNS};

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
  pub sql:          String,
  pub params:       Vec<SqlValue>,
  /// `SELECT COUNT(*)` over the same `WHERE`, when `$count` was requested.
  pub count_sql:    Option<String>,
  pub count_params: Vec<SqlValue>,
}

/// A field reference: SQL text plus the params its placeholders need.
struct Operand {
  sql:    String,
  params: Vec<SqlValue>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Target {
  Documents,
  Table,
}

fn scalar(s: Scalar) -> SqlValue {
  match s {
    Scalar::Integer(i) => SqlValue::Integer(i),
    Scalar::Real(f) => SqlValue::Real(f),
    Scalar::Text(t) => SqlValue::Text(t),
  }
}

/// Translate `pred` with `operand` standing in for its field.
///
/// On documents, `eq`/`ne` against a numeric literal and every ordering
/// comparison cast the extracted value to DECIMAL; other `eq`/`ne` compare
/// the unquoted JSON value. Table columns carry their own affinity and are
/// compared as they are.
fn predicate_sql(
  pred: &Predicate,
  operand: Operand,
  target: Target,
  params: &mut Vec<SqlValue>,
) -> String {
  let Operand { sql: expr, params: operand_params } = operand;
  params.extend(operand_params);
  match pred {
    Predicate::Match { func, value, .. } => {
      params.push(SqlValue::Text(func.like_pattern(value)));
      format!("{expr} LIKE ? ESCAPE '\\'")
    }
    Predicate::Compare { op, value, .. } => {
      let op_sql = op.as_sql();
      if target == Target::Table {
        params.push(scalar(value.to_scalar()));
        return format!("{expr} {op_sql} ?");
      }
      match (value.as_number(), op.is_ordering()) {
        (Some(n), _) => {
          params.push(scalar(n));
          format!("CAST({expr} AS DECIMAL) {op_sql} ?")
        }
        (None, true) => {
          params.push(SqlValue::Text(value.text().to_owned()));
          format!("CAST({expr} AS DECIMAL) {op_sql} CAST(? AS DECIMAL)")
        }
        (None, false) => {
          params.push(scalar(value.to_scalar()));
          format!("{expr} {op_sql} ?")
        }
      }
    }
  }
}

fn order_sql(clauses: Vec<(Operand, &OrderClause)>) -> (String, Vec<SqlValue>) {
  let mut params = Vec::new();
  let parts: Vec<String> = clauses
    .into_iter()
    .map(|(operand, clause)| {
      params.extend(operand.params);
      format!("{} {}", operand.sql, clause.direction.as_sql())
    })
    .collect();
  (parts.join(", "), params)
}

struct Parts {
  select:       String,
  count_select: String,
  conditions:   Vec<String>,
  where_params: Vec<SqlValue>,
  order_by:     (String, Vec<SqlValue>),
}

fn assemble(parts: Parts, opts: &QueryOptions) -> CompiledQuery {
  let where_sql = if parts.conditions.is_empty() {
    String::new()
  } else {
    format!(" WHERE {}", parts.conditions.join(" AND "))
  };
  let (count_sql, count_params) = if opts.count {
    (
      Some(format!("{}{where_sql}", parts.count_select)),
      parts.where_params.clone(),
    )
  } else {
    (None, Vec::new())
  };

  let (order_by, order_params) = parts.order_by;
  let mut params = parts.where_params;
  params.extend(order_params);
  params.push(SqlValue::Integer(i64::from(opts.top)));
  params.push(SqlValue::Integer(i64::try_from(opts.offset()).unwrap_or(i64::MAX)));

  CompiledQuery {
    sql: format!(
      "{}{where_sql} ORDER BY {order_by} LIMIT ? OFFSET ?",
      parts.select
    ),
    params,
    count_sql,
    count_params,
  }
}

// ─── Documents ───────────────────────────────────────────────────────────────

/// Storage columns addressable by name; `id` is the record identifier, as
/// in query results. A field the entity declares is always a key of the JSON
/// document, even when it shares a storage column's name.
fn document_operand(entity: &EntityDefinition, field: &str) -> Operand {
  let column = match field {
    _ if entity.field(field).is_some() => None,
    "id" => Some("record_id"),
    "created_at" | "updated_at" | "version" | "status" => Some(field),
    _ => None,
  };
  match column {
    Some(c) => Operand { sql: c.to_owned(), params: Vec::new() },
    None => Operand {
      sql:    "json_extract(data_json, ?)".to_owned(),
      params: vec![SqlValue::Text(format!("$.{field}"))],
    },
  }
}

/// Compile a query over the non-deleted documents of one entity. Without
/// `$orderby` the newest documents come first.
pub fn compile_documents(entity: &EntityDefinition, opts: &QueryOptions) -> CompiledQuery {
  let mut conditions = vec![
    "app_id = ?".to_owned(),
    "entity_code = ?".to_owned(),
    "deleted = 0".to_owned(),
  ];
  let mut where_params = vec![
    SqlValue::Integer(entity.app_id),
    SqlValue::Text(entity.entity_code.clone()),
  ];

  if let Some(pred) = &opts.filter {
    let operand = document_operand(entity, pred.field());
    conditions.push(predicate_sql(pred, operand, Target::Documents, &mut where_params));
  }

  let order_by = if opts.order_by.is_empty() {
    ("created_at DESC, id DESC".to_owned(), Vec::new())
  } else {
    order_sql(
      opts
        .order_by
        .iter()
        .map(|c| (document_operand(entity, &c.field), c))
        .collect(),
    )
  };

  assemble(
    Parts {
      select: format!("SELECT {RECORD_COLUMNS} FROM entity_data_storage"),
      count_select: "SELECT COUNT(*) FROM entity_data_storage".to_owned(),
      conditions,
      where_params,
      order_by,
    },
    opts,
  )
}

// ─── Materialised tables ─────────────────────────────────────────────────────

/// Columns of an entity table, in `SELECT` order.
pub fn table_columns(entity: &EntityDefinition) -> Vec<String> {
  let system: &[&str] = match entity.layout() {
    TableLayout::Template => SYSTEM_COLUMNS,
    TableLayout::Native => &[],
  };
  system
    .iter()
    .map(|c| (*c).to_owned())
    .chain(entity.fields.iter().map(|f| f.field_name.clone()))
    .collect()
}

/// The real column named `field`, case-insensitively. System columns only
/// exist on template tables.
fn table_column(entity: &EntityDefinition, field: &str) -> Option<String> {
  if entity.layout() == TableLayout::Template && is_system_column(field) {
    return Some(field.to_ascii_lowercase());
  }
  entity
    .fields
    .iter()
    .find(|f| f.field_name.eq_ignore_ascii_case(field))
    .map(|f| f.field_name.clone())
}

fn column_operand(column: &str) -> Operand {
  Operand { sql: quote_ident(column), params: Vec::new() }
}

fn default_table_order(entity: &EntityDefinition) -> (String, Vec<SqlValue>) {
  let sql = match entity.layout() {
    TableLayout::Template => "\"created_at\" DESC, \"id\" DESC",
    TableLayout::Native => "rowid DESC",
  };
  (sql.to_owned(), Vec::new())
}

/// Compile a query over a materialised entity table.
///
/// A `$filter` or `$orderby` naming a column the table does not have is
/// dropped, the same way unparseable ones are.
pub fn compile_table(entity: &EntityDefinition, opts: &QueryOptions) -> CompiledQuery {
  let table = quote_ident(&entity.table_name);
  let mut conditions = Vec::new();
  let mut where_params = Vec::new();

  if let Some(pred) = &opts.filter {
    match table_column(entity, pred.field()) {
      Some(col) => conditions.push(predicate_sql(
        pred,
        column_operand(&col),
        Target::Table,
        &mut where_params,
      )),
      None => tracing::warn!(
        table = %entity.table_name,
        filter = %pred,
        "ignoring $filter on unknown column"
      ),
    }
  }

  let resolved: Option<Vec<_>> = opts
    .order_by
    .iter()
    .map(|c| table_column(entity, &c.field).map(|col| (column_operand(&col), c)))
    .collect();
  let order_by = match resolved {
    Some(clauses) if !clauses.is_empty() => order_sql(clauses),
    Some(_) => default_table_order(entity),
    None => {
      tracing::warn!(table = %entity.table_name, "ignoring $orderby on unknown column");
      default_table_order(entity)
    }
  };

  let columns: Vec<String> = table_columns(entity).iter().map(|c| quote_ident(c)).collect();
  assemble(
    Parts {
      select: format!("SELECT {} FROM {table}", columns.join(", ")),
      count_select: format!("SELECT COUNT(*) FROM {table}"),
      conditions,
      where_params,
      order_by,
    },
    opts,
  )
}

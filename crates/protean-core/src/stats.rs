//! Per-field aggregates over one page of query results.
//!
//! Only the rows handed in are aggregated. For a paginated query that is the
//! returned page, not every matching row.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::Value;

use crate::{entity::FieldDefinition, record::ValueMap};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldStats {
  /// `INTEGER`, `LONG` and `DECIMAL` fields.
  Numeric {
    count:   u64,
    sum:     f64,
    average: Option<f64>,
    min:     Option<f64>,
    max:     Option<f64>,
  },
  /// `STRING` and `TEXT` fields; lengths are in characters.
  Text {
    count:          u64,
    distinct:       u64,
    min_length:     Option<usize>,
    max_length:     Option<usize>,
    average_length: Option<f64>,
  },
}

pub type Stats = BTreeMap<String, FieldStats>;

/// Aggregate `rows` for every numeric and textual field in `fields`. Fields
/// of other types are left out.
pub fn aggregate(rows: &[ValueMap], fields: &[FieldDefinition]) -> Stats {
  fields
    .iter()
    .filter_map(|f| {
      let values = rows.iter().filter_map(|r| r.get(&f.field_name));
      let stats = if f.field_type.is_numeric() {
        numeric(values)
      } else if f.field_type.is_textual() {
        text(values)
      } else {
        return None;
      };
      Some((f.field_name.clone(), stats))
    })
    .collect()
}

fn as_number(v: &Value) -> Option<f64> {
  match v {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
    _ => None,
  }
}

fn as_text(v: &Value) -> Option<String> {
  match v {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

fn numeric<'a>(values: impl Iterator<Item = &'a Value>) -> FieldStats {
  let nums: Vec<f64> = values.filter_map(as_number).collect();
  let count = nums.len() as u64;
  let sum = nums.iter().fold(0.0, |acc, n| acc + n);
  FieldStats::Numeric {
    count,
    sum,
    average: (count > 0).then(|| sum / count as f64),
    min: nums.iter().copied().reduce(f64::min),
    max: nums.iter().copied().reduce(f64::max),
  }
}

fn text<'a>(values: impl Iterator<Item = &'a Value>) -> FieldStats {
  let texts: Vec<String> = values.filter_map(as_text).collect();
  let lengths: Vec<usize> = texts.iter().map(|s| s.chars().count()).collect();
  let count = texts.len() as u64;
  let distinct = texts.iter().collect::<HashSet<_>>().len() as u64;
  FieldStats::Text {
    count,
    distinct,
    min_length: lengths.iter().copied().min(),
    max_length: lengths.iter().copied().max(),
    average_length: (count > 0)
      .then(|| lengths.iter().sum::<usize>() as f64 / count as f64),
  }
}

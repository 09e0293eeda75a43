//! [`QueryOptions`]: the parsed form of the `$`-prefixed query parameters.
//!
//! | param | effect |
//! |-------|--------|
//! | `$filter` | one predicate, see [`super::filter`] |
//! | `$orderby` | `field [asc\|desc], ...` |
//! | `$select` | field allow-list; `id` is always kept |
//! | `$top` | page size, default [`DEFAULT_TOP`] |
//! | `$skip` | offset, default 0 |
//! | `$count` | `true` adds the total match count |
//! | `$stats` | `true` adds per-field aggregates of the page |
//!
//! Malformed `$filter` and `$orderby` values never fail a query. They are
//! logged and dropped: the query runs unfiltered, or in the default order
//! (newest first).

use std::collections::{BTreeSet, HashMap};

use crate::{
  entity::is_valid_identifier,
  record::ValueMap,
};

use super::filter::{FilterParseError, Predicate, parse_filter};

pub const DEFAULT_TOP: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Asc,
  Desc,
}

impl Direction {
  pub fn as_sql(self) -> &'static str {
    match self {
      Self::Asc => "ASC",
      Self::Desc => "DESC",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderClause {
  pub field:     String,
  pub direction: Direction,
}

/// Parse `$orderby`. Any malformed clause invalidates the whole value.
pub fn parse_order_by(input: &str) -> Result<Vec<OrderClause>, FilterParseError> {
  let mut clauses = Vec::new();
  for part in input.split(',') {
    let mut words = part.split_whitespace();
    let field = match words.next() {
      Some(f) if is_valid_identifier(f) => f.to_owned(),
      _ => return Err(FilterParseError::InvalidOrderBy(part.trim().to_owned())),
    };
    let direction = match words.next().map(str::to_ascii_lowercase).as_deref() {
      None | Some("asc") => Direction::Asc,
      Some("desc") => Direction::Desc,
      Some(_) => return Err(FilterParseError::InvalidOrderBy(part.trim().to_owned())),
    };
    if words.next().is_some() {
      return Err(FilterParseError::InvalidOrderBy(part.trim().to_owned()));
    }
    clauses.push(OrderClause { field, direction });
  }
  Ok(clauses)
}

/// Parsed query parameters. Build with [`QueryOptions::from_params`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
  pub filter:   Option<Predicate>,
  /// Empty means the default order.
  pub order_by: Vec<OrderClause>,
  pub select:   Option<Vec<String>>,
  pub top:      u32,
  pub skip:     u32,
  pub count:    bool,
  pub stats:    bool,
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self {
      filter:   None,
      order_by: Vec::new(),
      select:   None,
      top:      DEFAULT_TOP,
      skip:     0,
      count:    false,
      stats:    false,
    }
  }
}

impl QueryOptions {
  /// Build options from raw query parameters. Unknown keys are ignored.
  pub fn from_params(params: &HashMap<String, String>) -> Self {
    let mut opts = Self::default();

    if let Some(raw) = params.get("$filter").filter(|s| !s.trim().is_empty()) {
      match parse_filter(raw) {
        Ok(p) => opts.filter = Some(p),
        Err(e) => {
          tracing::warn!(filter = %raw, error = %e, "ignoring unparseable $filter");
        }
      }
    }

    if let Some(raw) = params.get("$orderby").filter(|s| !s.trim().is_empty()) {
      match parse_order_by(raw) {
        Ok(clauses) => opts.order_by = clauses,
        Err(e) => {
          tracing::warn!(orderby = %raw, error = %e, "ignoring unparseable $orderby");
        }
      }
    }

    if let Some(raw) = params.get("$select") {
      let fields: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|f| is_valid_identifier(f))
        .map(str::to_owned)
        .collect();
      if !fields.is_empty() {
        opts.select = Some(fields);
      }
    }

    if let Some(top) = params.get("$top").and_then(|s| s.trim().parse::<u32>().ok())
      && top > 0
    {
      opts.top = top;
    }
    if let Some(skip) = params.get("$skip").and_then(|s| s.trim().parse::<u32>().ok()) {
      opts.skip = skip;
    }

    opts.count = is_true(params.get("$count"));
    opts.stats = is_true(params.get("$stats"));
    opts
  }

  /// 1-based page number: `skip / top + 1`.
  pub fn page(&self) -> u32 { self.skip / self.top.max(1) + 1 }

  /// Row offset of [`Self::page`]. A `$skip` that is not a multiple of
  /// `$top` is rounded down to the start of its page.
  pub fn offset(&self) -> u64 { u64::from(self.page() - 1) * u64::from(self.top) }

  /// Apply `$select` to a result row. `id` is always kept.
  pub fn project(&self, row: ValueMap) -> ValueMap {
    let Some(select) = &self.select else {
      return row;
    };
    let keep: BTreeSet<&str> =
      select.iter().map(String::as_str).chain(["id"]).collect();
    row.into_iter().filter(|(k, _)| keep.contains(k.as_str())).collect()
  }
}

fn is_true(value: Option<&String>) -> bool {
  value.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

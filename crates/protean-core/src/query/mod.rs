//! The query-parameter grammar: parsing only. SQL generation lives with the
//! storage backend.

pub mod filter;
pub mod options;

pub use filter::{
  CompareOp, FilterParseError, Literal, Predicate, Scalar, TextMatch, parse_filter,
};
pub use options::{DEFAULT_TOP, Direction, OrderClause, QueryOptions, parse_order_by};

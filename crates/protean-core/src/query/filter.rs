//! `$filter` parser.
//!
//! Accepts exactly one predicate, either a function call
//!
//! ```text
//! contains(field,'value') | startswith(field,'value') | endswith(field,'value')
//! ```
//!
//! or a binary comparison `field OP value` with `OP` one of
//! `eq ne gt ge lt le` and `value` a quoted string (`''` escapes a quote) or
//! a bare token. Keywords are case-insensitive. Anything else, including
//! `and`/`or` composition, is a [`FilterParseError`].

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::entity::is_valid_identifier;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterParseError {
  #[error("empty expression")]
  Empty,
  #[error("expected a field name at offset {0}")]
  ExpectedField(usize),
  #[error("unknown function {0:?}")]
  UnknownFunction(String),
  #[error("unknown operator {0:?}")]
  UnknownOperator(String),
  #[error("expected {expected:?} at offset {offset}")]
  Expected { expected: char, offset: usize },
  #[error("expected a quoted string at offset {0}")]
  ExpectedString(usize),
  #[error("unterminated string starting at offset {0}")]
  UnterminatedString(usize),
  #[error("missing comparison value")]
  MissingValue,
  #[error("unexpected trailing input {0:?}")]
  TrailingInput(String),
  #[error("invalid orderby clause {0:?}")]
  InvalidOrderBy(String),
}

// ─── AST ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
  Eq,
  Ne,
  Gt,
  Ge,
  Lt,
  Le,
}

impl CompareOp {
  pub fn as_sql(self) -> &'static str {
    match self {
      Self::Eq => "=",
      Self::Ne => "<>",
      Self::Gt => ">",
      Self::Ge => ">=",
      Self::Lt => "<",
      Self::Le => "<=",
    }
  }

  /// Ordering comparisons always compare numerically.
  pub fn is_ordering(self) -> bool {
    matches!(self, Self::Gt | Self::Ge | Self::Lt | Self::Le)
  }
}

impl FromStr for CompareOp {
  type Err = FilterParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "eq" => Ok(Self::Eq),
      "ne" => Ok(Self::Ne),
      "gt" => Ok(Self::Gt),
      "ge" => Ok(Self::Ge),
      "lt" => Ok(Self::Lt),
      "le" => Ok(Self::Le),
      _ => Err(FilterParseError::UnknownOperator(s.to_owned())),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
  Contains,
  StartsWith,
  EndsWith,
}

impl TextMatch {
  /// `LIKE` pattern for `value`, with `%`, `_` and `\` escaped so they match
  /// literally (the SQL uses `ESCAPE '\'`).
  pub fn like_pattern(self, value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
      if matches!(c, '%' | '_' | '\\') {
        escaped.push('\\');
      }
      escaped.push(c);
    }
    match self {
      Self::Contains => format!("%{escaped}%"),
      Self::StartsWith => format!("{escaped}%"),
      Self::EndsWith => format!("%{escaped}"),
    }
  }
}

impl FromStr for TextMatch {
  type Err = FilterParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "contains" => Ok(Self::Contains),
      "startswith" => Ok(Self::StartsWith),
      "endswith" => Ok(Self::EndsWith),
      _ => Err(FilterParseError::UnknownFunction(s.to_owned())),
    }
  }
}

/// A comparison value as written by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
  Quoted(String),
  Bare(String),
}

/// A literal resolved to the value bound into SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
  Integer(i64),
  Real(f64),
  Text(String),
}

impl Literal {
  pub fn text(&self) -> &str {
    match self {
      Self::Quoted(s) | Self::Bare(s) => s,
    }
  }

  /// Numeric value of the literal text, quoted or not.
  pub fn as_number(&self) -> Option<Scalar> {
    let text = self.text().trim();
    if let Ok(i) = text.parse::<i64>() {
      return Some(Scalar::Integer(i));
    }
    text
      .parse::<f64>()
      .ok()
      .filter(|f| f.is_finite())
      .map(Scalar::Real)
  }

  /// The value bound for an equality comparison: numeric when the text
  /// parses as a number, `1`/`0` for bare `true`/`false`, text otherwise.
  pub fn to_scalar(&self) -> Scalar {
    if let Some(n) = self.as_number() {
      return n;
    }
    match self {
      Self::Bare(s) if s.eq_ignore_ascii_case("true") => Scalar::Integer(1),
      Self::Bare(s) if s.eq_ignore_ascii_case("false") => Scalar::Integer(0),
      other => Scalar::Text(other.text().to_owned()),
    }
  }
}

/// The single predicate of a `$filter`.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
  Compare { field: String, op: CompareOp, value: Literal },
  Match { field: String, func: TextMatch, value: String },
}

impl Predicate {
  pub fn field(&self) -> &str {
    match self {
      Self::Compare { field, .. } | Self::Match { field, .. } => field,
    }
  }
}

impl fmt::Display for Predicate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Compare { field, op, value } => {
        write!(f, "{field} {op:?} {:?}", value.text())
      }
      Self::Match { field, func, value } => write!(f, "{func:?}({field}, {value:?})"),
    }
  }
}

// ─── Parser ──────────────────────────────────────────────────────────────────

/// Parse a `$filter` expression into a [`Predicate`].
pub fn parse_filter(input: &str) -> Result<Predicate, FilterParseError> {
  let mut cur = Cursor::new(input);
  cur.skip_ws();
  if cur.at_end() {
    return Err(FilterParseError::Empty);
  }

  let head_at = cur.pos;
  let head = cur.word().ok_or(FilterParseError::ExpectedField(head_at))?;
  cur.skip_ws();

  let predicate = if cur.peek() == Some('(') {
    let func: TextMatch = head.parse()?;
    cur.bump();
    cur.skip_ws();
    let field = cur.field()?;
    cur.skip_ws();
    cur.expect(',')?;
    cur.skip_ws();
    let value = cur.quoted()?;
    cur.skip_ws();
    cur.expect(')')?;
    Predicate::Match { field, func, value }
  } else {
    if !is_valid_identifier(head) {
      return Err(FilterParseError::ExpectedField(head_at));
    }
    let op_word = cur.word().ok_or(FilterParseError::MissingValue)?;
    let op: CompareOp = op_word.parse()?;
    cur.skip_ws();
    let value = match cur.peek() {
      Some('\'') => Literal::Quoted(cur.quoted()?),
      Some(_) => Literal::Bare(cur.bare().to_owned()),
      None => return Err(FilterParseError::MissingValue),
    };
    Predicate::Compare { field: head.to_owned(), op, value }
  };

  cur.skip_ws();
  if !cur.at_end() {
    return Err(FilterParseError::TrailingInput(cur.rest().to_owned()));
  }
  Ok(predicate)
}

struct Cursor<'a> {
  src: &'a str,
  pos: usize,
}

impl<'a> Cursor<'a> {
  fn new(src: &'a str) -> Self { Self { src, pos: 0 } }

  fn rest(&self) -> &'a str {
    let src = self.src;
    &src[self.pos..]
  }

  fn at_end(&self) -> bool { self.pos >= self.src.len() }

  fn peek(&self) -> Option<char> { self.rest().chars().next() }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.pos += c.len_utf8();
    Some(c)
  }

  fn skip_ws(&mut self) {
    while self.peek().is_some_and(char::is_whitespace) {
      self.bump();
    }
  }

  fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
    let start = self.pos;
    while self.peek().is_some_and(&pred) {
      self.bump();
    }
    let src = self.src;
    &src[start..self.pos]
  }

  /// A run of identifier characters.
  fn word(&mut self) -> Option<&'a str> {
    let w = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
    (!w.is_empty()).then_some(w)
  }

  fn field(&mut self) -> Result<String, FilterParseError> {
    let at = self.pos;
    match self.word() {
      Some(w) if is_valid_identifier(w) => Ok(w.to_owned()),
      _ => Err(FilterParseError::ExpectedField(at)),
    }
  }

  /// Everything up to the next whitespace.
  fn bare(&mut self) -> &'a str { self.take_while(|c| !c.is_whitespace()) }

  fn expect(&mut self, expected: char) -> Result<(), FilterParseError> {
    if self.peek() == Some(expected) {
      self.bump();
      Ok(())
    } else {
      Err(FilterParseError::Expected { expected, offset: self.pos })
    }
  }

  fn quoted(&mut self) -> Result<String, FilterParseError> {
    let start = self.pos;
    if self.peek() != Some('\'') {
      return Err(FilterParseError::ExpectedString(start));
    }
    self.bump();
    let mut out = String::new();
    loop {
      match self.bump() {
        Some('\'') if self.peek() == Some('\'') => {
          self.bump();
          out.push('\'');
        }
        Some('\'') => return Ok(out),
        Some(c) => out.push(c),
        None => return Err(FilterParseError::UnterminatedString(start)),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn cmp(field: &str, op: CompareOp, value: Literal) -> Predicate {
    Predicate::Compare { field: field.into(), op, value }
  }

  #[test]
  fn bare_numeric_comparison() {
    assert_eq!(
      parse_filter("price gt 3000").unwrap(),
      cmp("price", CompareOp::Gt, Literal::Bare("3000".into()))
    );
  }

  #[test]
  fn quoted_comparison_with_escaped_quote() {
    assert_eq!(
      parse_filter("name eq 'O''Brien'").unwrap(),
      cmp("name", CompareOp::Eq, Literal::Quoted("O'Brien".into()))
    );
  }

  #[test]
  fn operators_are_case_insensitive() {
    let p = parse_filter("  qty   LE  5 ").unwrap();
    assert_eq!(p, cmp("qty", CompareOp::Le, Literal::Bare("5".into())));
  }

  #[test]
  fn every_operator_parses() {
    for (word, op) in [
      ("eq", CompareOp::Eq),
      ("ne", CompareOp::Ne),
      ("gt", CompareOp::Gt),
      ("ge", CompareOp::Ge),
      ("lt", CompareOp::Lt),
      ("le", CompareOp::Le),
    ] {
      let p = parse_filter(&format!("a {word} 1")).unwrap();
      assert!(matches!(p, Predicate::Compare { op: o, .. } if o == op), "{word}");
    }
  }

  #[test]
  fn functions() {
    assert_eq!(
      parse_filter("contains(name,'phone')").unwrap(),
      Predicate::Match {
        field: "name".into(),
        func:  TextMatch::Contains,
        value: "phone".into(),
      }
    );
    assert!(matches!(
      parse_filter("StartsWith( name , 'Mac' )").unwrap(),
      Predicate::Match { func: TextMatch::StartsWith, .. }
    ));
    assert!(matches!(
      parse_filter("endswith(sku,'-XL')").unwrap(),
      Predicate::Match { func: TextMatch::EndsWith, .. }
    ));
  }

  #[test]
  fn multibyte_literals_survive() {
    assert_eq!(
      parse_filter("contains(title,'全角テキスト')").unwrap(),
      Predicate::Match {
        field: "title".into(),
        func:  TextMatch::Contains,
        value: "全角テキスト".into(),
      }
    );
  }

  #[test]
  fn rejects_malformed_input() {
    assert_eq!(parse_filter("   "), Err(FilterParseError::Empty));
    assert!(matches!(
      parse_filter("price between 1"),
      Err(FilterParseError::UnknownOperator(_))
    ));
    assert!(matches!(
      parse_filter("matches(name,'x')"),
      Err(FilterParseError::UnknownFunction(_))
    ));
    assert!(matches!(
      parse_filter("name eq 'open"),
      Err(FilterParseError::UnterminatedString(_))
    ));
    assert!(matches!(
      parse_filter("contains(name,phone)"),
      Err(FilterParseError::ExpectedString(_))
    ));
    assert_eq!(parse_filter("price gt"), Err(FilterParseError::MissingValue));
    assert!(matches!(
      parse_filter("a eq 1 and b eq 2"),
      Err(FilterParseError::TrailingInput(_))
    ));
    assert!(parse_filter("%% ;; ))(( eq").is_err());
    assert!(parse_filter("1abc eq 2").is_err());
  }

  #[test]
  fn literal_scalars() {
    assert_eq!(Literal::Bare("42".into()).to_scalar(), Scalar::Integer(42));
    assert_eq!(Literal::Quoted("2.5".into()).to_scalar(), Scalar::Real(2.5));
    assert_eq!(Literal::Bare("true".into()).to_scalar(), Scalar::Integer(1));
    assert_eq!(
      Literal::Quoted("true".into()).to_scalar(),
      Scalar::Text("true".into())
    );
    assert_eq!(Literal::Bare("NaN".into()).as_number(), None);
  }

  #[test]
  fn like_patterns_escape_wildcards() {
    assert_eq!(TextMatch::Contains.like_pattern("phone"), "%phone%");
    assert_eq!(TextMatch::StartsWith.like_pattern("Mac"), "Mac%");
    assert_eq!(TextMatch::EndsWith.like_pattern("50%"), "%50\\%");
    assert_eq!(TextMatch::Contains.like_pattern("a_b"), "%a\\_b%");
  }
}

use serde::Serialize;

use crate::{query::compiler::operator::Operator, util};

use super::operator::parse_operator;

/// Marks the position of a bound value in predicate sql, numbered when the statement is assembled.
pub const PLACEHOLDER: char = '?';

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

/// A single where condition with one bound value per placeholder.
#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

impl Predicate {
    pub fn new(sql: impl Into<String>, values: Vec<SqlValue>) -> Predicate {
        Predicate {
            sql: sql.into(),
            values,
        }
    }

    /// A condition without bound values.
    pub fn raw(sql: impl Into<String>) -> Predicate {
        Predicate::new(sql, Vec::new())
    }

    pub fn negate(self) -> Predicate {
        Predicate {
            sql: format!("NOT ({})", self.sql),
            values: self.values,
        }
    }

    pub fn placeholder_count(&self) -> usize {
        self.sql.chars().filter(|c| *c == PLACEHOLDER).count()
    }
}

/// How the value of numeric comparisons is parsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumberKind {
    Int,
    Float,
}

impl NumberKind {
    pub fn parse(&self, s: &str) -> Option<SqlValue> {
        let s = s.trim();
        match self {
            NumberKind::Int => s.parse::<i64>().ok().map(SqlValue::Int),
            NumberKind::Float => s
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(SqlValue::Float),
        }
    }
}

/// Which sides of a LIKE pattern receive an implicit wildcard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LikeWrap {
    None,
    Leading,
    Trailing,
    Both,
}

pub fn equals(column: &str, value: impl Into<SqlValue>) -> Predicate {
    Predicate::new(format!("{column} = ?"), vec![value.into()])
}

pub fn array_contains(column: &str, value: impl Into<SqlValue>) -> Predicate {
    Predicate::new(format!("{column} @> ARRAY[?]"), vec![value.into()])
}

/// Returns `None` for an empty pattern, which would match everything.
pub fn like_match(
    column: &str,
    pattern: &str,
    wrap: LikeWrap,
    wildcard_character: char,
) -> Option<Predicate> {
    if pattern.is_empty() {
        return None;
    }

    let escaped = util::parse_wildcards(pattern, wildcard_character);
    let value = match wrap {
        LikeWrap::None => escaped,
        LikeWrap::Leading => format!("%{escaped}"),
        LikeWrap::Trailing => format!("{escaped}%"),
        LikeWrap::Both => format!("%{escaped}%"),
    };
    Some(Predicate::new(
        format!("{column} LIKE ?"),
        vec![SqlValue::Text(value)],
    ))
}

/// Comparison predicate for a token such as `>=5` or `1..10`, `None` if the operands are not numbers of `kind`.
pub fn with_operator(column: &str, token: &str, kind: NumberKind) -> Option<Predicate> {
    let operator = parse_operator(token);
    match operator {
        Operator::Range(low, high) => Some(Predicate::new(
            format!("{column} BETWEEN ? AND ?"),
            vec![kind.parse(low)?, kind.parse(high)?],
        )),
        Operator::Eq(value)
        | Operator::Gt(value)
        | Operator::Gte(value)
        | Operator::Lt(value)
        | Operator::Lte(value) => Some(Predicate::new(
            format!("{column} {} ?", operator.sql_operator()),
            vec![kind.parse(value)?],
        )),
    }
}

/// Presence check for nullable columns.
pub fn is_null(column: &str, null: bool) -> Predicate {
    if null {
        Predicate::raw(format!("{column} IS NULL"))
    } else {
        Predicate::raw(format!("{column} IS NOT NULL"))
    }
}

/// Presence check for array columns, empty arrays have no dimensions.
pub fn array_is_empty(column: &str, empty: bool) -> Predicate {
    is_null(&format!("array_dims({column})"), empty)
}

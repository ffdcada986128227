//! SQLite processor set: compiles a [`Condition`] into a `WHERE` fragment
//! over a JSON text column.
//!
//! Field paths and literals are always bound as parameters. Every leaf is
//! wrapped in `COALESCE(.., 0)` so that negation never meets SQL `NULL`,
//! which keeps `$ne`/`$nin`/`$nor` matching missing fields the way MongoDB
//! does. Type guards (`json_type`) stop SQLite's cross-type ordering from
//! matching values MongoDB would not compare.
//!
//! Not supported here: `$regex` (SQLite has no built-in regex function),
//! array-valued fields, and document or array literals.

use bson::Bson;
use rusqlite::types::Value as SqlValue;

use super::{Combinator, Condition, Leaf, Operator};
use crate::error::ConditionError;

/// A compiled `WHERE` fragment with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl SqlFragment {
    fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    fn constant(value: bool) -> Self {
        Self::new(if value { "1" } else { "0" }, Vec::new())
    }
}

// ============================================================================
// Literal helpers
// ============================================================================

fn scalar(leaf: &Leaf, value: &Bson) -> Result<SqlValue, ConditionError> {
    match value {
        Bson::Int32(i) => Ok(SqlValue::Integer(i64::from(*i))),
        Bson::Int64(i) => Ok(SqlValue::Integer(*i)),
        Bson::Double(d) => Ok(SqlValue::Real(*d)),
        Bson::String(s) => Ok(SqlValue::Text(s.clone())),
        Bson::Boolean(b) => Ok(SqlValue::Integer(i64::from(*b))),
        _ => Err(leaf.unsupported()),
    }
}

/// `json_type` values accepted for a literal's type bracket.
fn type_guard(value: &Bson) -> &'static str {
    match value {
        Bson::String(_) => "('text')",
        Bson::Boolean(_) => "('true', 'false')",
        _ => "('integer', 'real')",
    }
}

struct LeafSql<'a> {
    column: &'a str,
    path: String,
    params: Vec<SqlValue>,
}

impl<'a> LeafSql<'a> {
    fn new(column: &'a str, leaf: &Leaf) -> Self {
        Self {
            column,
            path: format!("$.{}", leaf.field),
            params: Vec::new(),
        }
    }

    fn extract(&mut self) -> String {
        self.params.push(SqlValue::Text(self.path.clone()));
        format!("json_extract({}, ?)", self.column)
    }

    fn json_type(&mut self) -> String {
        self.params.push(SqlValue::Text(self.path.clone()));
        format!("json_type({}, ?)", self.column)
    }

    fn bind(&mut self, value: SqlValue) -> &'static str {
        self.params.push(value);
        "?"
    }

    /// Equality against one literal, not yet wrapped.
    fn equals(&mut self, leaf: &Leaf, literal: &Bson) -> Result<String, ConditionError> {
        Ok(match literal {
            Bson::Null => {
                let t1 = self.json_type();
                let t2 = self.json_type();
                format!("({t1} IS NULL OR {t2} = 'null')")
            }
            Bson::Boolean(b) => {
                let t = self.json_type();
                format!("{t} = '{b}'")
            }
            other => {
                let value = scalar(leaf, other)?;
                let t = self.json_type();
                let guard = type_guard(other);
                let e = self.extract();
                let p = self.bind(value);
                format!("({t} IN {guard} AND {e} = {p})")
            }
        })
    }

    fn finish(self, expr: String) -> SqlFragment {
        SqlFragment::new(format!("COALESCE({expr}, 0)"), self.params)
    }
}

// ============================================================================
// Processors
// ============================================================================

/// Map one leaf to a fragment over `column`.
pub fn leaf_processor(column: &str, leaf: &Leaf) -> Result<SqlFragment, ConditionError> {
    let mut q = LeafSql::new(column, leaf);
    let expr = match leaf.operator {
        Operator::Eq => q.equals(leaf, &leaf.value)?,
        Operator::Ne => format!("NOT COALESCE({}, 0)", q.equals(leaf, &leaf.value)?),
        op @ (Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte) => {
            let value = scalar(leaf, &leaf.value)?;
            let t = q.json_type();
            let guard = type_guard(&leaf.value);
            let e = q.extract();
            let p = q.bind(value);
            let sym = match op {
                Operator::Gt => ">",
                Operator::Gte => ">=",
                Operator::Lt => "<",
                _ => "<=",
            };
            format!("({t} IN {guard} AND {e} {sym} {p})")
        }
        Operator::In | Operator::Nin => {
            let Bson::Array(items) = &leaf.value else {
                return Err(leaf.unsupported());
            };
            let mut alternatives = Vec::with_capacity(items.len());
            for item in items {
                alternatives.push(format!("COALESCE({}, 0)", q.equals(leaf, item)?));
            }
            let any = if alternatives.is_empty() {
                "0".to_string()
            } else {
                format!("({})", alternatives.join(" OR "))
            };
            if leaf.operator == Operator::Nin {
                format!("NOT {any}")
            } else {
                any
            }
        }
        Operator::Prefix => {
            let Bson::String(prefix) = &leaf.value else {
                return Err(leaf.unsupported());
            };
            let t = q.json_type();
            let e = q.extract();
            let len = q.bind(SqlValue::Integer(prefix.chars().count() as i64));
            let p = q.bind(SqlValue::Text(prefix.clone()));
            format!("({t} = 'text' AND substr({e}, 1, {len}) = {p})")
        }
        Operator::Exists => {
            let t = q.json_type();
            if matches!(leaf.value, Bson::Boolean(true)) {
                format!("{t} IS NOT NULL")
            } else {
                format!("{t} IS NULL")
            }
        }
        Operator::Regex => {
            return Err(ConditionError::UnsupportedOperator {
                operator: leaf.operator.as_str(),
                backend: "sqlite",
            })
        }
    };
    Ok(q.finish(expr))
}

/// Fold child fragments; parameters keep child order.
pub fn branch_processor(
    combinator: Combinator,
    children: Vec<SqlFragment>,
) -> Result<SqlFragment, ConditionError> {
    if children.is_empty() {
        return Ok(SqlFragment::constant(combinator.empty_value()));
    }
    let joiner = match combinator {
        Combinator::And => " AND ",
        Combinator::Or | Combinator::Nor => " OR ",
    };
    let mut parts = Vec::with_capacity(children.len());
    let mut params = Vec::new();
    for child in children {
        parts.push(child.sql);
        params.extend(child.params);
    }
    let joined = format!("({})", parts.join(joiner));
    let sql = if combinator == Combinator::Nor {
        format!("NOT {joined}")
    } else {
        joined
    };
    Ok(SqlFragment::new(sql, params))
}

/// Compile a condition into a fragment over the JSON text `column`.
pub fn compile(condition: &Condition, column: &str) -> Result<SqlFragment, ConditionError> {
    condition.combine(|leaf| leaf_processor(column, leaf), branch_processor)
}

// ============================================================================
// Tests
// ============================================================================

//! In-memory processor set: compiles a [`Condition`] into a predicate closure.
//!
//! Follows MongoDB query semantics so that the in-memory backend selects the
//! same documents a MongoDB server would:
//!
//! - a missing field equals `null`;
//! - an array field matches when any element matches (array lifting), and an
//!   equality literal may also match the whole array;
//! - ordering operators only compare values within one type bracket
//!   (numbers of any width form a single bracket), and NaN satisfies none
//!   of them.

use std::cmp::Ordering;
use std::sync::Arc;

use bson::{Bson, Document};
use regex::Regex;

use super::{Combinator, Condition, Leaf, Operator};
use crate::document::{compare_values, get_path, is_nan, type_rank, values_equal};
use crate::error::ConditionError;

/// Compiled predicate. Cheap to clone and safe to share across threads.
pub type Predicate = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

// ============================================================================
// Scalar Evaluation
// ============================================================================

fn eq_matches(value: Option<&Bson>, literal: &Bson) -> bool {
    match value {
        None => matches!(literal, Bson::Null),
        Some(whole @ Bson::Array(items)) => {
            items.iter().any(|item| values_equal(item, literal)) || values_equal(whole, literal)
        }
        Some(v) => values_equal(v, literal),
    }
}

fn ordering_holds(op: Operator, ord: Ordering) -> bool {
    match op {
        Operator::Gt => ord == Ordering::Greater,
        Operator::Gte => ord != Ordering::Less,
        Operator::Lt => ord == Ordering::Less,
        Operator::Lte => ord != Ordering::Greater,
        _ => false,
    }
}

/// NaN never satisfies a range; NaN literals are rejected by validation.
fn scalar_ordering(value: &Bson, op: Operator, literal: &Bson) -> bool {
    if type_rank(value) != type_rank(literal) || is_nan(value) {
        return false;
    }
    ordering_holds(op, compare_values(value, literal))
}

fn ordering_matches(value: Option<&Bson>, op: Operator, literal: &Bson) -> bool {
    match value {
        None => false,
        Some(Bson::Array(items)) => items.iter().any(|item| scalar_ordering(item, op, literal)),
        Some(v) => scalar_ordering(v, op, literal),
    }
}

fn string_matches(value: Option<&Bson>, test: impl Fn(&str) -> bool) -> bool {
    match value {
        Some(Bson::String(s)) => test(s),
        Some(Bson::Array(items)) => items.iter().any(|item| match item {
            Bson::String(s) => test(s),
            _ => false,
        }),
        _ => false,
    }
}

// ============================================================================
// Processors
// ============================================================================

/// Map one leaf to a predicate. Regex patterns are compiled here, once.
pub fn leaf_processor(leaf: &Leaf) -> Result<Predicate, ConditionError> {
    let field = leaf.field.clone();
    let literal = leaf.value.clone();
    let predicate: Predicate = match leaf.operator {
        Operator::Eq => Arc::new(move |doc: &Document| eq_matches(get_path(doc, &field), &literal)),
        Operator::Ne => Arc::new(move |doc: &Document| !eq_matches(get_path(doc, &field), &literal)),
        op @ (Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte) => {
            Arc::new(move |doc: &Document| ordering_matches(get_path(doc, &field), op, &literal))
        }
        Operator::In | Operator::Nin => {
            let Bson::Array(items) = literal else {
                return Err(leaf.unsupported());
            };
            let negate = leaf.operator == Operator::Nin;
            Arc::new(move |doc: &Document| {
                let value = get_path(doc, &field);
                items.iter().any(|item| eq_matches(value, item)) != negate
            })
        }
        Operator::Regex => {
            let Bson::String(pattern) = &literal else {
                return Err(leaf.unsupported());
            };
            let re = Regex::new(pattern).map_err(|e| ConditionError::InvalidRegex {
                field: field.clone(),
                message: e.to_string(),
            })?;
            Arc::new(move |doc: &Document| string_matches(get_path(doc, &field), |s| re.is_match(s)))
        }
        Operator::Prefix => {
            let Bson::String(prefix) = literal else {
                return Err(leaf.unsupported());
            };
            Arc::new(move |doc: &Document| {
                string_matches(get_path(doc, &field), |s| s.starts_with(prefix.as_str()))
            })
        }
        Operator::Exists => {
            let want = matches!(literal, Bson::Boolean(true));
            Arc::new(move |doc: &Document| get_path(doc, &field).is_some() == want)
        }
    };
    Ok(predicate)
}

/// Fold child predicates. Empty children follow the table in the parent
/// module: `all` of nothing is true, `any` of nothing is false.
pub fn branch_processor(
    combinator: Combinator,
    children: Vec<Predicate>,
) -> Result<Predicate, ConditionError> {
    let predicate: Predicate = match combinator {
        Combinator::And => Arc::new(move |doc: &Document| children.iter().all(|p| p(doc))),
        Combinator::Or => Arc::new(move |doc: &Document| children.iter().any(|p| p(doc))),
        Combinator::Nor => Arc::new(move |doc: &Document| !children.iter().any(|p| p(doc))),
    };
    Ok(predicate)
}

/// Compile a condition into a reusable predicate.
pub fn compile(condition: &Condition) -> Result<Predicate, ConditionError> {
    condition.combine(leaf_processor, branch_processor)
}

// ============================================================================
// Tests
// ============================================================================

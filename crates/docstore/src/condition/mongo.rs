//! MongoDB processor set: compiles a [`Condition`] into a filter document.

use bson::{doc, Bson, Document};
use regex::Regex;

use super::{Combinator, Condition, Leaf, Operator};
use crate::error::ConditionError;

/// Map one leaf to `{ field: { $op: value } }`.
///
/// Regex patterns are checked locally so a malformed pattern fails before
/// any request, as it does for the in-memory matcher.
pub fn leaf_processor(leaf: &Leaf) -> Result<Document, ConditionError> {
    let expr = match leaf.operator {
        Operator::Prefix => {
            let Bson::String(prefix) = &leaf.value else {
                return Err(leaf.unsupported());
            };
            doc! { "$regex": format!("^{}", regex::escape(prefix)) }
        }
        Operator::Regex => {
            let Bson::String(pattern) = &leaf.value else {
                return Err(leaf.unsupported());
            };
            Regex::new(pattern).map_err(|e| ConditionError::InvalidRegex {
                field: leaf.field.clone(),
                message: e.to_string(),
            })?;
            doc! { "$regex": pattern.as_str() }
        }
        op => doc! { op.as_str(): leaf.value.clone() },
    };
    Ok(doc! { leaf.field.as_str(): expr })
}

/// Fold compiled children into `{ $and | $or | $nor: [...] }`.
///
/// MongoDB rejects empty `$and`/`$or`/`$nor` arrays, so empty branches are
/// rewritten to constant filters: `{}` matches everything and
/// `{ _id: { $in: [] } }` matches nothing.
pub fn branch_processor(
    combinator: Combinator,
    children: Vec<Document>,
) -> Result<Document, ConditionError> {
    if children.is_empty() {
        return Ok(if combinator.empty_value() {
            Document::new()
        } else {
            doc! { "_id": { "$in": [] } }
        });
    }
    let children: Vec<Bson> = children.into_iter().map(Bson::Document).collect();
    Ok(doc! { combinator.as_str(): children })
}

/// Compile a condition into a MongoDB filter document.
pub fn compile(condition: &Condition) -> Result<Document, ConditionError> {
    condition.combine(leaf_processor, branch_processor)
}

/// Compile watch conditions into aggregation stages, one `$match` each.
pub fn compile_pipeline(conditions: &[Condition]) -> Result<Vec<Document>, ConditionError> {
    conditions
        .iter()
        .map(|c| compile(c).map(|filter| doc! { "$match": filter }))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

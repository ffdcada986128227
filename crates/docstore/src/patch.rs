//! Update documents: normalization and in-memory application.
//!
//! A patch either consists only of update operators (`{$set: {..}}`) or only
//! of plain fields, which are merged as a `$set`. Both forms are accepted by
//! every backend; mixing them is rejected before any I/O.

use bson::{Bson, Document};

use crate::condition::Condition;
use crate::document::{get_path, remove_path, set_path};
use crate::error::ValidationError;

/// Operators the in-memory backend knows how to apply.
pub const SUPPORTED_OPERATORS: [&str; 4] = ["$set", "$unset", "$inc", "$setOnInsert"];

/// Bring a caller-supplied patch into operator form.
pub fn normalize_patch(patch: Document) -> Result<Document, ValidationError> {
    if patch.is_empty() {
        return Err(ValidationError::InvalidPatch("patch is empty".into()));
    }
    let operators = patch.keys().filter(|k| k.starts_with('$')).count();
    if operators == 0 {
        let mut update = Document::new();
        update.insert("$set", patch);
        return Ok(update);
    }
    if operators != patch.len() {
        return Err(ValidationError::InvalidPatch(
            "update operators cannot be mixed with plain fields".into(),
        ));
    }
    for (op, fields) in &patch {
        if !matches!(fields, Bson::Document(_)) {
            return Err(ValidationError::InvalidPatch(format!(
                "operand of {op} must be a document"
            )));
        }
    }
    Ok(patch)
}

/// Reject operators [`apply_update`] cannot apply, before any document is
/// touched.
pub fn ensure_supported(update: &Document) -> Result<(), ValidationError> {
    match update.keys().find(|op| !SUPPORTED_OPERATORS.contains(&op.as_str())) {
        Some(op) => Err(ValidationError::UnsupportedUpdateOperator(op.clone())),
        None => Ok(()),
    }
}

/// Document inserted by an upsert before the update is applied: the
/// equality constraints of the condition.
pub fn upsert_seed(condition: &Condition) -> Document {
    let mut seed = Document::new();
    for (field, value) in condition.equality_fields() {
        set_path(&mut seed, field, value.clone());
    }
    seed
}

/// Apply a normalized update in place.
///
/// `inserting` enables `$setOnInsert` and allows `_id` to be assigned.
pub fn apply_update(
    doc: &mut Document,
    update: &Document,
    inserting: bool,
) -> Result<(), ValidationError> {
    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(ValidationError::InvalidPatch(format!(
                "operand of {op} must be a document"
            )));
        };
        match op.as_str() {
            "$set" => {
                for (path, value) in fields {
                    guard_id(doc, path, Some(value), inserting)?;
                    set_path(doc, path, value.clone());
                }
            }
            "$setOnInsert" if inserting => {
                for (path, value) in fields {
                    set_path(doc, path, value.clone());
                }
            }
            "$setOnInsert" => {}
            "$unset" => {
                for path in fields.keys() {
                    guard_id(doc, path, None, inserting)?;
                    remove_path(doc, path);
                }
            }
            "$inc" => {
                for (path, delta) in fields {
                    guard_id(doc, path, None, inserting)?;
                    let sum = increment(path, get_path(doc, path), delta)?;
                    set_path(doc, path, sum);
                }
            }
            other => return Err(ValidationError::UnsupportedUpdateOperator(other.to_string())),
        }
    }
    Ok(())
}

fn guard_id(
    doc: &Document,
    path: &str,
    value: Option<&Bson>,
    inserting: bool,
) -> Result<(), ValidationError> {
    if path != "_id" || inserting {
        return Ok(());
    }
    match (doc.get("_id"), value) {
        (Some(current), Some(next)) if current == next => Ok(()),
        _ => Err(ValidationError::InvalidPatch("_id is immutable".into())),
    }
}

fn increment(path: &str, current: Option<&Bson>, delta: &Bson) -> Result<Bson, ValidationError> {
    let not_numeric = || ValidationError::InvalidPatch(format!("$inc on non-numeric field {path}"));
    let current = current.cloned().unwrap_or(Bson::Int32(0));
    Ok(match (&current, delta) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a).wrapping_add(*b)),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.wrapping_add(i64::from(*b))),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.wrapping_add(*b)),
        _ => match (crate::document::as_f64(&current), crate::document::as_f64(delta)) {
            (Some(a), Some(b)) => Bson::Double(a + b),
            _ => return Err(not_numeric()),
        },
    })
}

// ============================================================================
// Tests
// ============================================================================

//! Scan helpers: sorting, pagination, projection and unique-key checks.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use bson::{Bson, Document};

use crate::document::{compare_values, get_path, remove_path, set_path, values_equal};
use crate::error::ValidationError;
use crate::types::{Index, SortDirection, SortEntry};

// ============================================================================
// Sorting
// ============================================================================

/// Sort documents by multiple fields with cascading priority.
/// The sort is stable: ties keep insertion order.
pub fn sort_documents(docs: &mut [Document], sort: &[SortEntry]) {
    if sort.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for entry in sort {
            let va = get_path(a, &entry.field).unwrap_or(&Bson::Null);
            let vb = get_path(b, &entry.field).unwrap_or(&Bson::Null);
            let cmp = compare_values(va, vb);
            if cmp != Ordering::Equal {
                return match entry.direction {
                    SortDirection::Desc => cmp.reverse(),
                    SortDirection::Asc => cmp,
                };
            }
        }
        Ordering::Equal
    });
}

// ============================================================================
// Pagination
// ============================================================================

/// Skip `start` documents, then take at most `limit` (`0` means no limit).
pub fn paginate(docs: Vec<Document>, start: u64, limit: u64) -> Vec<Document> {
    let skip = usize::try_from(start).unwrap_or(usize::MAX);
    let take = match limit {
        0 => usize::MAX,
        n => usize::try_from(n).unwrap_or(usize::MAX),
    };
    docs.into_iter().skip(skip).take(take).collect()
}

// ============================================================================
// Projection
// ============================================================================

/// Apply an inclusion or exclusion projection.
///
/// Inclusion keeps `_id` unless it is excluded explicitly. Mixing inclusion
/// and exclusion of fields other than `_id` is rejected, as MongoDB does.
pub fn project(
    doc: Document,
    projection: &BTreeMap<String, bool>,
) -> Result<Document, ValidationError> {
    if projection.is_empty() {
        return Ok(doc);
    }
    let includes: Vec<&str> = projection
        .iter()
        .filter(|(k, v)| **v && k.as_str() != "_id")
        .map(|(k, _)| k.as_str())
        .collect();
    let excludes_other = projection.iter().any(|(k, v)| !*v && k != "_id");
    if !includes.is_empty() && excludes_other {
        return Err(ValidationError::InvalidOptions(
            "projection cannot mix inclusion and exclusion".into(),
        ));
    }
    let keep_id = projection.get("_id").copied().unwrap_or(true);

    if includes.is_empty() {
        let mut out = doc;
        for (path, include) in projection {
            if !include {
                remove_path(&mut out, path);
            }
        }
        return Ok(out);
    }

    let mut out = Document::new();
    if keep_id {
        if let Some(id) = doc.get("_id") {
            out.insert("_id", id.clone());
        }
    }
    for path in includes {
        if let Some(value) = get_path(&doc, path) {
            set_path(&mut out, path, value.clone());
        }
    }
    Ok(out)
}

// ============================================================================
// Unique Keys
// ============================================================================

fn index_key(doc: &Document, index: &Index) -> Bson {
    Bson::Array(
        index
            .keys
            .iter()
            .map(|k| get_path(doc, &k.field).cloned().unwrap_or(Bson::Null))
            .collect(),
    )
}

/// Name of the first unique index that `docs` violate, if any.
pub fn find_duplicate<'a>(docs: &[Document], indexes: &'a [Index]) -> Option<&'a str> {
    for index in indexes.iter().filter(|i| i.unique) {
        let mut keys: Vec<Bson> = docs.iter().map(|d| index_key(d, index)).collect();
        keys.sort_by(compare_values);
        if keys.windows(2).any(|w| values_equal(&w[0], &w[1])) {
            return Some(&index.name);
        }
    }
    None
}

// ============================================================================
// Tests
// ============================================================================

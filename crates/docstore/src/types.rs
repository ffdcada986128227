//! Plain value types shared by every backend: indexes and find options.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// ============================================================================
// Sort Types
// ============================================================================

/// Sort direction for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// MongoDB's numeric spelling: `1` ascending, `-1` descending.
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// A sort specification for a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortEntry {
    pub field: String,
    pub direction: SortDirection,
}

impl SortEntry {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

// ============================================================================
// Index Types
// ============================================================================

/// A single key of a (possibly compound) index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexField {
    pub field: String,
    pub order: SortDirection,
}

impl IndexField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortDirection::Desc,
        }
    }
}

/// Named index over one or more fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub keys: Vec<IndexField>,
    #[serde(default)]
    pub unique: bool,
    /// Build without blocking other operations (a hint; backends may ignore it).
    #[serde(default)]
    pub background: bool,
}

impl Index {
    /// Build a validated index description.
    pub fn new(
        name: impl Into<String>,
        keys: impl IntoIterator<Item = IndexField>,
    ) -> Result<Self, ValidationError> {
        let index = Self {
            name: name.into(),
            keys: keys.into_iter().collect(),
            unique: false,
            background: false,
        };
        index.validate()?;
        Ok(index)
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    /// Checked again by every `create_index` before any I/O, since the
    /// fields are public.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyIndexName);
        }
        if self.keys.is_empty() || self.keys.iter().any(|k| k.field.is_empty()) {
            return Err(ValidationError::EmptyIndexKeys(self.name.clone()));
        }
        Ok(())
    }
}

// ============================================================================
// Find Options
// ============================================================================

/// Options accumulated by a `Finder`. Zero and empty values mean "unset".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FindOptions {
    /// Field path to include (`true`) or exclude (`false`).
    pub projection: BTreeMap<String, bool>,
    /// Ordered sort keys; earlier entries take precedence.
    pub sort: Vec<SortEntry>,
    /// Number of matches to skip.
    pub start: u64,
    /// Maximum number of matches to return.
    pub limit: u64,
}

// ============================================================================
// Tests
// ============================================================================

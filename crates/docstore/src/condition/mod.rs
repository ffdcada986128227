//! Backend-independent predicate trees.
//!
//! A [`Condition`] is compiled on demand with [`Condition::combine`], which
//! takes a *leaf processor* and a *branch processor* supplied by a backend.
//! The tree itself knows nothing about any backend's filter syntax.
//!
//! # Empty branches
//!
//! A branch without children compiles to a defined constant:
//!
//! | combinator | result       |
//! |------------|--------------|
//! | `And`      | always true  |
//! | `Or`       | always false |
//! | `Nor`      | always true  |
//!
//! Every processor set in this crate implements exactly this table.
//!
//! # Modules
//!
//! - [`mongo`]: MongoDB filter documents.
//! - [`matcher`]: in-memory predicate closures.
//! - `sql`: SQLite `WHERE` fragments (feature `sqlite`).

pub mod matcher;
pub mod mongo;
#[cfg(feature = "sqlite")]
pub mod sql;

use std::fmt;

use bson::Bson;

use crate::document::{is_nan, type_name};
use crate::error::ConditionError;

// ============================================================================
// Operators
// ============================================================================

/// Comparison applied by a leaf node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Field value is one of the values in an array literal.
    In,
    /// Field value is none of the values in an array literal.
    Nin,
    Regex,
    /// String field starts with the literal (no pattern syntax).
    Prefix,
    /// Field presence; the literal is a boolean.
    Exists,
}

impl Operator {
    /// The operator's name in MongoDB filter syntax.
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::In => "$in",
            Operator::Nin => "$nin",
            Operator::Regex => "$regex",
            Operator::Prefix => "$prefix",
            Operator::Exists => "$exists",
        }
    }

    fn is_ordering(self) -> bool {
        matches!(self, Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean combinator applied by a branch node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combinator {
    And,
    Or,
    Nor,
}

impl Combinator {
    pub fn as_str(self) -> &'static str {
        match self {
            Combinator::And => "$and",
            Combinator::Or => "$or",
            Combinator::Nor => "$nor",
        }
    }

    /// Value of this combinator applied to zero children.
    pub fn empty_value(self) -> bool {
        match self {
            Combinator::And | Combinator::Nor => true,
            Combinator::Or => false,
        }
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// A single comparison: `field <operator> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    /// Dot-separated field path.
    pub field: String,
    pub operator: Operator,
    pub value: Bson,
}

impl Leaf {
    /// Check that the literal is usable with the operator.
    pub fn validate(&self) -> Result<(), ConditionError> {
        if self.field.is_empty() {
            return Err(ConditionError::EmptyField);
        }
        let accepted = match self.operator {
            Operator::Eq | Operator::Ne => true,
            Operator::In | Operator::Nin => matches!(self.value, Bson::Array(_)),
            Operator::Regex | Operator::Prefix => matches!(self.value, Bson::String(_)),
            Operator::Exists => matches!(self.value, Bson::Boolean(_)),
            op if op.is_ordering() => {
                !matches!(self.value, Bson::Array(_) | Bson::Document(_) | Bson::Null)
                    && !is_nan(&self.value)
            }
            _ => true,
        };
        if accepted {
            Ok(())
        } else {
            Err(self.unsupported())
        }
    }

    pub(crate) fn unsupported(&self) -> ConditionError {
        ConditionError::UnsupportedValue {
            field: self.field.clone(),
            operator: self.operator.as_str(),
            found: type_name(&self.value),
        }
    }
}

/// A boolean combination of child conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub combinator: Combinator,
    pub children: Vec<Condition>,
}

/// Recursive predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Leaf(Leaf),
    Branch(Branch),
}

impl Default for Condition {
    fn default() -> Self {
        Self::always()
    }
}

// ============================================================================
// Construction
// ============================================================================

impl Condition {
    pub fn leaf(field: impl Into<String>, operator: Operator, value: impl Into<Bson>) -> Self {
        Condition::Leaf(Leaf {
            field: field.into(),
            operator,
            value: value.into(),
        })
    }

    pub fn branch(combinator: Combinator, children: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Branch(Branch {
            combinator,
            children: children.into_iter().collect(),
        })
    }

    /// Matches every document (an empty `And`).
    pub fn always() -> Self {
        Self::branch(Combinator::And, Vec::new())
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::leaf(field, Operator::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::leaf(field, Operator::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::leaf(field, Operator::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::leaf(field, Operator::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::leaf(field, Operator::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::leaf(field, Operator::Lte, value)
    }

    pub fn in_set<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        Self::leaf(field, Operator::In, values)
    }

    pub fn not_in<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        Self::leaf(field, Operator::Nin, values)
    }

    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::leaf(field, Operator::Regex, pattern.into())
    }

    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::leaf(field, Operator::Prefix, prefix.into())
    }

    pub fn exists(field: impl Into<String>, present: bool) -> Self {
        Self::leaf(field, Operator::Exists, present)
    }

    pub fn and(children: impl IntoIterator<Item = Condition>) -> Self {
        Self::branch(Combinator::And, children)
    }

    pub fn or(children: impl IntoIterator<Item = Condition>) -> Self {
        Self::branch(Combinator::Or, children)
    }

    pub fn nor(children: impl IntoIterator<Item = Condition>) -> Self {
        Self::branch(Combinator::Nor, children)
    }
}

// ============================================================================
// Compilation
// ============================================================================

impl Condition {
    /// Compile the tree bottom-up.
    ///
    /// `leaf` maps one leaf node to a native fragment; `branch` folds a
    /// combinator and its compiled children (in order) into a fragment.
    /// Leaves are validated before `leaf` sees them, so processors may assume
    /// well-typed literals. The first error aborts compilation.
    pub fn combine<T, E, L, B>(&self, leaf: L, branch: B) -> Result<T, E>
    where
        L: Fn(&Leaf) -> Result<T, E>,
        B: Fn(Combinator, Vec<T>) -> Result<T, E>,
        E: From<ConditionError>,
    {
        self.combine_with(&leaf, &branch)
    }

    fn combine_with<T, E, L, B>(&self, leaf: &L, branch: &B) -> Result<T, E>
    where
        L: Fn(&Leaf) -> Result<T, E>,
        B: Fn(Combinator, Vec<T>) -> Result<T, E>,
        E: From<ConditionError>,
    {
        match self {
            Condition::Leaf(node) => {
                node.validate()?;
                leaf(node)
            }
            Condition::Branch(node) => {
                let children = node
                    .children
                    .iter()
                    .map(|child| child.combine_with(leaf, branch))
                    .collect::<Result<Vec<_>, E>>()?;
                branch(node.combinator, children)
            }
        }
    }

    /// Validate every leaf without compiling.
    pub fn validate(&self) -> Result<(), ConditionError> {
        self.combine(|leaf| leaf.validate(), |_, _| Ok(()))
    }

    /// Equality constraints that hold for every match: top-level `Eq`
    /// leaves, descending through `And` branches only.
    ///
    /// Used to seed the document inserted by an upsert.
    pub fn equality_fields(&self) -> Vec<(&str, &Bson)> {
        let mut out = Vec::new();
        self.collect_equalities(&mut out);
        out
    }

    fn collect_equalities<'a>(&'a self, out: &mut Vec<(&'a str, &'a Bson)>) {
        match self {
            Condition::Leaf(Leaf {
                field,
                operator: Operator::Eq,
                value,
            }) => out.push((field.as_str(), value)),
            Condition::Leaf(_) => {}
            Condition::Branch(Branch {
                combinator: Combinator::And,
                children,
            }) => {
                for child in children {
                    child.collect_equalities(out);
                }
            }
            Condition::Branch(_) => {}
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Backend capability traits.
//!
//! A backend implements [`Database`] and a cheap, cloneable [`Table`] handle.
//! `Table` is split into the capabilities the builders need:
//! [`FindExecutor`] runs a finished find/count, [`ChangeSource`] opens a
//! native change feed. [`Finder`] and [`Watcher`] are generic over those two
//! traits, so they contain no backend code.
//!
//! Every I/O method takes a [`Context`]; when it fires first the call fails
//! with `StorageError::Cancelled` or `StorageError::DeadlineExceeded`.

use async_trait::async_trait;
use bson::Document;

use crate::condition::Condition;
use crate::context::Context;
use crate::error::Result;
use crate::finder::Finder;
use crate::types::{FindOptions, Index};
use crate::watch::{Namespace, WatchOptions, Watcher};

// ============================================================================
// Database
// ============================================================================

#[async_trait]
pub trait Database: Send + Sync {
    type Table: Table;

    /// Round-trip to the server.
    async fn ping(&self, ctx: &Context) -> Result<()>;

    async fn has_table(&self, ctx: &Context, name: &str) -> Result<bool>;

    async fn list_table_names(&self, ctx: &Context) -> Result<Vec<String>>;

    async fn create_table(&self, ctx: &Context, name: &str) -> Result<()>;

    async fn drop_table(&self, ctx: &Context, name: &str) -> Result<()>;

    /// Handle to a table. No I/O; the table need not exist yet.
    fn table(&self, name: &str) -> Self::Table;

    /// Disconnect. Open change feeds end with an error event.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// Capabilities used by the builders
// ============================================================================

#[async_trait]
pub trait FindExecutor: Send + Sync + 'static {
    fn table_name(&self) -> &str;

    /// Matching documents after projection, sort and pagination.
    async fn execute_find(
        &self,
        ctx: &Context,
        condition: &Condition,
        options: &FindOptions,
    ) -> Result<Vec<Document>>;

    /// Number of matching documents; pagination does not apply.
    async fn execute_count(&self, ctx: &Context, condition: &Condition) -> Result<u64>;
}

#[async_trait]
pub trait ChangeSource: Send + Sync + 'static {
    type Cursor: ChangeCursor;

    /// Database and collection the feed belongs to.
    fn namespace(&self) -> Namespace;

    /// Open a feed. Each condition becomes one filter stage.
    async fn open_changes(
        &self,
        ctx: &Context,
        conditions: &[Condition],
        options: &WatchOptions,
    ) -> Result<Self::Cursor>;
}

/// A native change feed. Records are MongoDB-shaped change documents.
#[async_trait]
pub trait ChangeCursor: Send + 'static {
    /// Wait for the next record. `Ok(None)` means the feed ended cleanly.
    async fn next_change(&mut self) -> Result<Option<Document>>;

    /// Release server-side resources. Safe to call more than once.
    async fn close(&mut self);
}

// ============================================================================
// Table
// ============================================================================

#[async_trait]
pub trait Table: FindExecutor + ChangeSource + Clone {
    fn name(&self) -> &str {
        self.table_name()
    }

    /// Fails with a validation error, before any I/O, for an empty name or
    /// key list.
    async fn create_index(&self, ctx: &Context, index: Index) -> Result<()>;

    async fn drop_index(&self, ctx: &Context, name: &str) -> Result<()>;

    async fn has_index(&self, ctx: &Context, name: &str) -> Result<bool>;

    async fn indexes(&self, ctx: &Context) -> Result<Vec<Index>>;

    /// Insert all documents; returns how many were inserted.
    async fn insert(&self, ctx: &Context, docs: Vec<Document>) -> Result<usize>;

    /// Apply `patch` to the first match, if any.
    async fn update(&self, ctx: &Context, condition: &Condition, patch: Document) -> Result<()>;

    /// Apply `patch` to every match; returns the number matched.
    async fn update_many(
        &self,
        ctx: &Context,
        condition: &Condition,
        patch: Document,
    ) -> Result<u64>;

    /// Update the first match, or insert the condition's equality fields
    /// merged with `patch` when nothing matches.
    async fn upsert(&self, ctx: &Context, condition: &Condition, patch: Document) -> Result<()>;

    /// Delete every match; returns the number deleted.
    async fn delete(&self, ctx: &Context, condition: &Condition) -> Result<u64>;

    fn find(&self, condition: Condition) -> Finder<Self> {
        Finder::new(self.clone(), condition)
    }

    fn watch(&self, conditions: Vec<Condition>) -> Watcher<Self> {
        Watcher::new(self.clone(), conditions)
    }
}

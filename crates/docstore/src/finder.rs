//! Query builder over any [`FindExecutor`].

use bson::Document;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::condition::Condition;
use crate::context::Context;
use crate::driver::FindExecutor;
use crate::error::{Result, StorageError};
use crate::types::{FindOptions, SortEntry};

/// Accumulates projection, sort and pagination for one condition.
///
/// Setters replace the previous value. Terminal operations consume the
/// builder, so each finder executes at most once.
#[derive(Debug, Clone)]
pub struct Finder<E> {
    executor: E,
    condition: Condition,
    options: FindOptions,
}

impl<E: FindExecutor> Finder<E> {
    pub fn new(executor: E, condition: Condition) -> Self {
        Self {
            executor,
            condition,
            options: FindOptions::default(),
        }
    }

    /// Field paths to include (`true`) or exclude (`false`).
    pub fn with_projection<I, K>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<String>,
    {
        self.options.projection = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self
    }

    pub fn with_sort(mut self, sort: impl IntoIterator<Item = SortEntry>) -> Self {
        self.options.sort = sort.into_iter().collect();
        self
    }

    pub fn with_start(mut self, start: u64) -> Self {
        self.options.start = start;
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.options.limit = limit;
        self
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn options(&self) -> &FindOptions {
        &self.options
    }

    /// First match. Zero matches is [`StorageError::NotFound`].
    pub async fn one(mut self, ctx: &Context) -> Result<Document> {
        self.options.limit = 1;
        let table = self.executor.table_name().to_string();
        debug!(table = %table, operation = "find_one", "executing finder");
        let docs = self
            .executor
            .execute_find(ctx, &self.condition, &self.options)
            .await?;
        docs.into_iter()
            .next()
            .ok_or(StorageError::NotFound { table })
    }

    /// Every match; zero matches is an empty vec.
    pub async fn all(self, ctx: &Context) -> Result<Vec<Document>> {
        debug!(
            table = self.executor.table_name(),
            operation = "find",
            start = self.options.start,
            limit = self.options.limit,
            "executing finder"
        );
        self.executor
            .execute_find(ctx, &self.condition, &self.options)
            .await
    }

    /// Number of matches. Projection, sort and pagination are ignored.
    pub async fn count(self, ctx: &Context) -> Result<u64> {
        debug!(table = self.executor.table_name(), operation = "count", "executing finder");
        self.executor.execute_count(ctx, &self.condition).await
    }

    /// [`Finder::one`] decoded into `T`.
    pub async fn one_as<T: DeserializeOwned>(self, ctx: &Context) -> Result<T> {
        decode(self.one(ctx).await?)
    }

    /// [`Finder::all`] decoded into `T`.
    pub async fn all_as<T: DeserializeOwned>(self, ctx: &Context) -> Result<Vec<T>> {
        self.all(ctx).await?.into_iter().map(decode).collect()
    }
}

fn decode<T: DeserializeOwned>(doc: Document) -> Result<T> {
    bson::from_document(doc).map_err(|e| StorageError::Decode(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================

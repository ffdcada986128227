use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};
use mongodb::options::{
    ChangeStreamOptions, FindOptions as DriverFindOptions, FullDocumentType, IndexOptions,
};
use mongodb::{Collection, Cursor, IndexModel};
use tracing::debug;

use super::cursor::MongoCursor;
use super::Shared;
use crate::condition::{mongo as filter, Condition};
use crate::context::Context;
use crate::driver::{ChangeSource, FindExecutor, Table};
use crate::error::{Result, StorageError, ValidationError};
use crate::patch::normalize_patch;
use crate::types::{FindOptions, Index, IndexField, SortDirection};
use crate::watch::{Namespace, WatchOptions};

/// Handle to one collection. Holds no server resources.
#[derive(Debug, Clone)]
pub struct MongoTable {
    shared: Arc<Shared>,
    name: String,
}

impl MongoTable {
    pub(super) fn new(shared: Arc<Shared>, name: &str) -> Self {
        Self {
            shared,
            name: name.to_string(),
        }
    }

    fn collection(&self) -> Collection<Document> {
        self.shared.database.collection(&self.name)
    }

    fn err(
        &self,
        operation: &'static str,
    ) -> impl FnOnce(mongodb::error::Error) -> StorageError + '_ {
        move |e| StorageError::execution(self.name.clone(), operation, e)
    }

    async fn drain(
        &self,
        operation: &'static str,
        mut cursor: Cursor<Document>,
    ) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        while cursor.advance().await.map_err(self.err(operation))? {
            docs.push(cursor.deserialize_current().map_err(self.err(operation))?);
        }
        Ok(docs)
    }
}

// ============================================================================
// Conversions
// ============================================================================

fn index_model(index: &Index) -> IndexModel {
    let mut keys = Document::new();
    for key in &index.keys {
        keys.insert(key.field.clone(), key.order.as_i32());
    }
    let mut options = IndexOptions::default();
    options.name = Some(index.name.clone());
    if index.unique {
        options.unique = Some(true);
    }
    if index.background {
        options.background = Some(true);
    }
    let mut model = IndexModel::default();
    model.keys = keys;
    model.options = Some(options);
    model
}

fn index_from_model(model: IndexModel) -> Index {
    let keys = model
        .keys
        .iter()
        .map(|(field, order)| IndexField {
            field: field.clone(),
            order: match order {
                Bson::Int32(n) if *n < 0 => SortDirection::Desc,
                Bson::Int64(n) if *n < 0 => SortDirection::Desc,
                Bson::Double(n) if *n < 0.0 => SortDirection::Desc,
                _ => SortDirection::Asc,
            },
        })
        .collect();
    let options = model.options.unwrap_or_default();
    Index {
        name: options.name.unwrap_or_default(),
        keys,
        unique: options.unique.unwrap_or(false),
        background: options.background.unwrap_or(false),
    }
}

/// Driver find options; only non-default settings are applied.
fn find_options(options: &FindOptions) -> DriverFindOptions {
    let mut out = DriverFindOptions::default();
    if !options.projection.is_empty() {
        let mut projection = Document::new();
        for (field, include) in &options.projection {
            projection.insert(field.clone(), i32::from(*include));
        }
        out.projection = Some(projection);
    }
    if !options.sort.is_empty() {
        let mut sort = Document::new();
        for entry in &options.sort {
            sort.insert(entry.field.clone(), entry.direction.as_i32());
        }
        out.sort = Some(sort);
    }
    if options.start > 0 {
        out.skip = Some(options.start);
    }
    if options.limit > 0 {
        out.limit = Some(i64::try_from(options.limit).unwrap_or(i64::MAX));
    }
    out
}

fn change_stream_options(options: &WatchOptions) -> ChangeStreamOptions {
    let mut out = ChangeStreamOptions::default();
    if options.batch_size > 0 {
        out.batch_size = Some(options.batch_size);
    }
    if options.full_content {
        out.full_document = Some(FullDocumentType::UpdateLookup);
    }
    out.max_await_time = options.max_await_time;
    out.start_at_operation_time = options.start_timestamp;
    out
}

// ============================================================================
// Find
// ============================================================================

#[async_trait]
impl FindExecutor for MongoTable {
    fn table_name(&self) -> &str {
        &self.name
    }

    async fn execute_find(
        &self,
        ctx: &Context,
        condition: &Condition,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        let filter = filter::compile(condition)?;
        self.shared.ensure_open()?;
        ctx.run("find", async {
            let cursor = self
                .collection()
                .find(filter)
                .with_options(find_options(options))
                .await
                .map_err(self.err("find"))?;
            let docs = self.drain("find", cursor).await?;
            debug!(table = %self.name, operation = "find", returned = docs.len(), "find executed");
            Ok(docs)
        })
        .await
    }

    async fn execute_count(&self, ctx: &Context, condition: &Condition) -> Result<u64> {
        let filter = filter::compile(condition)?;
        self.shared.ensure_open()?;
        ctx.run("count", async {
            self.collection()
                .count_documents(filter)
                .await
                .map_err(self.err("count"))
        })
        .await
    }
}

// ============================================================================
// Watch
// ============================================================================

#[async_trait]
impl ChangeSource for MongoTable {
    type Cursor = MongoCursor;

    fn namespace(&self) -> Namespace {
        Namespace::new(self.shared.database.name(), self.name.clone())
    }

    async fn open_changes(
        &self,
        ctx: &Context,
        conditions: &[Condition],
        options: &WatchOptions,
    ) -> Result<MongoCursor> {
        let pipeline = filter::compile_pipeline(conditions)?;
        self.shared.ensure_open()?;
        ctx.run("watch", async {
            let stream = self
                .collection()
                .watch()
                .pipeline(pipeline)
                .with_options(change_stream_options(options))
                .await
                .map_err(self.err("watch"))?
                .with_type::<Document>();
            Ok(MongoCursor::new(self.name.clone(), stream))
        })
        .await
    }
}

// ============================================================================
// Table
// ============================================================================

#[async_trait]
impl Table for MongoTable {
    async fn create_index(&self, ctx: &Context, index: Index) -> Result<()> {
        index.validate()?;
        self.shared.ensure_open()?;
        ctx.run("create_index", async {
            self.collection()
                .create_index(index_model(&index))
                .await
                .map_err(self.err("create_index"))?;
            debug!(table = %self.name, operation = "create_index", index = %index.name, "index created");
            Ok(())
        })
        .await
    }

    async fn drop_index(&self, ctx: &Context, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(ValidationError::EmptyIndexName.into());
        }
        self.shared.ensure_open()?;
        ctx.run("drop_index", async {
            self.collection()
                .drop_index(name)
                .await
                .map_err(self.err("drop_index"))
        })
        .await
    }

    async fn has_index(&self, ctx: &Context, name: &str) -> Result<bool> {
        self.shared.ensure_open()?;
        ctx.run("has_index", async {
            let names = self
                .collection()
                .list_index_names()
                .await
                .map_err(self.err("has_index"))?;
            Ok(names.iter().any(|n| n == name))
        })
        .await
    }

    async fn indexes(&self, ctx: &Context) -> Result<Vec<Index>> {
        self.shared.ensure_open()?;
        ctx.run("indexes", async {
            let mut cursor = self
                .collection()
                .list_indexes()
                .await
                .map_err(self.err("indexes"))?;
            let mut out = Vec::new();
            while cursor.advance().await.map_err(self.err("indexes"))? {
                let model = cursor.deserialize_current().map_err(self.err("indexes"))?;
                out.push(index_from_model(model));
            }
            Ok(out)
        })
        .await
    }

    async fn insert(&self, ctx: &Context, docs: Vec<Document>) -> Result<usize> {
        if docs.is_empty() {
            return Ok(0);
        }
        self.shared.ensure_open()?;
        ctx.run("insert", async {
            let result = self
                .collection()
                .insert_many(docs)
                .await
                .map_err(self.err("insert"))?;
            debug!(table = %self.name, operation = "insert", count = result.inserted_ids.len(), "documents inserted");
            Ok(result.inserted_ids.len())
        })
        .await
    }

    async fn update(&self, ctx: &Context, condition: &Condition, patch: Document) -> Result<()> {
        let filter = filter::compile(condition)?;
        let update = normalize_patch(patch)?;
        self.shared.ensure_open()?;
        ctx.run("update", async {
            self.collection()
                .update_one(filter, update)
                .await
                .map_err(self.err("update"))?;
            Ok(())
        })
        .await
    }

    async fn update_many(
        &self,
        ctx: &Context,
        condition: &Condition,
        patch: Document,
    ) -> Result<u64> {
        let filter = filter::compile(condition)?;
        let update = normalize_patch(patch)?;
        self.shared.ensure_open()?;
        ctx.run("update_many", async {
            let result = self
                .collection()
                .update_many(filter, update)
                .await
                .map_err(self.err("update_many"))?;
            debug!(table = %self.name, operation = "update_many", matched = result.matched_count, "documents updated");
            Ok(result.matched_count)
        })
        .await
    }

    async fn upsert(&self, ctx: &Context, condition: &Condition, patch: Document) -> Result<()> {
        let filter = filter::compile(condition)?;
        let update = normalize_patch(patch)?;
        self.shared.ensure_open()?;
        ctx.run("upsert", async {
            self.collection()
                .update_one(filter, update)
                .upsert(true)
                .await
                .map_err(self.err("upsert"))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, ctx: &Context, condition: &Condition) -> Result<u64> {
        let filter = filter::compile(condition)?;
        self.shared.ensure_open()?;
        ctx.run("delete", async {
            let result = self
                .collection()
                .delete_many(filter)
                .await
                .map_err(self.err("delete"))?;
            debug!(table = %self.name, operation = "delete", deleted = result.deleted_count, "documents deleted");
            Ok(result.deleted_count)
        })
        .await
    }
}

// ============================================================================
// Tests
// ============================================================================

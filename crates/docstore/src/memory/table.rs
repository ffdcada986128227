use std::sync::Arc;

use async_trait::async_trait;
use bson::{oid::ObjectId, Document};
use tracing::debug;

use super::cursor::MemoryCursor;
use super::query::{find_duplicate, paginate, project, sort_documents};
use super::{Collection, Shared, ID_INDEX};
use crate::condition::{matcher, Condition};
use crate::context::Context;
use crate::driver::{ChangeSource, FindExecutor, Table};
use crate::error::{Result, StorageError, ValidationError};
use crate::patch::{apply_update, ensure_supported, normalize_patch, upsert_seed};
use crate::types::{FindOptions, Index};
use crate::watch::{Namespace, WatchOptions};

/// Which matches a modification touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    First,
    All,
    Upsert,
}

/// Handle to one collection of a [`MemoryDb`](super::MemoryDb).
#[derive(Debug, Clone)]
pub struct MemoryTable {
    shared: Arc<Shared>,
    name: String,
}

impl MemoryTable {
    pub(super) fn new(shared: Arc<Shared>, name: &str) -> Self {
        Self {
            shared,
            name: name.to_string(),
        }
    }

    fn duplicate_error(&self, operation: &'static str, index: &str) -> StorageError {
        StorageError::execution(
            self.name.clone(),
            operation,
            format!("duplicate key error on index {index}"),
        )
    }

    /// Shared path of `update`, `update_many` and `upsert`. Returns the
    /// number of documents that matched before mutation.
    fn modify(
        &self,
        operation: &'static str,
        condition: &Condition,
        patch: Document,
        scope: Scope,
    ) -> Result<u64> {
        let update = normalize_patch(patch)?;
        ensure_supported(&update)?;
        let predicate = matcher::compile(condition)?;
        self.shared.ensure_open()?;

        let mut guard = self.shared.state.write();
        let state = &mut *guard;
        if scope != Scope::Upsert && !state.collections.contains_key(&self.name) {
            return Ok(0);
        }
        let coll = state
            .collections
            .entry(self.name.clone())
            .or_insert_with(Collection::new);

        let mut targets: Vec<usize> = coll
            .docs
            .iter()
            .enumerate()
            .filter(|(_, d)| predicate(*d))
            .map(|(i, _)| i)
            .collect();
        if scope != Scope::All {
            targets.truncate(1);
        }

        if targets.is_empty() {
            if scope != Scope::Upsert {
                return Ok(0);
            }
            let mut doc = upsert_seed(condition);
            apply_update(&mut doc, &update, true)?;
            ensure_id(&mut doc);
            let mut candidate = coll.docs.clone();
            candidate.push(doc.clone());
            if let Some(index) = find_duplicate(&candidate, &coll.indexes) {
                return Err(self.duplicate_error(operation, index));
            }
            coll.docs = candidate;
            state.oplog.insert(&self.name, &doc);
            drop(guard);
            self.shared.changed.notify_waiters();
            debug!(table = %self.name, operation, "upsert inserted a new document");
            return Ok(0);
        }

        let mut candidate = coll.docs.clone();
        for &i in &targets {
            apply_update(&mut candidate[i], &update, false)?;
        }
        if let Some(index) = find_duplicate(&candidate, &coll.indexes) {
            return Err(self.duplicate_error(operation, index));
        }
        let before = std::mem::replace(&mut coll.docs, candidate);
        for &i in &targets {
            state.oplog.update(&self.name, &before[i], &coll.docs[i]);
        }
        drop(guard);
        self.shared.changed.notify_waiters();
        debug!(table = %self.name, operation, matched = targets.len(), "documents updated");
        Ok(targets.len() as u64)
    }
}

fn ensure_id(doc: &mut Document) {
    if !doc.contains_key("_id") {
        let mut with_id = Document::new();
        with_id.insert("_id", ObjectId::new());
        with_id.extend(std::mem::take(doc));
        *doc = with_id;
    }
}

// ============================================================================
// Find
// ============================================================================

#[async_trait]
impl FindExecutor for MemoryTable {
    fn table_name(&self) -> &str {
        &self.name
    }

    async fn execute_find(
        &self,
        ctx: &Context,
        condition: &Condition,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        let predicate = matcher::compile(condition)?;
        ctx.run("find", async {
            self.shared.ensure_open()?;
            let mut docs: Vec<Document> = {
                let state = self.shared.state.read();
                match state.collections.get(&self.name) {
                    Some(coll) => coll.docs.iter().filter(|d| predicate(*d)).cloned().collect(),
                    None => Vec::new(),
                }
            };
            sort_documents(&mut docs, &options.sort);
            let docs = paginate(docs, options.start, options.limit)
                .into_iter()
                .map(|d| project(d, &options.projection))
                .collect::<Result<Vec<_>, ValidationError>>()?;
            debug!(table = %self.name, operation = "find", returned = docs.len(), "find executed");
            Ok(docs)
        })
        .await
    }

    async fn execute_count(&self, ctx: &Context, condition: &Condition) -> Result<u64> {
        let predicate = matcher::compile(condition)?;
        ctx.run("count", async {
            self.shared.ensure_open()?;
            let state = self.shared.state.read();
            let n = state
                .collections
                .get(&self.name)
                .map_or(0, |coll| coll.docs.iter().filter(|d| predicate(*d)).count());
            Ok(n as u64)
        })
        .await
    }
}

// ============================================================================
// Watch
// ============================================================================

#[async_trait]
impl ChangeSource for MemoryTable {
    type Cursor = MemoryCursor;

    fn namespace(&self) -> Namespace {
        Namespace::new(self.shared.database.clone(), self.name.clone())
    }

    async fn open_changes(
        &self,
        ctx: &Context,
        conditions: &[Condition],
        options: &WatchOptions,
    ) -> Result<MemoryCursor> {
        let filters = conditions
            .iter()
            .map(matcher::compile)
            .collect::<Result<Vec<_>, _>>()?;
        ctx.run("watch", async {
            self.shared.ensure_open()?;
            let position = {
                let state = self.shared.state.read();
                match options.start_timestamp {
                    Some(ts) => state.oplog.position_at(ts),
                    None => state.oplog.head(),
                }
            };
            Ok(MemoryCursor::open(
                self.shared.clone(),
                self.name.clone(),
                position,
                filters,
                options.full_content,
            ))
        })
        .await
    }
}

// ============================================================================
// Table
// ============================================================================

#[async_trait]
impl Table for MemoryTable {
    async fn create_index(&self, ctx: &Context, index: Index) -> Result<()> {
        index.validate()?;
        ctx.run("create_index", async {
            self.shared.ensure_open()?;
            let mut state = self.shared.state.write();
            let coll = state.collection_mut(&self.name);
            if let Some(existing) = coll.indexes.iter().find(|i| i.name == index.name) {
                if existing.keys == index.keys && existing.unique == index.unique {
                    return Ok(());
                }
                return Err(StorageError::execution(
                    self.name.clone(),
                    "create_index",
                    format!("index {} already exists with different options", index.name),
                ));
            }
            if index.unique {
                if let Some(name) = find_duplicate(&coll.docs, std::slice::from_ref(&index)) {
                    return Err(self.duplicate_error("create_index", name));
                }
            }
            debug!(table = %self.name, operation = "create_index", index = %index.name, "index created");
            coll.indexes.push(index);
            Ok(())
        })
        .await
    }

    async fn drop_index(&self, ctx: &Context, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(ValidationError::EmptyIndexName.into());
        }
        ctx.run("drop_index", async {
            self.shared.ensure_open()?;
            if name == ID_INDEX {
                return Err(StorageError::execution(
                    self.name.clone(),
                    "drop_index",
                    "cannot drop the _id index",
                ));
            }
            let mut state = self.shared.state.write();
            let removed = state.collections.get_mut(&self.name).and_then(|coll| {
                let pos = coll.indexes.iter().position(|i| i.name == name)?;
                Some(coll.indexes.remove(pos))
            });
            match removed {
                Some(_) => Ok(()),
                None => Err(StorageError::execution(
                    self.name.clone(),
                    "drop_index",
                    format!("index {name} not found"),
                )),
            }
        })
        .await
    }

    async fn has_index(&self, ctx: &Context, name: &str) -> Result<bool> {
        let indexes = self.indexes(ctx).await?;
        Ok(indexes.iter().any(|i| i.name == name))
    }

    async fn indexes(&self, ctx: &Context) -> Result<Vec<Index>> {
        ctx.run("indexes", async {
            self.shared.ensure_open()?;
            let state = self.shared.state.read();
            Ok(state
                .collections
                .get(&self.name)
                .map(|c| c.indexes.clone())
                .unwrap_or_default())
        })
        .await
    }

    async fn insert(&self, ctx: &Context, docs: Vec<Document>) -> Result<usize> {
        ctx.run("insert", async {
            self.shared.ensure_open()?;
            if docs.is_empty() {
                return Ok(0);
            }
            let mut docs = docs;
            docs.iter_mut().for_each(ensure_id);

            let mut guard = self.shared.state.write();
            let state = &mut *guard;
            let coll: &mut Collection = state.collection_mut(&self.name);
            let mut candidate = coll.docs.clone();
            candidate.extend(docs.iter().cloned());
            if let Some(index) = find_duplicate(&candidate, &coll.indexes) {
                return Err(self.duplicate_error("insert", index));
            }
            coll.docs = candidate;
            for doc in &docs {
                state.oplog.insert(&self.name, doc);
            }
            drop(guard);
            self.shared.changed.notify_waiters();
            debug!(table = %self.name, operation = "insert", count = docs.len(), "documents inserted");
            Ok(docs.len())
        })
        .await
    }

    async fn update(&self, ctx: &Context, condition: &Condition, patch: Document) -> Result<()> {
        ctx.run("update", async { self.modify("update", condition, patch, Scope::First) })
            .await
            .map(|_| ())
    }

    async fn update_many(
        &self,
        ctx: &Context,
        condition: &Condition,
        patch: Document,
    ) -> Result<u64> {
        ctx.run("update_many", async {
            self.modify("update_many", condition, patch, Scope::All)
        })
        .await
    }

    async fn upsert(&self, ctx: &Context, condition: &Condition, patch: Document) -> Result<()> {
        ctx.run("upsert", async { self.modify("upsert", condition, patch, Scope::Upsert) })
            .await
            .map(|_| ())
    }

    async fn delete(&self, ctx: &Context, condition: &Condition) -> Result<u64> {
        let predicate = matcher::compile(condition)?;
        ctx.run("delete", async {
            self.shared.ensure_open()?;
            let mut guard = self.shared.state.write();
            let state = &mut *guard;
            let Some(coll) = state.collections.get_mut(&self.name) else {
                return Ok(0);
            };
            let (removed, kept): (Vec<Document>, Vec<Document>) =
                std::mem::take(&mut coll.docs).into_iter().partition(|d| predicate(d));
            coll.docs = kept;
            for doc in &removed {
                state.oplog.delete(&self.name, doc);
            }
            drop(guard);
            if !removed.is_empty() {
                self.shared.changed.notify_waiters();
            }
            debug!(table = %self.name, operation = "delete", deleted = removed.len(), "documents deleted");
            Ok(removed.len() as u64)
        })
        .await
    }
}

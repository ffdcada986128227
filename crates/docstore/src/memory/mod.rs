//! Embedded backend that keeps every collection in process memory.
//!
//! Collections live behind one `parking_lot::RwLock`, so reads run in
//! parallel and each mutation is applied atomically together with its
//! change records. Watchers tail an in-memory oplog of MongoDB-shaped change
//! records, which lets the uniform [`Watcher`](crate::watch::Watcher) run
//! unchanged on top of it.

mod cursor;
mod oplog;
mod query;
mod table;

pub use cursor::MemoryCursor;
pub use table::MemoryTable;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bson::Document;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::context::Context;
use crate::driver::Database;
use crate::error::{Result, StorageError, ValidationError};
use crate::types::{Index, IndexField};

use self::oplog::Oplog;

/// Name of the index every collection gets on creation.
pub const ID_INDEX: &str = "_id_";

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoryOptions {
    /// Reported as the database name in change events.
    pub database: String,
    /// Number of change records retained for watchers.
    pub oplog_capacity: usize,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            database: "docstore".to_string(),
            oplog_capacity: 10_000,
        }
    }
}

// ============================================================================
// Shared State
// ============================================================================

#[derive(Debug)]
pub(crate) struct Collection {
    pub docs: Vec<Document>,
    pub indexes: Vec<Index>,
}

impl Collection {
    fn new() -> Self {
        Self {
            docs: Vec::new(),
            indexes: vec![Index {
                name: ID_INDEX.to_string(),
                keys: vec![IndexField::asc("_id")],
                unique: true,
                background: false,
            }],
        }
    }
}

#[derive(Debug)]
pub(crate) struct State {
    pub collections: BTreeMap<String, Collection>,
    pub oplog: Oplog,
}

impl State {
    /// Collection, created on first write as MongoDB does.
    pub fn collection_mut(&mut self, name: &str) -> &mut Collection {
        self.collections
            .entry(name.to_string())
            .or_insert_with(Collection::new)
    }
}

#[derive(Debug)]
pub(crate) struct Shared {
    pub database: String,
    pub state: RwLock<State>,
    /// Woken after every mutation and on close.
    pub changed: Notify,
    pub closed: AtomicBool,
    pub open_cursors: AtomicUsize,
}

impl Shared {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Database
// ============================================================================

/// In-process database. Clones share the same data.
#[derive(Debug, Clone)]
pub struct MemoryDb {
    shared: Arc<Shared>,
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new(MemoryOptions::default())
    }
}

impl MemoryDb {
    pub fn new(options: MemoryOptions) -> Self {
        let oplog = Oplog::new(options.database.clone(), options.oplog_capacity);
        Self {
            shared: Arc::new(Shared {
                database: options.database,
                state: RwLock::new(State {
                    collections: BTreeMap::new(),
                    oplog,
                }),
                changed: Notify::new(),
                closed: AtomicBool::new(false),
                open_cursors: AtomicUsize::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.database
    }

    /// Number of change cursors currently open against this database.
    pub fn open_cursors(&self) -> usize {
        self.shared.open_cursors.load(Ordering::SeqCst)
    }

    /// Direct snapshot of a collection's documents, in insertion order.
    pub fn snapshot(&self, table: &str) -> Vec<Document> {
        self.shared
            .state
            .read()
            .collections
            .get(table)
            .map(|c| c.docs.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Database for MemoryDb {
    type Table = MemoryTable;

    async fn ping(&self, ctx: &Context) -> Result<()> {
        ctx.run("ping", async { self.shared.ensure_open() }).await
    }

    async fn has_table(&self, ctx: &Context, name: &str) -> Result<bool> {
        ctx.run("has_table", async {
            self.shared.ensure_open()?;
            Ok(self.shared.state.read().collections.contains_key(name))
        })
        .await
    }

    async fn list_table_names(&self, ctx: &Context) -> Result<Vec<String>> {
        ctx.run("list_table_names", async {
            self.shared.ensure_open()?;
            Ok(self.shared.state.read().collections.keys().cloned().collect())
        })
        .await
    }

    async fn create_table(&self, ctx: &Context, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(ValidationError::EmptyTableName.into());
        }
        ctx.run("create_table", async {
            self.shared.ensure_open()?;
            let mut state = self.shared.state.write();
            if state.collections.contains_key(name) {
                return Err(StorageError::execution(
                    name,
                    "create_table",
                    "table already exists",
                ));
            }
            state.collections.insert(name.to_string(), Collection::new());
            debug!(table = name, operation = "create_table", "table created");
            Ok(())
        })
        .await
    }

    async fn drop_table(&self, ctx: &Context, name: &str) -> Result<()> {
        ctx.run("drop_table", async {
            self.shared.ensure_open()?;
            let mut state = self.shared.state.write();
            if state.collections.remove(name).is_some() {
                state.oplog.drop_collection(name);
                drop(state);
                self.shared.changed.notify_waiters();
            }
            debug!(table = name, operation = "drop_table", "table dropped");
            Ok(())
        })
        .await
    }

    fn table(&self, name: &str) -> MemoryTable {
        MemoryTable::new(self.shared.clone(), name)
    }

    async fn close(&self) -> Result<()> {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            self.shared.changed.notify_waiters();
            info!(db = %self.shared.database, "memory database closed");
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

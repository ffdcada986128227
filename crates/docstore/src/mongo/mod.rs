//! MongoDB binding built on the official `mongodb` driver.

mod cursor;
mod options;
mod table;

pub use cursor::MongoCursor;
pub use options::{MongoOptions, DEFAULT_AUTH_MECHANISM};
pub use table::MongoTable;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bson::doc;
use mongodb::Client;
use tracing::{debug, info};

use crate::context::Context;
use crate::driver::Database;
use crate::error::{Result, StorageError, ValidationError};

#[derive(Debug)]
pub(crate) struct Shared {
    pub client: Client,
    pub database: mongodb::Database,
    pub closed: AtomicBool,
}

impl Shared {
    pub fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

/// A connected MongoDB database. Clones share one client and pool.
#[derive(Debug, Clone)]
pub struct MongoDb {
    shared: Arc<Shared>,
}

impl MongoDb {
    /// Build the client and ping the server, so unreachable hosts and bad
    /// credentials surface here instead of on first use.
    pub async fn connect(ctx: &Context, options: &MongoOptions) -> Result<Self> {
        let client_options = options.client_options()?;
        let client = Client::with_options(client_options)
            .map_err(|e| StorageError::connection("failed to create mongo client", e))?;
        let database = client.database(&options.database);
        let db = Self {
            shared: Arc::new(Shared {
                client,
                database,
                closed: AtomicBool::new(false),
            }),
        };
        db.ping(ctx).await.map_err(|e| match e {
            StorageError::Execution { source, .. } => StorageError::Connection {
                message: format!("cannot reach {}", options.hosts.join(",")),
                source: Some(source),
            },
            other => other,
        })?;
        info!(
            hosts = %options.hosts.join(","),
            database = %options.database,
            "connected to mongodb"
        );
        Ok(db)
    }

    pub fn name(&self) -> &str {
        self.shared.database.name()
    }
}

fn db_error<'a>(
    operation: &'static str,
    table: &'a str,
) -> impl FnOnce(mongodb::error::Error) -> StorageError + 'a {
    move |e| StorageError::execution(table, operation, e)
}

#[async_trait]
impl Database for MongoDb {
    type Table = MongoTable;

    async fn ping(&self, ctx: &Context) -> Result<()> {
        self.shared.ensure_open()?;
        ctx.run("ping", async {
            self.shared
                .database
                .run_command(doc! { "ping": 1 })
                .await
                .map_err(db_error("ping", ""))?;
            Ok(())
        })
        .await
    }

    async fn has_table(&self, ctx: &Context, name: &str) -> Result<bool> {
        self.shared.ensure_open()?;
        ctx.run("has_table", async {
            let names = self
                .shared
                .database
                .list_collection_names()
                .filter(doc! { "name": name })
                .await
                .map_err(db_error("has_table", name))?;
            Ok(!names.is_empty())
        })
        .await
    }

    async fn list_table_names(&self, ctx: &Context) -> Result<Vec<String>> {
        self.shared.ensure_open()?;
        ctx.run("list_table_names", async {
            self.shared
                .database
                .list_collection_names()
                .await
                .map_err(db_error("list_table_names", ""))
        })
        .await
    }

    async fn create_table(&self, ctx: &Context, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(ValidationError::EmptyTableName.into());
        }
        self.shared.ensure_open()?;
        ctx.run("create_table", async {
            self.shared
                .database
                .create_collection(name)
                .await
                .map_err(db_error("create_table", name))?;
            debug!(table = name, operation = "create_table", "table created");
            Ok(())
        })
        .await
    }

    async fn drop_table(&self, ctx: &Context, name: &str) -> Result<()> {
        self.shared.ensure_open()?;
        ctx.run("drop_table", async {
            self.shared
                .database
                .collection::<bson::Document>(name)
                .drop()
                .await
                .map_err(db_error("drop_table", name))?;
            debug!(table = name, operation = "drop_table", "table dropped");
            Ok(())
        })
        .await
    }

    fn table(&self, name: &str) -> MongoTable {
        MongoTable::new(self.shared.clone(), name)
    }

    /// Shut the client down without waiting for open cursors; their watchers
    /// end with an error event.
    async fn close(&self) -> Result<()> {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            self.shared.client.clone().shutdown().immediate(true).await;
            info!(database = %self.name(), "mongodb client closed");
        }
        Ok(())
    }
}

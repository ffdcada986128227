//! Change notification: turns a native change feed into a bounded, ordered
//! stream of [`WatchEvent`]s.
//!
//! [`Watcher::do_watch`] opens the feed and spawns one delivery task per
//! subscription. The task:
//!
//! 1. waits for the next native record or for the context to fire;
//! 2. decodes the record into a [`ChangeEvent`];
//! 3. normalizes it into a [`WatchEvent`];
//! 4. sends it, giving up if the context fires while the channel is full.
//!
//! Decode failures, cursor failures and operations without a uniform
//! counterpart (`drop`, `rename`, `invalidate`, ..) produce a single
//! [`EventKind::Error`] event, after which the channel ends. The native
//! cursor is closed before the task returns on every path.

use std::fmt;
use std::time::Duration;

use bson::{Bson, Document, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::condition::Condition;
use crate::context::Context;
use crate::driver::{ChangeCursor, ChangeSource};
use crate::error::Result;

/// Capacity of the channel returned by [`Watcher::do_watch`].
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

// ============================================================================
// Uniform Events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Insert,
    Update,
    Delete,
    /// Terminal: nothing follows it on the channel.
    Error,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Insert => "insert",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
            EventKind::Error => "error",
        };
        f.write_str(s)
    }
}

/// Database and collection names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub db: String,
    #[serde(default)]
    pub coll: String,
}

impl Namespace {
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }
}

/// A backend-independent change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub db_name: String,
    pub collection_name: String,
    /// `_id` of the affected document.
    pub id: Option<Bson>,
    /// Full document for inserts (and updates in full mode); otherwise the
    /// updated fields for updates; `None` for deletes and errors.
    pub data: Option<Document>,
    pub removed_fields: Vec<String>,
    /// Position in the feed; usable as a resume point.
    pub cluster_time: Option<Timestamp>,
    /// Failure description, set only on [`EventKind::Error`].
    pub error: Option<String>,
}

impl WatchEvent {
    pub fn failure(ns: &Namespace, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            db_name: ns.db.clone(),
            collection_name: ns.coll.clone(),
            id: None,
            data: None,
            removed_fields: Vec::new(),
            cluster_time: None,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == EventKind::Error
    }
}

// ============================================================================
// Native Change Records
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDescription {
    #[serde(default)]
    pub updated_fields: Document,
    #[serde(default)]
    pub removed_fields: Vec<String>,
}

/// A change record in the native (MongoDB change stream) vocabulary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub operation_type: String,
    #[serde(default)]
    pub ns: Option<Namespace>,
    #[serde(default)]
    pub document_key: Option<Document>,
    #[serde(default)]
    pub full_document: Option<Document>,
    #[serde(default)]
    pub update_description: Option<UpdateDescription>,
    #[serde(default)]
    pub cluster_time: Option<Timestamp>,
}

impl ChangeEvent {
    pub fn decode(raw: Document) -> Result<Self, bson::de::Error> {
        bson::from_document(raw)
    }

    /// Uniform kind; `None` for operations with no uniform counterpart.
    pub fn kind(&self) -> Option<EventKind> {
        match self.operation_type.as_str() {
            "insert" => Some(EventKind::Insert),
            "update" | "replace" => Some(EventKind::Update),
            "delete" => Some(EventKind::Delete),
            _ => None,
        }
    }

    /// Normalize. `fallback` names the watched table when the record carries
    /// no namespace.
    pub fn into_watch_event(self, fallback: &Namespace) -> WatchEvent {
        let ns = self.ns.clone().unwrap_or_else(|| fallback.clone());
        let Some(kind) = self.kind() else {
            return WatchEvent::failure(
                &ns,
                format!("unsupported change operation \"{}\"", self.operation_type),
            );
        };
        let id = self.document_key.and_then(|mut key| key.remove("_id"));
        let (updated, removed_fields) = match self.update_description {
            Some(desc) => (Some(desc.updated_fields), desc.removed_fields),
            None => (None, Vec::new()),
        };
        let data = match kind {
            EventKind::Insert => self.full_document,
            EventKind::Update => self.full_document.or(updated),
            EventKind::Delete | EventKind::Error => None,
        };
        WatchEvent {
            kind,
            db_name: ns.db,
            collection_name: ns.coll,
            id,
            data,
            removed_fields,
            cluster_time: self.cluster_time,
            error: None,
        }
    }
}

// ============================================================================
// Watcher
// ============================================================================

/// Change-feed settings. Zero and `None` mean "backend default".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatchOptions {
    pub batch_size: u32,
    /// Deliver the current full document with update events.
    pub full_content: bool,
    pub max_await_time: Option<Duration>,
    /// Start from this feed position instead of "now".
    pub start_timestamp: Option<Timestamp>,
}

/// Subscription builder over any [`ChangeSource`].
#[derive(Debug, Clone)]
pub struct Watcher<S> {
    source: S,
    conditions: Vec<Condition>,
    options: WatchOptions,
}

impl<S: ChangeSource> Watcher<S> {
    pub fn new(source: S, conditions: Vec<Condition>) -> Self {
        Self {
            source,
            conditions,
            options: WatchOptions::default(),
        }
    }

    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.options.batch_size = size;
        self
    }

    pub fn with_full_content(mut self, full: bool) -> Self {
        self.options.full_content = full;
        self
    }

    pub fn with_max_await_time(mut self, wait: Duration) -> Self {
        self.options.max_await_time = Some(wait);
        self
    }

    pub fn with_start_timestamp(mut self, time: u32, increment: u32) -> Self {
        self.options.start_timestamp = Some(Timestamp { time, increment });
        self
    }

    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    /// Open the feed and start delivering events.
    ///
    /// Setup failures (invalid conditions, unreachable server) are returned
    /// here; everything after that arrives on the channel. The delivery task
    /// stops when `ctx` fires, when the receiver is dropped, or after an
    /// error event. Must be called from within a tokio runtime.
    pub async fn do_watch(self, ctx: &Context) -> Result<mpsc::Receiver<WatchEvent>> {
        let ns = self.source.namespace();
        let cursor = ctx
            .run(
                "watch",
                self.source.open_changes(ctx, &self.conditions, &self.options),
            )
            .await?;
        debug!(
            db = %ns.db,
            table = %ns.coll,
            conditions = self.conditions.len(),
            full = self.options.full_content,
            "change feed opened"
        );
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(deliver(ctx.clone(), cursor, tx, ns));
        Ok(rx)
    }
}

// ============================================================================
// Delivery Task
// ============================================================================

async fn deliver<C: ChangeCursor>(
    ctx: Context,
    mut cursor: C,
    tx: mpsc::Sender<WatchEvent>,
    ns: Namespace,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.done() => break,
            _ = tx.closed() => break,
            next = cursor.next_change() => next,
        };
        let event = match next {
            Ok(Some(raw)) => match ChangeEvent::decode(raw) {
                Ok(change) => change.into_watch_event(&ns),
                Err(e) => {
                    error!(db = %ns.db, table = %ns.coll, error = %e, "failed to decode change record");
                    WatchEvent::failure(&ns, e.to_string())
                }
            },
            Ok(None) => break,
            Err(e) => WatchEvent::failure(&ns, e.to_string()),
        };
        let terminal = event.is_error();
        if terminal {
            warn!(
                db = %ns.db,
                table = %ns.coll,
                error = event.error.as_deref().unwrap_or_default(),
                "change feed terminated"
            );
        }
        let sent = tokio::select! {
            biased;
            _ = ctx.done() => false,
            permit = tx.reserve() => match permit {
                Ok(permit) => {
                    permit.send(event);
                    true
                }
                Err(_) => false,
            },
        };
        if !sent || terminal {
            break;
        }
    }
    cursor.close().await;
    debug!(db = %ns.db, table = %ns.coll, "change feed closed");
}

// ============================================================================
// Tests
// ============================================================================

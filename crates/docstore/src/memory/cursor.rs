use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use bson::Document;

use super::Shared;
use crate::condition::matcher::Predicate;
use crate::driver::ChangeCursor;
use crate::error::{Result, StorageError};

/// Keeps `open_cursors` accurate however the cursor goes away.
struct Registration(Arc<Shared>);

impl Registration {
    fn new(shared: Arc<Shared>) -> Self {
        shared.open_cursors.fetch_add(1, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.0.open_cursors.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Tails the oplog for one collection.
pub struct MemoryCursor {
    shared: Arc<Shared>,
    coll: String,
    next_seq: u64,
    filters: Vec<Predicate>,
    full: bool,
    registration: Option<Registration>,
}

impl MemoryCursor {
    pub(super) fn open(
        shared: Arc<Shared>,
        coll: String,
        next_seq: u64,
        filters: Vec<Predicate>,
        full: bool,
    ) -> Self {
        Self {
            registration: Some(Registration::new(shared.clone())),
            shared,
            coll,
            next_seq,
            filters,
            full,
        }
    }

    /// Next matching record at or after `next_seq`, without waiting.
    fn poll_log(&mut self) -> Result<Option<Document>> {
        let state = self.shared.state.read();
        if state.oplog.tail() > self.next_seq {
            return Err(StorageError::execution(
                self.coll.clone(),
                "watch",
                "change history was trimmed past the cursor position",
            ));
        }
        for entry in state.oplog.since(self.next_seq) {
            self.next_seq = entry.seq + 1;
            if entry.coll != self.coll {
                continue;
            }
            let record = entry.materialize(self.full);
            if self.filters.iter().all(|p| p(&record)) {
                return Ok(Some(record));
            }
        }
        self.next_seq = state.oplog.head();
        Ok(None)
    }
}

#[async_trait]
impl ChangeCursor for MemoryCursor {
    async fn next_change(&mut self) -> Result<Option<Document>> {
        loop {
            if self.registration.is_none() {
                return Ok(None);
            }
            let shared = self.shared.clone();
            let notified = shared.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if shared.is_closed() {
                return Err(StorageError::Closed);
            }
            if let Some(record) = self.poll_log()? {
                return Ok(Some(record));
            }
            notified.await;
        }
    }

    async fn close(&mut self) {
        self.registration = None;
    }
}

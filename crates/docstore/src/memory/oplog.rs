//! Ordered log of change records, shaped like MongoDB change stream events.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use bson::{doc, Bson, Document, Timestamp};

/// Operation recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Insert,
    Update,
    Delete,
    Drop,
}

impl OpKind {
    fn as_str(self) -> &'static str {
        match self {
            OpKind::Insert => "insert",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
            OpKind::Drop => "drop",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OplogEntry {
    pub seq: u64,
    pub coll: String,
    pub ts: Timestamp,
    /// Change record without `fullDocument` for updates.
    record: Document,
    /// Document after an update, attached only in full mode.
    post_image: Option<Document>,
}

impl OplogEntry {
    /// The change record as a subscriber sees it.
    pub fn materialize(&self, full: bool) -> Document {
        let mut record = self.record.clone();
        if full {
            if let Some(image) = &self.post_image {
                record.insert("fullDocument", image.clone());
            }
        }
        record
    }
}

/// Bounded change history with monotonic timestamps.
#[derive(Debug)]
pub struct Oplog {
    db: String,
    entries: VecDeque<OplogEntry>,
    capacity: usize,
    next_seq: u64,
    last_ts: Timestamp,
}

impl Oplog {
    pub fn new(db: impl Into<String>, capacity: usize) -> Self {
        Self {
            db: db.into(),
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            next_seq: 1,
            last_ts: Timestamp {
                time: 0,
                increment: 0,
            },
        }
    }

    fn tick(&mut self) -> Timestamp {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
            .unwrap_or(0);
        self.last_ts = if now > self.last_ts.time {
            Timestamp {
                time: now,
                increment: 1,
            }
        } else {
            Timestamp {
                time: self.last_ts.time,
                increment: self.last_ts.increment + 1,
            }
        };
        self.last_ts
    }

    fn push(
        &mut self,
        kind: OpKind,
        coll: &str,
        id: Option<Bson>,
        extra: Document,
        post_image: Option<Document>,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let ts = self.tick();
        let mut record = doc! {
            "_id": { "_data": format!("{seq:016x}") },
            "operationType": kind.as_str(),
            "clusterTime": ts,
            "ns": { "db": self.db.as_str(), "coll": coll },
        };
        if let Some(id) = id {
            record.insert("documentKey", doc! { "_id": id });
        }
        record.extend(extra);
        self.entries.push_back(OplogEntry {
            seq,
            coll: coll.to_string(),
            ts,
            record,
            post_image,
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn insert(&mut self, coll: &str, doc: &Document) {
        let extra = doc! { "fullDocument": doc.clone() };
        self.push(OpKind::Insert, coll, doc.get("_id").cloned(), extra, None);
    }

    /// Record an update from `before` to `after`, at top-level field
    /// granularity. Nothing is recorded when the document is unchanged.
    pub fn update(&mut self, coll: &str, before: &Document, after: &Document) {
        let mut updated = Document::new();
        for (key, value) in after {
            if before.get(key) != Some(value) {
                updated.insert(key.clone(), value.clone());
            }
        }
        let removed: Vec<Bson> = before
            .keys()
            .filter(|k| !after.contains_key(k.as_str()))
            .map(|k| Bson::String(k.clone()))
            .collect();
        if updated.is_empty() && removed.is_empty() {
            return;
        }
        let extra = doc! {
            "updateDescription": { "updatedFields": updated, "removedFields": removed },
        };
        self.push(
            OpKind::Update,
            coll,
            after.get("_id").cloned(),
            extra,
            Some(after.clone()),
        );
    }

    pub fn delete(&mut self, coll: &str, doc: &Document) {
        self.push(OpKind::Delete, coll, doc.get("_id").cloned(), Document::new(), None);
    }

    pub fn drop_collection(&mut self, coll: &str) {
        self.push(OpKind::Drop, coll, None, Document::new(), None);
    }

    /// Sequence number the next entry will get.
    pub fn head(&self) -> u64 {
        self.next_seq
    }

    /// First sequence number whose timestamp is at or after `ts`.
    pub fn position_at(&self, ts: Timestamp) -> u64 {
        self.entries
            .iter()
            .find(|e| (e.ts.time, e.ts.increment) >= (ts.time, ts.increment))
            .map_or(self.next_seq, |e| e.seq)
    }

    /// Oldest retained sequence number.
    pub fn tail(&self) -> u64 {
        self.entries.front().map_or(self.next_seq, |e| e.seq)
    }

    /// Entries with sequence number `>= seq`, oldest first.
    pub fn since(&self, seq: u64) -> impl Iterator<Item = &OplogEntry> {
        let tail = self.tail();
        let skip = seq.saturating_sub(tail) as usize;
        self.entries.iter().skip(skip)
    }
}

// ============================================================================
// Tests
// ============================================================================

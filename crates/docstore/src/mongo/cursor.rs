use async_trait::async_trait;
use bson::Document;
use mongodb::change_stream::ChangeStream;

use crate::driver::ChangeCursor;
use crate::error::{Result, StorageError};

/// Change stream read as raw documents, so the uniform decoder sees exactly
/// what the server sent.
pub struct MongoCursor {
    table: String,
    stream: Option<ChangeStream<Document>>,
}

impl MongoCursor {
    pub(super) fn new(table: String, stream: ChangeStream<Document>) -> Self {
        Self {
            table,
            stream: Some(stream),
        }
    }
}

#[async_trait]
impl ChangeCursor for MongoCursor {
    async fn next_change(&mut self) -> Result<Option<Document>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        while stream.is_alive() {
            let next = stream
                .next_if_any()
                .await
                .map_err(|e| StorageError::execution(self.table.clone(), "watch", e))?;
            if next.is_some() {
                return Ok(next);
            }
        }
        Ok(None)
    }

    /// Dropping the stream kills the server-side cursor.
    async fn close(&mut self) {
        self.stream = None;
    }
}

//! Cancellation and deadline scope passed to every I/O operation.
//!
//! A `Context` is cheap to clone. Children derived with [`Context::child`] or
//! [`Context::with_timeout`] are cancelled together with their parent, never
//! the other way round.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StorageError};

/// Why a context stopped being live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Done {
    Cancelled,
    DeadlineExceeded,
}

impl Done {
    pub fn into_error(self, operation: &'static str) -> StorageError {
        match self {
            Done::Cancelled => StorageError::Cancelled { operation },
            Done::DeadlineExceeded => StorageError::DeadlineExceeded { operation },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled on its own.
    pub fn background() -> Self {
        Self::default()
    }

    /// Child context cancelled when `self` is, or when [`Context::cancel`] is
    /// called on the child.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Child context that additionally expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Child context that expires at `deadline` (or the parent's deadline if
    /// that is earlier).
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Non-blocking check; `Some` once the context is no longer live.
    pub fn done_now(&self) -> Option<Done> {
        if self.token.is_cancelled() {
            return Some(Done::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(Done::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done_now().is_some()
    }

    /// Resolves when the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Done {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => Done::Cancelled,
                _ = tokio::time::sleep_until(deadline) => Done::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                Done::Cancelled
            }
        }
    }

    /// Drive `fut` to completion unless the context fires first.
    ///
    /// A context that is already done never polls `fut`. When the context
    /// wins the race the pending future is dropped and the cancellation error
    /// is returned instead of whatever I/O error the driver would produce.
    pub async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(done) = self.done_now() {
            return Err(done.into_error(operation));
        }
        tokio::select! {
            biased;
            done = self.done() => Err(done.into_error(operation)),
            out = fut => out,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

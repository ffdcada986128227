//! Backend-agnostic document storage: composable conditions, finders and
//! change-stream watchers over MongoDB or an in-memory store.

pub mod context;
pub mod document;
pub mod error;
pub mod types;

pub mod condition;
pub mod driver;
pub mod finder;
pub mod memory;
#[cfg(feature = "mongo")]
pub mod mongo;
pub mod patch;
pub mod watch;

pub use condition::{Combinator, Condition, Operator};
pub use context::Context;
pub use driver::{ChangeCursor, ChangeSource, Database, FindExecutor, Table};
pub use error::{Result, StorageError};
pub use finder::Finder;
pub use watch::{EventKind, WatchEvent, Watcher};

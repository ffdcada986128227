use thiserror::Error;

/// Boxed error used for driver failures carried as `source`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Local input problems detected before any I/O is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("index name cannot be empty")]
    EmptyIndexName,

    #[error("index \"{0}\" must have at least one key")]
    EmptyIndexKeys(String),

    #[error("table name cannot be empty")]
    EmptyTableName,

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    #[error("update operator \"{0}\" is not supported by this backend")]
    UnsupportedUpdateOperator(String),
}

// ---------------------------------------------------------------------------
// ConditionError
// ---------------------------------------------------------------------------

/// A condition leaf that cannot be compiled into a native filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("condition leaf has an empty field path")]
    EmptyField,

    #[error("operator {operator} on field \"{field}\" does not accept a {found} value")]
    UnsupportedValue {
        field: String,
        operator: &'static str,
        found: &'static str,
    },

    #[error("invalid regex on field \"{field}\": {message}")]
    InvalidRegex { field: String, message: String },

    #[error("operator {operator} cannot be compiled for the {backend} backend")]
    UnsupportedOperator {
        operator: &'static str,
        backend: &'static str,
    },
}

// ---------------------------------------------------------------------------
// StorageError (top-level rollup)
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("database connection is closed")]
    Closed,

    #[error("record not found in table \"{table}\"")]
    NotFound { table: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Condition(#[from] ConditionError),

    #[error("{operation} on table \"{table}\" failed: {source}")]
    Execution {
        table: String,
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("{operation} was cancelled")]
    Cancelled { operation: &'static str },

    #[error("{operation} exceeded its deadline")]
    DeadlineExceeded { operation: &'static str },

    #[error("failed to decode document: {0}")]
    Decode(String),
}

impl StorageError {
    /// Wrap a driver failure with the table and operation it happened in.
    pub fn execution(
        table: impl Into<String>,
        operation: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Execution {
            table: table.into(),
            operation,
            source: source.into(),
        }
    }

    pub fn connection(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// True for the distinguished "record not found" sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when the caller's context fired before the operation completed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DeadlineExceeded { .. })
    }
}

/// Convenience alias; the default error type is `StorageError`.
pub type Result<T, E = StorageError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

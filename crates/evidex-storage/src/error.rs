use thiserror::Error;

use evidex_core::error::EvidexError;

/// Errors raised by the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The linked SQLite library is missing features the schema relies on.
    #[error("SQLite driver unavailable: found {found}, need {required} or newer")]
    DriverUnavailable { found: String, required: String },

    #[error("Failed to open database at {path}: {source}")]
    Connection {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Query failed: {source} (statement: {statement})")]
    Query {
        statement: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Caller supplied data that cannot be stored. Raised before any
    /// statement is issued.
    #[error("Invalid data: {0}")]
    Validation(String),

    /// The history table lists migrations this build does not know about,
    /// usually after running an older build against a newer database.
    #[error("Database has applied migrations unknown to this build: {}", .unknown.join(", "))]
    BadDatabaseState { unknown: Vec<String> },

    #[error("Migration script {name} could not be read: {source}")]
    MigrationAssetMissing {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub(crate) fn query(statement: &str, source: rusqlite::Error) -> Self {
        StorageError::Query {
            statement: statement.trim().to_string(),
            source,
        }
    }
}

impl From<StorageError> for EvidexError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Validation(msg) => EvidexError::Validation(msg),
            StorageError::Io(e) => EvidexError::Io(e),
            other => EvidexError::Storage(other.to_string()),
        }
    }
}

//! Crate-scoped error handling for redb-range-table.
//!
//! Absent keys are not errors: `get` returns `None` and `delete` is a no-op.
//! Everything below is surfaced to the caller of the failing operation and
//! never retried.

use thiserror::Error;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type exposed to users of the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Errors from the key encoding layer, including corrupt stored keys
    #[error("Encoding error: {0}")]
    Encoding(#[from] crate::encoding::EncodingError),

    /// The underlying redb database failed or is unusable
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A table name was reopened with different key or value types
    #[error("Table {name} is registered as {expected}, requested as {found}")]
    TableTypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    /// Invalid configuration parameters
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// True when the error reports a stored key that could not be decoded.
    pub fn is_corrupt_key(&self) -> bool {
        matches!(
            self,
            Error::Encoding(crate::encoding::EncodingError::CorruptKey(_))
        )
    }
}

impl From<redb::DatabaseError> for Error {
    fn from(err: redb::DatabaseError) -> Self {
        Error::StoreUnavailable(format!("Database error: {}", err))
    }
}

impl From<redb::TransactionError> for Error {
    fn from(err: redb::TransactionError) -> Self {
        Error::StoreUnavailable(format!("Transaction error: {}", err))
    }
}

impl From<redb::TableError> for Error {
    fn from(err: redb::TableError) -> Self {
        Error::StoreUnavailable(format!("Table error: {}", err))
    }
}

impl From<redb::StorageError> for Error {
    fn from(err: redb::StorageError) -> Self {
        Error::StoreUnavailable(format!("Storage error: {}", err))
    }
}

impl From<redb::CommitError> for Error {
    fn from(err: redb::CommitError) -> Self {
        Error::StoreUnavailable(format!("Commit error: {}", err))
    }
}

//! Error taxonomy for the log store.

use ctlog_types::EntryHash;
use thiserror::Error;

/// Errors that may occur while interacting with the log store.
///
/// Lookup misses and write conflicts are routine, typed conditions the caller
/// is expected to branch on; [`StorageError::Database`] and
/// [`StorageError::Corrupt`] indicate substrate failures that are fatal to the
/// in-flight operation and are never retried at this layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying storage engine reported an I/O or integrity error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The expected row was not found in the database.
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// An entry with the same content hash already exists.
    #[error("duplicate entry hash {0}")]
    DuplicateEntry(EntryHash),

    /// A tree head with the same size and timestamp already exists.
    #[error("duplicate tree head (size {tree_size}, timestamp {timestamp})")]
    DuplicateTreeHead {
        /// Tree size of the rejected head.
        tree_size: u64,
        /// Timestamp of the rejected head.
        timestamp: u64,
    },

    /// The node identity was already initialized with a different value.
    #[error("node id already set to {stored:?}, refusing {proposed:?}")]
    NodeIdMismatch {
        /// The identity already persisted.
        stored: String,
        /// The conflicting identity the caller attempted to set.
        proposed: String,
    },

    /// A persisted row failed to decode.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StorageError {
    /// True if this error is a routine lookup miss rather than a failure.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

//! Persistence layer for a certificate-transparency log server.
//!
//! This crate provides the [`LogDb`] store: an append-only, SQLite-backed
//! record of sequenced log entries together with the signed tree heads
//! attesting to the Merkle tree built over them. It supports:
//!
//! - Writing entries with store-assigned, strictly increasing sequence
//!   numbers, batched into substrate transactions for throughput
//! - Lookups by content hash, by sequence number, and by
//!   first-committed-at-or-above semantics that tolerate batching gaps
//! - A forward-only [`EntryCursor`] over committed entries
//! - Signed-tree-head versioning with a cached tree size and subscriber
//!   notification whenever a new head becomes the latest
//! - A once-settable node identity token
//!
//! Merkle hashing, signing, signature validation, and entry admission are
//! all handled by other components; this layer stores what it is given.
mod config;
pub use config::{DEFAULT_BATCH_COMMIT_THRESHOLD, LogDbConfig};

mod cursor;
pub use cursor::EntryCursor;

mod db;
pub use db::LogDb;

mod error;
pub use error::StorageError;

mod notifier;
pub use notifier::TreeHeadSubscriber;

mod traits;
pub use traits::{EntryStorage, NodeStorage, TreeHeadStorage};

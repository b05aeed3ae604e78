//! Storage traits consumed by the log server.
//!
//! These are the library boundary of the persistence layer: the server and
//! its tree signer talk to the store exclusively through these traits, which
//! lets tests substitute alternative implementations.

use crate::{EntryCursor, StorageError, notifier::TreeHeadSubscriber};
use ctlog_types::{EntryHash, LogEntry, SignedTreeHead};
use std::sync::Arc;

/// Write and lookup access to sequenced log entries.
///
/// Implementations are expected to provide persistent, thread-safe,
/// append-only storage with strictly increasing sequence numbers. Because
/// entry writes are batched, lookups observe committed state only, and a
/// sequence number may be temporarily absent (assigned to a not-yet-committed
/// entry); callers must treat such gaps as absence, never as corruption.
pub trait EntryStorage {
    /// Assigns the next sequence number to `entry` and schedules it for
    /// insertion in the current batch.
    ///
    /// # Returns
    /// * `Ok(sequence)` with the assigned sequence number.
    /// * `Err(StorageError::DuplicateEntry)` if an entry with the same
    ///   content hash exists (committed or pending); the sequence counter
    ///   does not advance.
    /// * `Err(StorageError::Database)` on substrate failure.
    fn create_sequenced_entry(&self, entry: &LogEntry) -> Result<u64, StorageError>;

    /// Looks up a committed entry by its content hash.
    fn lookup_by_hash(&self, hash: &EntryHash) -> Result<LogEntry, StorageError>;

    /// Looks up a committed entry by its exact sequence number.
    ///
    /// `Err(StorageError::NotFound)` if no entry is committed at that exact
    /// number, even when entries exist at later numbers.
    fn lookup_by_index(&self, sequence: u64) -> Result<LogEntry, StorageError>;

    /// Returns the first committed entry with sequence number `>= sequence`.
    ///
    /// This is the primitive that lets readers step past sequence numbers
    /// reserved by a still-open batch.
    fn lookup_next_index(&self, sequence: u64) -> Result<LogEntry, StorageError>;

    /// Returns a forward-only cursor over committed entries with sequence
    /// number `>= start_index`.
    fn scan_entries(&self, start_index: u64) -> Result<EntryCursor, StorageError>;
}

/// Persistence and versioning of signed tree heads.
pub trait TreeHeadStorage {
    /// Persists a signed tree head durably.
    ///
    /// If its tree size exceeds every previously stored head's, it becomes
    /// the latest and all registered subscribers are notified after the
    /// store's lock has been released. Heads with equal or smaller tree size
    /// are stored but trigger no notification.
    fn write_tree_head(&self, sth: &SignedTreeHead) -> Result<(), StorageError>;

    /// Returns the stored head with the greatest tree size, ties broken by
    /// the greatest timestamp.
    fn latest_tree_head(&self) -> Result<SignedTreeHead, StorageError>;

    /// Returns the tree size of the latest head, `0` if none was written.
    fn tree_size(&self) -> u64;

    /// Registers a subscriber for new-latest-head notifications. Registering
    /// the same subscriber twice is a no-op.
    fn add_notify_sth_callback(&self, subscriber: Arc<dyn TreeHeadSubscriber>);

    /// Removes a subscriber. Removing one that was never registered is a
    /// no-op.
    fn remove_notify_sth_callback(&self, subscriber: &Arc<dyn TreeHeadSubscriber>);

    /// Re-reads the latest committed head and re-notifies every subscriber.
    ///
    /// Needed when another process shares the backing file and this process
    /// must refresh its in-memory view on an external trigger; detecting
    /// *when* to trigger is the caller's responsibility.
    fn force_notify_sth(&self) -> Result<(), StorageError>;
}

/// The once-settable node identity token.
pub trait NodeStorage {
    /// Sets the node identity if unset. Re-initializing with the stored
    /// value succeeds as a no-op; a different value is
    /// `Err(StorageError::NodeIdMismatch)`.
    fn initialize_node(&self, node_id: &str) -> Result<(), StorageError>;

    /// Reads the persisted node identity, `Err(StorageError::NotFound)` if
    /// it was never initialized.
    fn node_id(&self) -> Result<String, StorageError>;
}

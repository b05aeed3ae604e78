//! The SQLite-backed log store.
//!
//! [`LogDb`] owns the write connection and every piece of mutable store state
//! behind a single exclusive lock: the transaction batching state machine, the
//! monotonic sequence counter, and the cached tree size. Entry writes are
//! accumulated into an open substrate transaction and committed once the
//! configured threshold is reached, amortizing the per-commit durability cost
//! across many writes. Lookups go through a separate read connection and only
//! ever observe committed rows, so an open batch is invisible to readers until
//! it commits.
//!
//! Subscriber notification for new tree heads happens strictly after the
//! head's commit and strictly after the store lock has been released, so a
//! subscriber may safely call back into the store.

use crate::{
    EntryCursor, LogDbConfig, StorageError,
    notifier::{SubscriberRegistry, TreeHeadSubscriber},
    traits::{EntryStorage, NodeStorage, TreeHeadStorage},
};
use ctlog_types::{EntryHash, LogEntry, SignedTreeHead};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Schema DDL embedded at compile time, applied idempotently at open.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Mutable store state, only reachable through the [`LogDb`] lock.
///
/// Every helper that touches the batch state machine, the sequence counter,
/// or the tree-size cache is a method on this type, so holding a
/// `MutexGuard<DbInner>` is the statically checked proof that the store lock
/// is held.
#[derive(Debug)]
struct DbInner {
    /// Write connection; also carries the open batch transaction.
    conn: Connection,
    /// Read connection; sees committed state only, never writes.
    read_conn: Connection,
    /// Whether a batch transaction is currently open on `conn`.
    in_transaction: bool,
    /// Number of pending writes in the open batch.
    transaction_size: u64,
    /// Next sequence number to assign. Strictly increasing, never reused,
    /// even when a batch rolls back.
    next_sequence: u64,
    /// Cached tree size of the latest committed tree head, `0` if none.
    tree_size: u64,
    /// Makes the next commit attempt fail, exercising the rollback path.
    #[cfg(test)]
    fail_next_commit: bool,
}

impl DbInner {
    /// Opens a batch transaction if the store is idle.
    fn ensure_transaction(&mut self) -> Result<(), StorageError> {
        if !self.in_transaction {
            self.conn.execute_batch("BEGIN")?;
            self.in_transaction = true;
        }
        Ok(())
    }

    /// Commits the open batch, making every pending write durable.
    ///
    /// On commit failure the batch is rolled back in full; no partial batch
    /// is ever left visible.
    fn end_transaction(&mut self) -> Result<(), StorageError> {
        if !self.in_transaction {
            return Ok(());
        }
        let pending = self.transaction_size;
        self.in_transaction = false;
        self.transaction_size = 0;
        // Malformed statement: the commit attempt errors while the
        // transaction stays open, so the rollback branch below runs.
        #[cfg(test)]
        let commit_sql =
            if std::mem::take(&mut self.fail_next_commit) { "COMMIT GARBAGE" } else { "COMMIT" };
        #[cfg(not(test))]
        let commit_sql = "COMMIT";
        if let Err(e) = self.conn.execute_batch(commit_sql) {
            error!(target: "ctlog_storage", pending, "Batch commit failed, rolling back: {e}");
            if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                error!(target: "ctlog_storage", "Rollback after failed commit also failed: {rollback_err}");
            }
            return Err(e.into());
        }
        debug!(target: "ctlog_storage", pending, "Committed batch");
        Ok(())
    }

    /// Commits the open batch once it has grown past `threshold` writes.
    fn maybe_start_new_transaction(&mut self, threshold: u64) -> Result<(), StorageError> {
        if self.in_transaction && self.transaction_size >= threshold {
            self.end_transaction()?;
        }
        Ok(())
    }

    /// Inserts the entry row at `sequence` through the write connection, so
    /// it lands in the open batch.
    fn insert_entry(&self, sequence: u64, entry: &LogEntry) -> Result<(), rusqlite::Error> {
        self.conn
            .execute(
                "INSERT INTO entries (sequence, hash, data) VALUES (?1, ?2, ?3)",
                params![sequence, entry.hash.as_bytes(), entry.data],
            )
            .map(|_| ())
    }

    /// Re-seeds the sequence counter past every row the write connection can
    /// see, committed rows and rows pending in the open batch alike.
    ///
    /// Needed when an external process sharing the backing file has committed
    /// a row at a sequence number this store was about to assign.
    fn reseed_next_sequence(&mut self) -> Result<(), StorageError> {
        let next_sequence: u64 = self.conn.query_row(
            "SELECT COALESCE(MAX(sequence) + 1, 0) FROM entries",
            [],
            |row| row.get(0),
        )?;
        self.next_sequence = next_sequence;
        Ok(())
    }

    /// Fetches one committed entry row, mapped into a sequenced [`LogEntry`].
    fn entry_row(&self, sql: &str, sequence_or_key: impl rusqlite::ToSql) -> Result<Option<LogEntry>, StorageError> {
        let row = self
            .read_conn
            .query_row(sql, params![sequence_or_key], |row| {
                let sequence: u64 = row.get(0)?;
                let hash: Vec<u8> = row.get(1)?;
                let data: Vec<u8> = row.get(2)?;
                Ok((sequence, hash, data))
            })
            .optional()?;

        match row {
            Some((sequence, hash, data)) => {
                let hash = EntryHash::try_from(hash.as_slice())
                    .map_err(|e| StorageError::Corrupt(e.to_string()))?;
                Ok(Some(LogEntry::new(hash, data).with_sequence(sequence)))
            }
            None => Ok(None),
        }
    }

    /// Reads the committed tree head with the greatest size, ties broken by
    /// the greatest timestamp. The same query backs the cache refresh and
    /// `latest_tree_head`, so the two can never disagree.
    fn latest_tree_head_row(&self) -> Result<Option<SignedTreeHead>, StorageError> {
        self.read_conn
            .query_row(
                "SELECT tree_size, timestamp, root_hash, signature FROM tree_heads
                 ORDER BY tree_size DESC, timestamp DESC LIMIT 1",
                [],
                map_tree_head,
            )
            .optional()?
            .map(|(tree_size, timestamp, root_hash, signature)| {
                let root_hash = EntryHash::try_from(root_hash.as_slice())
                    .map_err(|e| StorageError::Corrupt(e.to_string()))?;
                Ok(SignedTreeHead { tree_size, timestamp, root_hash, signature })
            })
            .transpose()
    }

    /// Reads the committed node identity row.
    fn node_id_row(&self) -> Result<Option<String>, StorageError> {
        Ok(self
            .read_conn
            .query_row("SELECT id FROM node WHERE key = 'node_id'", [], |row| row.get(0))
            .optional()?)
    }
}

fn map_tree_head(row: &Row<'_>) -> rusqlite::Result<(u64, u64, Vec<u8>, Vec<u8>)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

/// True for a violation of a UNIQUE index (the `hash` column on `entries`).
fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _)
        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
}

/// True for a primary-key violation (an already-taken `sequence` on
/// `entries`, or an already-stored `(tree_size, timestamp)` on `tree_heads`).
fn is_primary_key_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _)
        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
}

/// The persistence layer of the log: an append-only store of sequenced
/// entries plus the signed tree heads attesting to them.
///
/// All operations are safe to call from multiple threads; a single exclusive
/// lock serializes every read and write of store state. Cursors returned by
/// [`EntryStorage::scan_entries`] read independently of that lock.
#[derive(Debug)]
pub struct LogDb {
    path: PathBuf,
    config: LogDbConfig,
    inner: Mutex<DbInner>,
    registry: SubscriberRegistry,
}

impl LogDb {
    /// Opens or creates the log store backed by the file at `path`.
    ///
    /// Applies the schema idempotently, switches the database to WAL journal
    /// mode (required for the shared-file scenario), and seeds the sequence
    /// counter and tree-size cache from committed state. Fails fast if the
    /// backing file cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>, config: LogDbConfig) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).inspect_err(|e| {
            error!(target: "ctlog_storage", path = %path.display(), "Failed to open database: {e}");
        })?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA_SQL)?;

        let read_conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        read_conn.busy_timeout(Duration::from_secs(5))?;

        let inner = DbInner {
            conn,
            read_conn,
            in_transaction: false,
            transaction_size: 0,
            next_sequence: 0,
            tree_size: 0,
            #[cfg(test)]
            fail_next_commit: false,
        };
        let db = Self { path, config, inner: Mutex::new(inner), registry: SubscriberRegistry::new() };

        {
            let mut inner = db.lock_inner();
            let next_sequence: u64 = inner.read_conn.query_row(
                "SELECT COALESCE(MAX(sequence) + 1, 0) FROM entries",
                [],
                |row| row.get(0),
            )?;
            inner.next_sequence = next_sequence;
            if let Some(sth) = inner.latest_tree_head_row()? {
                inner.tree_size = sth.tree_size;
            }
            debug!(
                target: "ctlog_storage",
                path = %db.path.display(),
                next_sequence = inner.next_sequence,
                tree_size = inner.tree_size,
                "Opened log store"
            );
        }
        Ok(db)
    }

    /// Commits any open batch, making all pending writes visible to readers.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.lock_inner().end_transaction()
    }

    fn lock_inner(&self) -> MutexGuard<'_, DbInner> {
        self.inner.lock().unwrap()
    }

    #[cfg(test)]
    fn fail_next_commit(&self) {
        self.lock_inner().fail_next_commit = true;
    }
}

impl EntryStorage for LogDb {
    fn create_sequenced_entry(&self, entry: &LogEntry) -> Result<u64, StorageError> {
        let mut inner = self.lock_inner();
        inner.ensure_transaction()?;

        let mut sequence = inner.next_sequence;
        if let Err(e) = inner.insert_entry(sequence, entry) {
            // The UNIQUE index on `hash` sees both committed rows and rows
            // pending in this batch; the sequence counter must not advance.
            if is_unique_violation(&e) {
                warn!(target: "ctlog_storage", hash = %entry.hash, "Rejected duplicate entry");
                return Err(StorageError::DuplicateEntry(entry.hash));
            }
            if !is_primary_key_violation(&e) {
                error!(target: "ctlog_storage", hash = %entry.hash, "Failed to insert entry: {e}");
                return Err(e.into());
            }
            // An external process sharing the file has committed a row at
            // this sequence number. Re-seed past it and retry once.
            warn!(
                target: "ctlog_storage",
                sequence,
                "Sequence number taken by an external writer, re-seeding counter"
            );
            inner.reseed_next_sequence()?;
            sequence = inner.next_sequence;
            if let Err(e) = inner.insert_entry(sequence, entry) {
                if is_unique_violation(&e) {
                    warn!(target: "ctlog_storage", hash = %entry.hash, "Rejected duplicate entry");
                    return Err(StorageError::DuplicateEntry(entry.hash));
                }
                error!(target: "ctlog_storage", hash = %entry.hash, "Failed to insert entry: {e}");
                return Err(e.into());
            }
        }

        inner.next_sequence = sequence + 1;
        inner.transaction_size += 1;
        debug!(target: "ctlog_storage", sequence, hash = %entry.hash, "Scheduled entry");
        inner.maybe_start_new_transaction(self.config.batch_commit_threshold)?;
        Ok(sequence)
    }

    fn lookup_by_hash(&self, hash: &EntryHash) -> Result<LogEntry, StorageError> {
        let inner = self.lock_inner();
        inner
            .entry_row(
                "SELECT sequence, hash, data FROM entries WHERE hash = ?1",
                hash.as_bytes(),
            )?
            .ok_or_else(|| {
                warn!(target: "ctlog_storage", %hash, "No entry with hash");
                StorageError::NotFound("no entry with that hash")
            })
    }

    fn lookup_by_index(&self, sequence: u64) -> Result<LogEntry, StorageError> {
        let inner = self.lock_inner();
        inner
            .entry_row("SELECT sequence, hash, data FROM entries WHERE sequence = ?1", sequence)?
            .ok_or_else(|| {
                warn!(target: "ctlog_storage", sequence, "No entry at sequence number");
                StorageError::NotFound("no entry at that sequence number")
            })
    }

    fn lookup_next_index(&self, sequence: u64) -> Result<LogEntry, StorageError> {
        let inner = self.lock_inner();
        inner
            .entry_row(
                "SELECT sequence, hash, data FROM entries
                 WHERE sequence >= ?1 ORDER BY sequence LIMIT 1",
                sequence,
            )?
            .ok_or_else(|| {
                debug!(target: "ctlog_storage", sequence, "No committed entry at or above sequence");
                StorageError::NotFound("no committed entry at or above that sequence")
            })
    }

    fn scan_entries(&self, start_index: u64) -> Result<EntryCursor, StorageError> {
        EntryCursor::open(&self.path, start_index)
    }
}

impl TreeHeadStorage for LogDb {
    fn write_tree_head(&self, sth: &SignedTreeHead) -> Result<(), StorageError> {
        let mut inner = self.lock_inner();
        inner.ensure_transaction()?;

        let insert = inner.conn.execute(
            "INSERT INTO tree_heads (tree_size, timestamp, root_hash, signature)
             VALUES (?1, ?2, ?3, ?4)",
            params![sth.tree_size, sth.timestamp, sth.root_hash.as_bytes(), sth.signature],
        );
        if let Err(e) = insert {
            if is_primary_key_violation(&e) {
                warn!(
                    target: "ctlog_storage",
                    tree_size = sth.tree_size,
                    timestamp = sth.timestamp,
                    "Rejected duplicate tree head"
                );
                return Err(StorageError::DuplicateTreeHead {
                    tree_size: sth.tree_size,
                    timestamp: sth.timestamp,
                });
            }
            error!(target: "ctlog_storage", tree_size = sth.tree_size, "Failed to insert tree head: {e}");
            return Err(e.into());
        }
        inner.transaction_size += 1;

        // Notification must follow the durable commit, so the tree head ends
        // the open batch instead of riding along in it.
        inner.end_transaction()?;

        let became_latest = sth.tree_size > inner.tree_size;
        if became_latest {
            inner.tree_size = sth.tree_size;
        }
        drop(inner);

        if became_latest {
            self.registry.notify_all(sth);
        }
        Ok(())
    }

    fn latest_tree_head(&self) -> Result<SignedTreeHead, StorageError> {
        let mut inner = self.lock_inner();
        match inner.latest_tree_head_row()? {
            Some(sth) => {
                inner.tree_size = sth.tree_size;
                Ok(sth)
            }
            None => {
                warn!(target: "ctlog_storage", "No tree head written yet");
                Err(StorageError::NotFound("no tree head written yet"))
            }
        }
    }

    fn tree_size(&self) -> u64 {
        self.lock_inner().tree_size
    }

    fn add_notify_sth_callback(&self, subscriber: Arc<dyn TreeHeadSubscriber>) {
        self.registry.add(subscriber);
    }

    fn remove_notify_sth_callback(&self, subscriber: &Arc<dyn TreeHeadSubscriber>) {
        self.registry.remove(subscriber);
    }

    fn force_notify_sth(&self) -> Result<(), StorageError> {
        let mut inner = self.lock_inner();
        let Some(sth) = inner.latest_tree_head_row()? else {
            debug!(target: "ctlog_storage", "Force notify requested with no tree head stored");
            return Ok(());
        };
        // Another process sharing the backing file may have written a newer
        // head; the cache refresh here is what picks it up.
        inner.tree_size = sth.tree_size;
        drop(inner);

        self.registry.notify_all(&sth);
        Ok(())
    }
}

impl NodeStorage for LogDb {
    fn initialize_node(&self, node_id: &str) -> Result<(), StorageError> {
        let mut inner = self.lock_inner();
        match inner.node_id_row()? {
            Some(stored) if stored == node_id => Ok(()),
            Some(stored) => {
                warn!(target: "ctlog_storage", %stored, proposed = %node_id, "Node id mismatch");
                Err(StorageError::NodeIdMismatch {
                    stored,
                    proposed: node_id.to_string(),
                })
            }
            None => {
                inner.ensure_transaction()?;
                inner
                    .conn
                    .execute("INSERT INTO node (key, id) VALUES ('node_id', ?1)", params![node_id])?;
                inner.transaction_size += 1;
                // The identity must be durable immediately; committing any
                // entries pending in the batch alongside it is harmless.
                inner.end_transaction()?;
                debug!(target: "ctlog_storage", %node_id, "Initialized node id");
                Ok(())
            }
        }
    }

    fn node_id(&self) -> Result<String, StorageError> {
        self.lock_inner()
            .node_id_row()?
            .ok_or(StorageError::NotFound("node id not initialized"))
    }
}

/// Best-effort commit of any open batch on drop.
///
/// Errors cannot propagate out of `Drop`; a failed commit here is logged and
/// the pending writes are lost, which is the same outcome as a crash before
/// the threshold commit.
impl Drop for LogDb {
    fn drop(&mut self) {
        let Ok(inner) = self.inner.get_mut() else { return };
        if inner.in_transaction {
            if let Err(e) = inner.end_transaction() {
                error!(target: "ctlog_storage", "Failed to commit open batch on drop: {e}");
            }
        }
    }
}

//! Forward-only cursor over committed log entries.

use crate::StorageError;
use ctlog_types::{EntryHash, LogEntry};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::path::Path;
use std::time::Duration;

/// A lazy, forward-only enumerator over committed entries.
///
/// The cursor owns its own read connection to the backing file, so iterating
/// never blocks writers and never takes the store's lock. Each step fetches
/// the first committed row at or above the cursor position and advances to
/// one past it, which transparently skips sequence numbers still held by an
/// open batch.
///
/// The cursor is not live: it terminates as soon as no committed entry exists
/// at or above its position, even if a writer appends more entries moments
/// later. Entries committed after the cursor's creation may or may not be
/// observed before it terminates; entries already committed at creation time
/// are never skipped or duplicated. A fresh cursor must be created to resume.
#[derive(Debug)]
pub struct EntryCursor {
    conn: Connection,
    next_index: u64,
    done: bool,
}

impl EntryCursor {
    /// Opens a cursor over `path` starting at `start_index`.
    pub(crate) fn open(path: &Path, start_index: u64) -> Result<Self, StorageError> {
        // Read-write flags without CREATE: the writer has already created the
        // file, and a WAL database cannot always be opened read-only before
        // its -shm file exists. This connection never issues a write.
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn, next_index: start_index, done: false })
    }

    fn fetch_next(&self) -> Result<Option<LogEntry>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT sequence, hash, data FROM entries
                 WHERE sequence >= ?1 ORDER BY sequence LIMIT 1",
                params![self.next_index],
                |row| {
                    let sequence: u64 = row.get(0)?;
                    let hash: Vec<u8> = row.get(1)?;
                    let data: Vec<u8> = row.get(2)?;
                    Ok((sequence, hash, data))
                },
            )
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
}

impl Iterator for EntryCursor {
    type Item = Result<LogEntry, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.fetch_next() {
            Ok(Some(entry)) => {
                // `fetch_next` only returns sequenced rows.
                self.next_index = entry.sequence.unwrap_or(self.next_index) + 1;
                Some(Ok(entry))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

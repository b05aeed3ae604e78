//! The sequenced log entry record.

use crate::EntryHash;
use serde::{Deserialize, Serialize};

/// One record accepted into the append-only log.
///
/// The `data` field is the serialized leaf as submitted by the frontend; the
/// store never inspects it. `sequence` is `None` until the store assigns a
/// sequence number at write time, after which it is immutable: entries are
/// never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Content hash uniquely identifying this entry.
    pub hash: EntryHash,

    /// Opaque serialized leaf contents.
    pub data: Vec<u8>,

    /// Sequence number assigned by the store, `None` before acceptance.
    pub sequence: Option<u64>,
}

impl LogEntry {
    /// Creates an unsequenced entry as submitted by a caller.
    pub const fn new(hash: EntryHash, data: Vec<u8>) -> Self {
        Self { hash, data, sequence: None }
    }

    /// Stamps the entry with its assigned sequence number.
    pub fn with_sequence(self, sequence: u64) -> Self {
        Self { sequence: Some(sequence), ..self }
    }
}

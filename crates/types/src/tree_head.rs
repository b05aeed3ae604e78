//! The signed tree head snapshot.

use crate::EntryHash;
use serde::{Deserialize, Serialize};

/// A signed snapshot attestation of the log's Merkle tree.
///
/// Produced and signed by the tree signer; the storage layer persists it
/// verbatim and only ever interprets `tree_size` and `timestamp` (to decide
/// which persisted head is the latest). The signature is never validated at
/// this layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTreeHead {
    /// Number of entries the tree covered when this head was signed.
    pub tree_size: u64,

    /// Signing time in milliseconds since the Unix epoch.
    pub timestamp: u64,

    /// Root hash of the Merkle tree at `tree_size`.
    pub root_hash: EntryHash,

    /// Opaque signature over the tree head.
    pub signature: Vec<u8>,
}

impl SignedTreeHead {
    /// Creates a tree head from its signed parts.
    pub const fn new(
        tree_size: u64,
        timestamp: u64,
        root_hash: EntryHash,
        signature: Vec<u8>,
    ) -> Self {
        Self { tree_size, timestamp, root_hash, signature }
    }
}

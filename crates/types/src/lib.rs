//! Core types shared across certificate-transparency log components.
//!
//! This crate defines the fundamental data structures persisted by the log:
//! the content hash that identifies a leaf, the sequenced log entry itself,
//! and the signed tree head attesting to the Merkle tree built over the
//! entries. Hashing, signing, and signature validation all happen in other
//! components; these types carry the results around as opaque bytes.
mod hash;
pub use hash::{EntryHash, InvalidHashLength};
mod entry;
pub use entry::LogEntry;
mod tree_head;
pub use tree_head::SignedTreeHead;

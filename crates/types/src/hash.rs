//! Content hash identifying a log entry.

use serde::{Deserialize, Serialize};

/// Number of bytes in an [`EntryHash`] (SHA-256 output size).
pub const ENTRY_HASH_LEN: usize = 32;

/// The content hash of a log entry.
///
/// Entries are keyed by the SHA-256 hash of their serialized leaf; the hash is
/// computed by the submission frontend before the entry reaches storage. The
/// store treats it as an opaque, fixed-size, unique key.
#[derive(
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::From,
)]
pub struct EntryHash([u8; ENTRY_HASH_LEN]);

impl EntryHash {
    /// Wraps a raw 32-byte digest.
    pub const fn new(bytes: [u8; ENTRY_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    pub const fn as_bytes(&self) -> &[u8; ENTRY_HASH_LEN] {
        &self.0
    }
}

impl AsRef<[u8]> for EntryHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A byte slice had the wrong length to be an [`EntryHash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidHashLength(pub usize);

impl core::fmt::Display for InvalidHashLength {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "expected {ENTRY_HASH_LEN} hash bytes, got {}", self.0)
    }
}

impl core::error::Error for InvalidHashLength {}

impl TryFrom<&[u8]> for EntryHash {
    type Error = InvalidHashLength;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; ENTRY_HASH_LEN] =
            bytes.try_into().map_err(|_| InvalidHashLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl core::fmt::Display for EntryHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl core::fmt::Debug for EntryHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "EntryHash({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_lowercase_hex() {
        let hash = EntryHash::new([0xab; 32]);
        assert_eq!(hash.to_string(), "ab".repeat(32));
    }

    #[test]
    fn try_from_accepts_exactly_32_bytes() {
        let bytes = [7u8; 32];
        let hash = EntryHash::try_from(&bytes[..]).expect("32 bytes must convert");
        assert_eq!(hash.as_bytes(), &bytes);

        let err = EntryHash::try_from(&bytes[..31]).unwrap_err();
        assert_eq!(err, InvalidHashLength(31));
    }
}

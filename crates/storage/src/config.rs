//! Tunables for the log store.

/// Default number of pending writes that triggers a batch commit.
pub const DEFAULT_BATCH_COMMIT_THRESHOLD: u64 = 200;

/// Configuration for a [`LogDb`](crate::LogDb).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogDbConfig {
    /// Number of pending writes accumulated in the open batch before the
    /// store commits it.
    ///
    /// Committing on every entry write would pay the substrate's fsync cost
    /// per entry; batching amortizes it at the price of a bounded delay
    /// before new entries become visible to readers. A threshold of 1
    /// commits every write immediately.
    pub batch_commit_threshold: u64,
}

impl LogDbConfig {
    /// Creates a config with the given batch commit threshold.
    pub const fn new(batch_commit_threshold: u64) -> Self {
        Self { batch_commit_threshold }
    }
}

impl Default for LogDbConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_COMMIT_THRESHOLD)
    }
}

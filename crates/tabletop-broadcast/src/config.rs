//! Broadcaster configuration.

use std::time::Duration;

/// Delivery mode and batching bounds of a [`crate::StateBroadcaster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcasterConfig {
    /// Queue broadcasts and deliver them in merged batches. When `false`,
    /// every broadcast is sent as soon as it is made.
    pub enable_batching: bool,
    /// Queue length that triggers an immediate flush.
    pub max_batch_size: usize,
    /// Longest time the first queued broadcast waits before a flush.
    pub batch_delay: Duration,
}

impl BroadcasterConfig {
    /// Default queue length that triggers a flush.
    pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;
    /// Default debounce delay.
    pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(50);

    /// A configuration that sends every broadcast immediately.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            enable_batching: false,
            ..Self::default()
        }
    }
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            enable_batching: true,
            max_batch_size: Self::DEFAULT_MAX_BATCH_SIZE,
            batch_delay: Self::DEFAULT_BATCH_DELAY,
        }
    }
}

//! Tunables for the sync layer.

use std::time::Duration;

use super::constants::{
    ADMIN_LIST_POLL_INTERVAL, COMPRESS_MIN_SIZE, DEFAULT_COMPRESSION_LEVEL, FRAGMENT_EXPIRY,
    FRAGMENT_SLICE_SIZE, MAX_DECOMPRESSED_SIZE, MAX_SEND_QUEUE, SEND_QUEUE_TIMEOUT,
};

/// Sync configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Payloads strictly larger than this are compressed.
    pub compress_min_size: usize,

    /// Payloads strictly larger than this are fragmented into slices of this size.
    pub fragment_slice_size: usize,

    /// Sending pauses while the peer queue is deeper than this.
    pub max_send_queue: usize,

    /// How long a send may wait for the queue to drain before the peer is dropped.
    pub send_queue_timeout: Duration,

    /// Lifetime of an incomplete inbound fragmented transfer.
    pub fragment_expiry: Duration,

    /// zstd level (1-22).
    pub compression_level: i32,

    /// Upper bound for a decompressed payload.
    pub max_decompressed_size: usize,

    /// Interval between admin allow-list comparisons (server only).
    pub admin_poll_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            compress_min_size: COMPRESS_MIN_SIZE,
            fragment_slice_size: FRAGMENT_SLICE_SIZE,
            max_send_queue: MAX_SEND_QUEUE,
            send_queue_timeout: SEND_QUEUE_TIMEOUT,
            fragment_expiry: FRAGMENT_EXPIRY,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_decompressed_size: MAX_DECOMPRESSED_SIZE,
            admin_poll_interval: ADMIN_LIST_POLL_INTERVAL,
        }
    }
}

/// Builder for [`SyncConfig`].
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Start from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the compression threshold.
    pub fn compress_min_size(mut self, size: usize) -> Self {
        self.config.compress_min_size = size;
        self
    }

    /// Set the fragment slice size.
    pub fn fragment_slice_size(mut self, size: usize) -> Self {
        self.config.fragment_slice_size = size.max(1);
        self
    }

    /// Set the backpressure limit.
    pub fn max_send_queue(mut self, depth: usize) -> Self {
        self.config.max_send_queue = depth;
        self
    }

    /// Set the backpressure timeout.
    pub fn send_queue_timeout(mut self, timeout: Duration) -> Self {
        self.config.send_queue_timeout = timeout;
        self
    }

    /// Set the reassembly expiry window.
    pub fn fragment_expiry(mut self, expiry: Duration) -> Self {
        self.config.fragment_expiry = expiry;
        self
    }

    /// Set the zstd level.
    pub fn compression_level(mut self, level: i32) -> Self {
        self.config.compression_level = level.clamp(1, 22);
        self
    }

    /// Set the decompressed size limit.
    pub fn max_decompressed_size(mut self, size: usize) -> Self {
        self.config.max_decompressed_size = size;
        self
    }

    /// Set the admin allow-list poll interval.
    pub fn admin_poll_interval(mut self, interval: Duration) -> Self {
        self.config.admin_poll_interval = interval;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> SyncConfig {
        self.config
    }
}

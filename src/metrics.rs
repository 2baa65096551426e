//! Client-facing metrics (§3 `ClientMetrics`) — monotonic counters owned by
//! the [`crate::client::Client`] facade for its whole lifetime and shared
//! by reference into whichever pipeline is currently running.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ClientMetrics {
    blocks_generated: AtomicU64,
    blocks_reused: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    bytes_uploaded_original: AtomicU64,
    bytes_stored: AtomicU64,
    files_uploaded: AtomicU64,
    files_downloaded: AtomicU64,
}

/// Point-in-time snapshot of [`ClientMetrics`], returned by
/// [`crate::client::Client::metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub blocks_generated: u64,
    pub blocks_reused: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub bytes_uploaded_original: u64,
    pub bytes_stored: u64,
    pub files_uploaded: u64,
    pub files_downloaded: u64,
}

impl ClientMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_block_generated(&self) {
        self.blocks_generated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_block_reused(&self) {
        self.blocks_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_uploaded_original(&self, n: u64) {
        self.bytes_uploaded_original.fetch_add(n, Ordering::Relaxed);
    }

    /// `n` is conventionally `3 * anonymized_block_size` — one anonymized
    /// block is always backed by three equal-size stored blocks (itself
    /// plus two randomizers), whether or not those randomizers were
    /// freshly minted for this call.
    pub fn add_bytes_stored(&self, n: u64) {
        self.bytes_stored.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_file_uploaded(&self) {
        self.files_uploaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_downloaded(&self) {
        self.files_downloaded.fetch_add(1, Ordering::Relaxed);
    }

    /// `blocks_reused / (blocks_reused + blocks_generated)`, or `0.0` when
    /// no randomizers have been drawn yet.
    pub fn reuse_rate(&self) -> f64 {
        let reused = self.blocks_reused.load(Ordering::Relaxed) as f64;
        let generated = self.blocks_generated.load(Ordering::Relaxed) as f64;
        if reused + generated == 0.0 {
            0.0
        } else {
            reused / (reused + generated)
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_generated: self.blocks_generated.load(Ordering::Relaxed),
            blocks_reused: self.blocks_reused.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            bytes_uploaded_original: self.bytes_uploaded_original.load(Ordering::Relaxed),
            bytes_stored: self.bytes_stored.load(Ordering::Relaxed),
            files_uploaded: self.files_uploaded.load(Ordering::Relaxed),
            files_downloaded: self.files_downloaded.load(Ordering::Relaxed),
        }
    }
}

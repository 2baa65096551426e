//! Configuration recognized by the core (§6).
//!
//! Everything else — CLI flags, env vars, config files, logging setup, TLS,
//! pub-sub, search, sync, FUSE — belongs to external collaborators and is
//! not constrained by this crate. `Config` is a plain struct, the same
//! shape as the teacher codebase's `PackOptions`: no file or environment
//! parsing lives here.

/// Default block size: 128 KiB.
pub const DEFAULT_BLOCK_SIZE: usize = 131_072;

/// Default bound on in-flight pipeline bytes: 16 MiB.
pub const DEFAULT_MEMORY_LIMIT: usize = 16 * 1024 * 1024;

/// Default inter-stage queue depth (slots per worker).
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 4;

/// Default worker count per pipeline stage.
pub const DEFAULT_MAX_CONCURRENT_OPS: usize = 4;

/// Default resident cache capacity: 64 MiB.
pub const DEFAULT_CACHE_CAPACITY_BYTES: u64 = 64 * 1024 * 1024;

/// Default backend deadline.
pub const DEFAULT_BACKEND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Default retry budget for transient backend errors.
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct Config {
    /// Size of every block the splitter emits, in bytes (the final block of
    /// a file is zero-padded up to this size).
    pub block_size: usize,
    /// Upper bound on the sum of in-flight block bytes across all pipeline
    /// stages. The splitter blocks on intake once this is reached.
    pub memory_limit: usize,
    /// Depth of the bounded queue between adjacent pipeline stages.
    pub stream_buffer_size: usize,
    /// Worker thread count per pipeline stage.
    pub max_concurrent_ops: usize,
    /// Total resident bytes the block cache may hold.
    pub cache_capacity_bytes: u64,
    /// Floor below which the personal cache partition is never evicted
    /// (unless personal working set already exceeds it). `0` disables
    /// two-tier partitioning — the cache then behaves as a single pool.
    pub min_personal_cache_bytes: u64,
    /// Deadline applied to every backend `put`/`get`/`has` call.
    pub backend_timeout: std::time::Duration,
    /// Maximum attempts (including the first) for a transient backend error.
    pub retry_max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            stream_buffer_size: DEFAULT_STREAM_BUFFER_SIZE,
            max_concurrent_ops: DEFAULT_MAX_CONCURRENT_OPS,
            cache_capacity_bytes: DEFAULT_CACHE_CAPACITY_BYTES,
            min_personal_cache_bytes: 0,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
        }
    }
}

impl Config {
    /// Whether two-tier cache partitioning is enabled for this config.
    #[inline]
    pub fn partitioned_cache(&self) -> bool {
        self.min_personal_cache_bytes > 0
    }
}

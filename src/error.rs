//! Error taxonomy for the OFFSystem block-anonymization engine.
//!
//! Every fallible core operation returns `Result<T, NoiseFsError>`. The
//! variants mirror the error kinds and policies of the specification:
//! `NotFound`/`PermanentIO` are fatal, `TransientIO`/`Timeout` are retried
//! with backoff before being surfaced, and `Cancelled`/`MissingBlock` signal
//! internal pipeline conditions that must never leak partial state.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NoiseFsError {
    /// Backend reports the CID absent. Fatal for the operation.
    #[error("block not found: {0}")]
    NotFound(String),

    /// Backend network/IO failure judged retryable.
    #[error("transient backend error: {0}")]
    TransientIO(String),

    /// Backend deadline expired; classified as transient for retry purposes.
    #[error("backend operation timed out")]
    Timeout,

    /// Backend signalled a permanent failure. Fatal.
    #[error("permanent backend error: {0}")]
    PermanentIO(String),

    /// XOR operands differed in length — indicates descriptor/data corruption.
    #[error("size mismatch: expected {expected} bytes, got {actual} bytes")]
    SizeMismatch { expected: usize, actual: usize },

    /// Reconstructed bytes did not match `original_size`, or a descriptor
    /// invariant failed.
    #[error("integrity error: {0}")]
    IntegrityError(String),

    /// Encrypted descriptor failed AEAD verification. Indistinguishable from
    /// a wrong password by design.
    #[error("authentication failed — wrong password or corrupted descriptor")]
    AuthFailure,

    /// Encrypted descriptor loaded without a password.
    #[error("descriptor is encrypted; a password is required")]
    NeedsKey,

    /// A descriptor wire format version this build does not support.
    #[error("unsupported descriptor format version {0}")]
    UnsupportedVersion(u8),

    /// External cancel signal observed. No partial state is persisted.
    #[error("operation cancelled")]
    Cancelled,

    /// Upload finalization found an unfilled ordinal. Indicates a pipeline bug.
    #[error("missing block at ordinal {0}")]
    MissingBlock(u64),

    /// Key derivation or encryption primitive failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Serialization/deserialization failure for a descriptor or index.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying byte-source/sink I/O failure (not the backend).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl NoiseFsError {
    /// Whether this error is one the retry policy should act on.
    pub fn is_transient(&self) -> bool {
        matches!(self, NoiseFsError::TransientIO(_) | NoiseFsError::Timeout)
    }
}

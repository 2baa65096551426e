//! The content-addressed backend the core consumes (§4.3).
//!
//! The backend is deliberately narrow: `put`/`get`/`has`. The spec does not
//! define what backs it — IPFS, a local CAS directory, anything — so the
//! core only depends on the [`Backend`] trait, dispatched at construction
//! time the way the teacher codebase dispatches codecs through the `Codec`
//! trait rather than a hardcoded match on format.
//!
//! Two implementations ship with the core for development and testing:
//! [`memory::MemoryBackend`] (pure in-memory, used throughout the test
//! suite) and [`fs::FsBackend`] (a minimal content-addressed directory on
//! local disk). A production deployment fronting IPFS or another CAS is an
//! external collaborator implementing the same trait.

pub mod fs;
pub mod memory;

use crate::error::NoiseFsError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque, comparable, hashable content identifier issued by the backend
/// on `put` and accepted on `get`/`has`. The core never inspects its
/// contents beyond byte-equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cid(String);

impl Cid {
    pub fn new(s: impl Into<String>) -> Self {
        Cid(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Minimal contract exposed to the core. Implementations must distinguish
/// `NotFound` (the CID is genuinely absent) from `TransientIO` (a retryable
/// network/IO hiccup) and `PermanentIO` (a fatal backend-side failure) —
/// the pipeline's retry policy (§4.7, §4.8) depends on that distinction.
pub trait Backend: Send + Sync {
    /// Store a block, returning the CID the backend assigns to it.
    fn put(&self, block: &crate::block::Block) -> Result<Cid, NoiseFsError>;

    /// Retrieve a previously stored block.
    fn get(&self, cid: &Cid) -> Result<crate::block::Block, NoiseFsError>;

    /// Approximate membership check. May return `false` for a CID that
    /// would in fact succeed on `get` (e.g. under eventual consistency);
    /// callers must not treat a `true`/`false` result as authoritative
    /// where correctness depends on it.
    fn has(&self, cid: &Cid) -> bool;
}

//! The descriptor data model (§3) — the per-file record that lets the
//! system find and reconstruct a file from anonymized blocks.
//!
//! A `Descriptor` is created at upload start, populated in original block
//! order as the upload pipeline's XOR+store stages complete (§4.7 Stage D
//! owns it exclusively during that window), finalized and persisted exactly
//! once, and immutable thereafter. The download pipeline only ever reads
//! one (§4.8).

pub mod store;

use crate::backend::Cid;
use serde::{Deserialize, Serialize};

/// Current descriptor format marker. Bumped only on a breaking field change.
pub const DESCRIPTOR_VERSION: u32 = 1;

/// An ordered `(dataCID, randomizer1CID, randomizer2CID)` triple. All three
/// resolve to blocks of equal length; `r1 != r2` and both differ from the
/// data CID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockTriple {
    pub data_cid: Cid,
    pub r1_cid: Cid,
    pub r2_cid: Cid,
}

impl BlockTriple {
    pub fn new(data_cid: Cid, r1_cid: Cid, r2_cid: Cid) -> Self {
        Self {
            data_cid,
            r1_cid,
            r2_cid,
        }
    }
}

/// The file-level record described in §3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Descriptor {
    pub filename: String,
    pub original_size: u64,
    pub block_size: u32,
    pub blocks: Vec<BlockTriple>,
    pub version: u32,
    pub is_directory: bool,
}

impl Descriptor {
    pub fn new(filename: impl Into<String>, original_size: u64, block_size: u32) -> Self {
        Self {
            filename: filename.into(),
            original_size,
            block_size,
            blocks: Vec::new(),
            version: DESCRIPTOR_VERSION,
            is_directory: false,
        }
    }

    /// Expected number of blocks for this descriptor's declared size:
    /// `ceil(original_size / block_size)`, or zero for an empty file.
    pub fn expected_block_count(&self) -> u64 {
        if self.original_size == 0 {
            0
        } else {
            (self.original_size + self.block_size as u64 - 1) / self.block_size as u64
        }
    }

    /// Pure function over the `is_directory` discriminant (§4.6).
    pub fn is_directory(&self) -> bool {
        self.is_directory
    }
}

//! # noisefs-core — the OFFSystem block-anonymization engine
//!
//! Format guarantees:
//! - A file is split into fixed-size blocks and every block is stored only
//!   after being XOR'd against two randomizer blocks — the backend never
//!   holds a plaintext fragment of any uploaded file.
//! - Randomizer blocks are themselves ordinary content-addressed blocks,
//!   reused across uploads to grow the set of files a given block could
//!   plausibly belong to.
//! - A descriptor (filename, size, ordered block triples) is the only
//!   record that lets a CID be turned back into a file; it is stored
//!   separately from block data and may itself be encrypted.
//! - The engine is backend-agnostic: anything implementing [`Backend`]
//!   (put/get/has over a content identifier) can sit underneath it.
//!
//! This crate is the engine only — CLI surfaces, network transport, peer
//! discovery, and persistence of configuration belong to embedding
//! applications.

pub mod backend;
pub mod block;
pub mod cache;
pub mod client;
pub mod config;
pub mod crypto;
pub mod descriptor;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod randomizer;
pub mod splitter;

// Flat re-exports for the most common types.
pub use backend::{Backend, Cid};
pub use block::Block;
pub use cache::{BlockCache, Cache, CacheStats, Partition};
pub use client::Client;
pub use config::Config;
pub use crypto::CryptoError;
pub use descriptor::store::DescriptorStore;
pub use descriptor::{BlockTriple, Descriptor};
pub use error::NoiseFsError;
pub use metrics::{ClientMetrics, MetricsSnapshot};
pub use pipeline::{CancellationToken, MemoryGate};
pub use randomizer::{RandomizerPool, RandomizerSource};
pub use splitter::{Assembler, BlockSink, Splitter, VecAssembler};

//! In-memory mock [`Backend`] — the backend every integration test in this
//! crate runs against (§6: "a mock backend storing in memory must be
//! implementable for tests").

use super::{Backend, Cid};
use crate::block::Block;
use crate::error::NoiseFsError;
use std::collections::HashMap;
use std::sync::RwLock;

/// CAS keyed on BLAKE3 of the block's bytes, so identical blocks — which is
/// exactly what randomizer reuse produces — collapse to one entry.
#[derive(Default)]
pub struct MemoryBackend {
    store: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blocks currently stored.
    pub fn len(&self) -> usize {
        self.store.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cid_for(block: &Block) -> Cid {
    Cid::new(hex::encode(block.content_hash()))
}

impl Backend for MemoryBackend {
    fn put(&self, block: &Block) -> Result<Cid, NoiseFsError> {
        let cid = cid_for(block);
        self.store
            .write()
            .unwrap()
            .insert(cid.as_str().to_owned(), block.as_bytes().to_vec());
        Ok(cid)
    }

    fn get(&self, cid: &Cid) -> Result<Block, NoiseFsError> {
        self.store
            .read()
            .unwrap()
            .get(cid.as_str())
            .map(|bytes| Block::new(bytes.clone()))
            .ok_or_else(|| NoiseFsError::NotFound(cid.to_string()))
    }

    fn has(&self, cid: &Cid) -> bool {
        self.store.read().unwrap().contains_key(cid.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_roundtrips() {
        let backend = MemoryBackend::new();
        let block = Block::new(b"some bytes".to_vec());
        let cid = backend.put(&block).unwrap();
        assert_eq!(backend.get(&cid).unwrap(), block);
    }

    #[test]
    fn identical_blocks_dedup_to_one_cid() {
        let backend = MemoryBackend::new();
        let a = Block::new(vec![1, 2, 3]);
        let b = Block::new(vec![1, 2, 3]);
        let cid_a = backend.put(&a).unwrap();
        let cid_b = backend.put(&b).unwrap();
        assert_eq!(cid_a, cid_b);
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn unknown_cid_is_not_found() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.get(&Cid::new("nonexistent")),
            Err(NoiseFsError::NotFound(_))
        ));
        assert!(!backend.has(&Cid::new("nonexistent")));
    }
}

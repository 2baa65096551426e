//! Block — the fixed-size, content-agnostic unit the whole engine moves.
//!
//! A [`Block`] is an immutable byte sequence of length ≤ `block_size`. Within
//! a single file every block the splitter emits has length exactly
//! `block_size`; the assembler trims the final block back down to the
//! file's true size on reassembly (§4.2).
//!
//! # XOR algebra
//! `xor3(a, b, c)` requires all three operands to share a length and returns
//! a new block of that length. XOR is its own inverse:
//! `a ⊕ b ⊕ c ⊕ b ⊕ c = a`. This is the entire anonymization primitive —
//! there is no compression and no format-specific header on a `Block`
//! itself; identity (the CID) is assigned by the backend on `put`, not
//! carried by the value.

use crate::error::NoiseFsError;
use rand::RngCore;

/// An immutable, fixed-length byte container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block(Vec<u8>);

impl Block {
    /// Wrap `bytes` as a block. Does not validate against any configured
    /// block size — callers that must enforce `block_size` do so explicitly
    /// (the splitter is the only place padding/truncation happens).
    pub fn new(bytes: Vec<u8>) -> Self {
        Block(bytes)
    }

    /// Number of bytes in this block.
    #[inline]
    pub fn size(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Generate `n` bytes of cryptographically secure random data.
    ///
    /// Used to mint fresh randomizer blocks when the pool has no eligible
    /// reuse candidate (§4.5).
    pub fn random(n: usize) -> Self {
        let mut buf = vec![0u8; n];
        rand::rngs::OsRng.fill_bytes(&mut buf);
        Block(buf)
    }

    /// `self ⊕ a ⊕ b`, producing a new block of the same length.
    ///
    /// Fails with [`NoiseFsError::SizeMismatch`] if `a` or `b` differ in
    /// length from `self` — this always indicates corrupted input (a
    /// mismatched descriptor triple, or a backend returning the wrong
    /// block), never a recoverable condition.
    pub fn xor3(&self, a: &Block, b: &Block) -> Result<Block, NoiseFsError> {
        if a.size() != self.size() {
            return Err(NoiseFsError::SizeMismatch {
                expected: self.size(),
                actual: a.size(),
            });
        }
        if b.size() != self.size() {
            return Err(NoiseFsError::SizeMismatch {
                expected: self.size(),
                actual: b.size(),
            });
        }

        let mut out = Vec::with_capacity(self.size());
        for i in 0..self.size() {
            out.push(self.0[i] ^ a.0[i] ^ b.0[i]);
        }
        Ok(Block(out))
    }

    /// BLAKE3 content hash. Used by the mock/filesystem backends as a CID
    /// and, more generally, anywhere a stable identity for a byte string is
    /// needed outside the opaque `Cid` the real backend issues.
    pub fn content_hash(&self) -> [u8; 32] {
        blake3::hash(&self.0).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_is_its_own_inverse() {
        let plain = Block::new(b"hello, noisefs!!".to_vec());
        let r1 = Block::random(plain.size());
        let r2 = Block::random(plain.size());

        let anon = plain.xor3(&r1, &r2).unwrap();
        let recovered = anon.xor3(&r1, &r2).unwrap();

        assert_eq!(recovered, plain);
    }

    #[test]
    fn xor_rejects_size_mismatch() {
        let a = Block::new(vec![0u8; 8]);
        let b = Block::new(vec![0u8; 4]);
        let c = Block::new(vec![0u8; 8]);
        assert!(matches!(
            a.xor3(&b, &c),
            Err(NoiseFsError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn random_blocks_have_requested_size() {
        let b = Block::random(4096);
        assert_eq!(b.size(), 4096);
    }

    #[test]
    fn anonymized_block_never_equals_plaintext() {
        let plain = Block::new(vec![0xABu8; 256]);
        let r1 = Block::random(256);
        let r2 = Block::random(256);
        let anon = plain.xor3(&r1, &r2).unwrap();
        // Overwhelmingly likely with random operands; a collision would
        // indicate the randomizers were degenerate (all zero).
        assert_ne!(anon.as_bytes(), plain.as_bytes());
    }
}

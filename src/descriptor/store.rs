//! Descriptor persistence (§4.6) — serializes a [`Descriptor`] to the wire
//! format in §6 and stores/retrieves it through a [`Backend`], transparently
//! handling the plaintext/encrypted split.
//!
//! # Wire format
//! ```text
//! plaintext:  0x01 || serde_json(Descriptor)
//! encrypted:  0x02 || kdf_id(1 B) || salt(16 B) || nonce(12 B) || ciphertext || tag(16 B)
//! ```
//! `kdf_id` is reserved for future KDF migration; `0x00` means Argon2id with
//! the parameters fixed in [`crate::crypto::derive_key`]. Any other leading
//! byte is rejected as [`NoiseFsError::UnsupportedVersion`] — this is how a
//! legacy two-tuple descriptor format (if one is ever encountered) is
//! refused rather than silently misparsed (§9 open question).

use crate::backend::{Backend, Cid};
use crate::block::Block;
use crate::crypto::{self, CryptoError};
use crate::descriptor::Descriptor;
use crate::error::NoiseFsError;
use std::sync::Arc;

const FORMAT_PLAINTEXT: u8 = 0x01;
const FORMAT_ENCRYPTED: u8 = 0x02;
const KDF_ARGON2ID: u8 = 0x00;

impl From<CryptoError> for NoiseFsError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::DecryptionFailed => NoiseFsError::AuthFailure,
            other => NoiseFsError::Crypto(other.to_string()),
        }
    }
}

/// Persists and loads descriptors against a content-addressed [`Backend`].
///
/// A descriptor is itself stored as an ordinary block, so its CID is just
/// whatever the backend assigns on `put` — there is no separate descriptor
/// namespace.
pub struct DescriptorStore {
    backend: Arc<dyn Backend>,
}

impl DescriptorStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Serialize and store `descriptor` in plaintext. Returns its CID.
    pub fn save(&self, descriptor: &Descriptor) -> Result<Cid, NoiseFsError> {
        let json = serde_json::to_vec(descriptor)?;
        let mut wire = Vec::with_capacity(1 + json.len());
        wire.push(FORMAT_PLAINTEXT);
        wire.extend_from_slice(&json);
        self.backend.put(&Block::new(wire))
    }

    /// Load and deserialize a plaintext descriptor. Returns
    /// [`NoiseFsError::NeedsKey`] if `cid` refers to an encrypted descriptor.
    pub fn load(&self, cid: &Cid) -> Result<Descriptor, NoiseFsError> {
        let block = self.backend.get(cid)?;
        let bytes = block.as_bytes();
        match bytes.first() {
            Some(&FORMAT_PLAINTEXT) => {
                let descriptor: Descriptor = serde_json::from_slice(&bytes[1..])?;
                Ok(descriptor)
            }
            Some(&FORMAT_ENCRYPTED) => Err(NoiseFsError::NeedsKey),
            Some(&other) => Err(NoiseFsError::UnsupportedVersion(other)),
            None => Err(NoiseFsError::IntegrityError("empty descriptor block".into())),
        }
    }

    /// Serialize, encrypt with a key derived from `password`, and store
    /// `descriptor`. Returns its CID.
    pub fn encrypted_save(
        &self,
        descriptor: &Descriptor,
        password: &str,
    ) -> Result<Cid, NoiseFsError> {
        let json = serde_json::to_vec(descriptor)?;
        let salt = crypto::random_salt();
        let key = crypto::derive_key(password, &salt)?;
        let ciphertext = crypto::encrypt(&key, &json)?;

        let mut wire = Vec::with_capacity(2 + salt.len() + ciphertext.len());
        wire.push(FORMAT_ENCRYPTED);
        wire.push(KDF_ARGON2ID);
        wire.extend_from_slice(&salt);
        wire.extend_from_slice(&ciphertext);
        self.backend.put(&Block::new(wire))
    }

    /// Load, decrypt with a key derived from `password`, and deserialize an
    /// encrypted descriptor. Returns [`NoiseFsError::AuthFailure`] on a wrong
    /// password or tampered ciphertext, and [`NoiseFsError::NeedsKey`] if
    /// `cid` refers to a plaintext descriptor (no key needed, call [`load`]
    /// instead).
    ///
    /// [`load`]: DescriptorStore::load
    pub fn encrypted_load(&self, cid: &Cid, password: &str) -> Result<Descriptor, NoiseFsError> {
        let block = self.backend.get(cid)?;
        let bytes = block.as_bytes();
        match bytes.first() {
            Some(&FORMAT_ENCRYPTED) => {}
            Some(&FORMAT_PLAINTEXT) => return Err(NoiseFsError::NeedsKey),
            Some(&other) => return Err(NoiseFsError::UnsupportedVersion(other)),
            None => {
                return Err(NoiseFsError::IntegrityError(
                    "empty descriptor block".into(),
                ))
            }
        }

        const SALT_LEN: usize = crypto::SALT_LEN;
        let rest = &bytes[1..];
        let kdf_id = *rest
            .first()
            .ok_or_else(|| NoiseFsError::IntegrityError("truncated descriptor header".into()))?;
        if kdf_id != KDF_ARGON2ID {
            return Err(NoiseFsError::UnsupportedVersion(kdf_id));
        }
        let rest = &rest[1..];
        if rest.len() < SALT_LEN {
            return Err(NoiseFsError::IntegrityError("truncated descriptor salt".into()));
        }
        let (salt, ciphertext) = rest.split_at(SALT_LEN);

        let key = crypto::derive_key(password, salt)?;
        let plaintext = crypto::decrypt(&key, ciphertext)?;
        let descriptor: Descriptor = serde_json::from_slice(&plaintext)?;
        Ok(descriptor)
    }

    /// Whether the descriptor at `cid` is stored encrypted, without needing
    /// a password. Errors the same way [`load`](DescriptorStore::load) does
    /// for a missing/unreadable CID.
    pub fn is_encrypted(&self, cid: &Cid) -> Result<bool, NoiseFsError> {
        let block = self.backend.get(cid)?;
        match block.as_bytes().first() {
            Some(&FORMAT_PLAINTEXT) => Ok(false),
            Some(&FORMAT_ENCRYPTED) => Ok(true),
            Some(&other) => Err(NoiseFsError::UnsupportedVersion(other)),
            None => Err(NoiseFsError::IntegrityError("empty descriptor block".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    fn store() -> DescriptorStore {
        DescriptorStore::new(Arc::new(MemoryBackend::new()))
    }

    fn sample() -> Descriptor {
        let mut d = Descriptor::new("report.pdf", 4096, 1024);
        d.blocks.push(crate::descriptor::BlockTriple::new(
            Cid::new("data-0"),
            Cid::new("r1-0"),
            Cid::new("r2-0"),
        ));
        d
    }

    #[test]
    fn plaintext_roundtrip() {
        let store = store();
        let d = sample();
        let cid = store.save(&d).unwrap();
        let loaded = store.load(&cid).unwrap();
        assert_eq!(loaded, d);
        assert!(!store.is_encrypted(&cid).unwrap());
    }

    #[test]
    fn encrypted_roundtrip() {
        let store = store();
        let d = sample();
        let cid = store.encrypted_save(&d, "hunter2").unwrap();
        let loaded = store.encrypted_load(&cid, "hunter2").unwrap();
        assert_eq!(loaded, d);
        assert!(store.is_encrypted(&cid).unwrap());
    }

    #[test]
    fn encrypted_load_rejects_wrong_password() {
        let store = store();
        let cid = store.encrypted_save(&sample(), "hunter2").unwrap();
        let err = store.encrypted_load(&cid, "wrong").unwrap_err();
        assert!(matches!(err, NoiseFsError::AuthFailure));
    }

    #[test]
    fn load_on_encrypted_descriptor_needs_key() {
        let store = store();
        let cid = store.encrypted_save(&sample(), "hunter2").unwrap();
        let err = store.load(&cid).unwrap_err();
        assert!(matches!(err, NoiseFsError::NeedsKey));
    }

    #[test]
    fn encrypted_load_on_plaintext_descriptor_needs_key() {
        let store = store();
        let cid = store.save(&sample()).unwrap();
        let err = store.encrypted_load(&cid, "hunter2").unwrap_err();
        assert!(matches!(err, NoiseFsError::NeedsKey));
    }

    #[test]
    fn unknown_version_byte_is_rejected() {
        let store = store();
        let cid = store
            .backend
            .put(&Block::new(vec![0x7f, 1, 2, 3]))
            .unwrap();
        let err = store.load(&cid).unwrap_err();
        assert!(matches!(err, NoiseFsError::UnsupportedVersion(0x7f)));
    }
}

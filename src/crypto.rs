//! AES-256-GCM encryption and Argon2id key derivation for encrypted
//! descriptors (§3 `EncryptedDescriptor`, §4.6).
//!
//! Key derivation: Argon2id(password, salt) → 32-byte key. The salt is a
//! fresh random 16 bytes generated per `encrypted_save` call (not derived
//! from anything persistent), so the same password never reuses a key
//! across descriptors.
//!
//! Encryption: AES-256-GCM, nonce prepended to ciphertext.
//! Encrypted payload layout: `nonce (12 B) || ciphertext || GCM tag (16 B)`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng};
use aes_gcm::Aes256Gcm;
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use thiserror::Error;

/// Byte length of the AES-GCM nonce prepended to every encrypted payload.
pub const NONCE_LEN: usize = 12;
/// Byte length of the random salt used to derive the per-descriptor key.
pub const SALT_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed — wrong password or corrupted data")]
    DecryptionFailed,
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("encrypted payload too short (minimum {NONCE_LEN} bytes)")]
    TooShort,
}

/// Generate a fresh random salt for `derive_key`.
pub fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit encryption key from a password and salt using Argon2id.
///
/// Parameters (64 MiB memory, 3 iterations, 1 lane) are a conservative,
/// deployment-tunable choice — the spec fixes only that a memory-hard KDF
/// must be used (§3, §9 open question).
pub fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; 32], CryptoError> {
    let params = Params::new(64 * 1024, 3, 1, Some(32))
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Encrypt `plaintext` with AES-256-GCM using a random nonce.
/// Returns `nonce (12 B) || ciphertext || GCM-tag (16 B)`.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::EncryptionFailed)?;
    let nonce = Aes256Gcm::generate_nonce(&mut AeadOsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt an AES-256-GCM payload produced by [`encrypt`]. A wrong key and
/// tampered ciphertext are indistinguishable by design — both surface as
/// `DecryptionFailed` (§7 `AuthFailure`).
pub fn decrypt(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_LEN {
        return Err(CryptoError::TooShort);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::DecryptionFailed)?;
    let nonce = aes_gcm::Nonce::from_slice(&data[..NONCE_LEN]);
    cipher
        .decrypt(nonce, &data[NONCE_LEN..])
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = derive_key("correct horse", &random_salt()).unwrap();
        let ct = encrypt(&key, b"noisefs descriptor bytes").unwrap();
        let pt = decrypt(&key, &ct).unwrap();
        assert_eq!(pt, b"noisefs descriptor bytes");
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let salt = random_salt();
        let key1 = derive_key("pw1", &salt).unwrap();
        let key2 = derive_key("pw2", &salt).unwrap();
        let ct = encrypt(&key1, b"secret").unwrap();
        assert!(decrypt(&key2, &ct).is_err());
    }

    #[test]
    fn same_password_different_salts_yield_different_keys() {
        let k1 = derive_key("hunter2", &random_salt()).unwrap();
        let k2 = derive_key("hunter2", &random_salt()).unwrap();
        assert_ne!(k1, k2);
    }
}

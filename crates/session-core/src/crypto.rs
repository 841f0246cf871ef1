//! Symmetric encryption for stored records.
//!
//! Records are sealed with XChaCha20-Poly1305 under a key derived once from
//! the configured passphrase (Argon2id, fixed application salt).
//!
//! Ciphertext text format:
//!   base64( nonce (24 bytes) | ciphertext + tag )

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose, Engine as _};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use sha2::{Digest, Sha256};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::StoreError;
use crate::settings::KdfSettings;

pub const DERIVED_KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;

/// The passphrase is the only secret; the salt just domain-separates it.
const KEY_SALT: &[u8] = b"session-core/local-store/v1";

/// 32-byte store key. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct StoreKey([u8; DERIVED_KEY_LEN]);

impl StoreKey {
    pub fn derive(passphrase: &str, kdf: &KdfSettings) -> Result<Self, StoreError> {
        let params = Params::new(
            kdf.memory_cost_kib,
            kdf.time_cost,
            kdf.parallelism,
            Some(DERIVED_KEY_LEN),
        )
        .map_err(|e| StoreError::KeyDerivation(format!("argon2 params: {e}")))?;
        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut key = [0u8; DERIVED_KEY_LEN];
        argon
            .hash_password_into(passphrase.as_bytes(), KEY_SALT, &mut key)
            .map_err(|e| StoreError::KeyDerivation(format!("argon2 derive: {e}")))?;
        Ok(Self(key))
    }

    pub fn from_bytes(bytes: [u8; DERIVED_KEY_LEN]) -> Self {
        Self(bytes)
    }

    fn as_bytes(&self) -> &[u8; DERIVED_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StoreKey").field(&key_fingerprint(self)).finish()
    }
}

pub fn seal(key: &StoreKey, plaintext: &[u8]) -> Result<String, StoreError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| StoreError::Encryption(format!("cipher init: {e}")))?;
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| StoreError::Encryption(format!("encrypt: {e}")))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(general_purpose::STANDARD.encode(out))
}

pub fn open(key: &StoreKey, text: &str) -> Result<Zeroizing<Vec<u8>>, StoreError> {
    let data = general_purpose::STANDARD
        .decode(text.trim())
        .map_err(|_| StoreError::Decryption)?;
    if data.len() < NONCE_LEN {
        return Err(StoreError::Decryption);
    }
    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
    let cipher =
        XChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| StoreError::Decryption)?;
    let plaintext = cipher
        .decrypt(XNonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| StoreError::Decryption)?;
    Ok(Zeroizing::new(plaintext))
}

/// Short, non-reversible identifier for a key, for log correlation only.
pub fn key_fingerprint(key: &StoreKey) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..8])
}

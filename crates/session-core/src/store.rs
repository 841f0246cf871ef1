//! Encrypted local store.
//!
//! Values are serialized (JSON strings pass through untouched, everything
//! else is JSON-encoded), sealed, and written under a string key. Reads
//! open the ciphertext and try a JSON parse, falling back to the raw
//! string. A record that cannot be decrypted is purged and reads as absent.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::backend::StorageBackend;
use crate::crypto::{key_fingerprint, open, seal, StoreKey};
use crate::error::StoreError;
use crate::settings::SessionSettings;

pub struct EncryptedStore {
    backend: Box<dyn StorageBackend>,
    key: StoreKey,
}

impl EncryptedStore {
    pub fn new(backend: Box<dyn StorageBackend>, key: StoreKey) -> Self {
        Self { backend, key }
    }

    /// Derives the key from the configured passphrase.
    pub fn from_settings(
        backend: Box<dyn StorageBackend>,
        settings: &SessionSettings,
    ) -> Result<Self, StoreError> {
        let key = StoreKey::derive(settings.passphrase(), &settings.kdf)?;
        tracing::debug!(key_id = %key_fingerprint(&key), "encrypted store ready");
        Ok(Self::new(backend, key))
    }

    pub fn encrypt<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, StoreError> {
        let value = serde_json::to_value(value)
            .map_err(|e| StoreError::Encryption(format!("serialize: {e}")))?;
        let plaintext = match value {
            Value::String(s) => s,
            other => serde_json::to_string(&other)
                .map_err(|e| StoreError::Encryption(format!("serialize: {e}")))?,
        };
        seal(&self.key, plaintext.as_bytes())
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<Value, StoreError> {
        let bytes = open(&self.key, ciphertext)?;
        let text = std::str::from_utf8(&bytes).map_err(|_| StoreError::Decryption)?;
        if text.is_empty() {
            return Err(StoreError::Decryption);
        }
        Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
    }

    pub fn set_item<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let ciphertext = self.encrypt(value)?;
        self.backend.set(key, &ciphertext)
    }

    pub fn get_item(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let Some(ciphertext) = self.backend.get(key)? else {
            return Ok(None);
        };
        if ciphertext.is_empty() {
            return Ok(None);
        }
        match self.decrypt(&ciphertext) {
            Ok(value) => Ok(Some(value)),
            Err(StoreError::Decryption) => {
                warn!(key, "discarding unreadable record");
                self.backend.remove(key)?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// `None` when the record is absent, unreadable, or not a `T`.
    pub fn get_item_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        Ok(self
            .get_item(key)?
            .and_then(|value| serde_json::from_value(value).ok()))
    }

    pub fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.backend.remove(key)
    }

    /// Whether a record exists under `key`, readable or not.
    pub fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.backend.get(key)?.is_some())
    }

    /// Every key in the backend, including records this store cannot decrypt.
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.backend.keys()
    }

    /// Writes raw text under `key`, bypassing encryption.
    ///
    /// Repair and test hook for planting or overwriting a record as it would
    /// appear on disk. Regular callers go through [`EncryptedStore::set_item`].
    #[doc(hidden)]
    pub fn set_raw(&self, key: &str, raw: &str) -> Result<(), StoreError> {
        self.backend.set(key, raw)
    }
}

impl std::fmt::Debug for EncryptedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to encrypt data: {0}")]
    Encryption(String),

    /// Wrong key and corrupted data are deliberately indistinguishable.
    #[error("Failed to decrypt data - invalid key or corrupted data")]
    Decryption,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Activity tracker must be created inside a tokio runtime")]
    NoRuntime,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

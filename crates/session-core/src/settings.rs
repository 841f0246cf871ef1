use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Environment variable holding the store passphrase.
pub const ENCRYPTION_KEY_ENV: &str = "PUBLIC_ENCRYPTION_KEY";
/// Insecure development fallback used when no passphrase is configured.
pub const FALLBACK_ENCRYPTION_KEY: &str = "fallback-secret-key-development-only";

pub const DEFAULT_INACTIVITY_TIMEOUT_MS: u64 = 60 * 60 * 1000;
pub const DEFAULT_USER_KEY: &str = "userData";
pub const DEFAULT_ACTIVITY_KEY: &str = "lastActivity";

pub const KDF_TIME_COST: u32 = 3;
pub const KDF_MEMORY_COST_KIB: u32 = 65536; // 64MB
pub const KDF_PARALLELISM: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KdfSettings {
    pub memory_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for KdfSettings {
    fn default() -> Self {
        Self {
            memory_cost_kib: KDF_MEMORY_COST_KIB,
            time_cost: KDF_TIME_COST,
            parallelism: KDF_PARALLELISM,
        }
    }
}

impl KdfSettings {
    /// Smallest cost argon2 accepts. Tests and throwaway stores only.
    pub fn minimal() -> Self {
        Self {
            memory_cost_kib: 8,
            time_cost: 1,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSettings {
    /// Never written back to disk.
    #[serde(default, skip_serializing)]
    pub encryption_key: Option<String>,
    #[serde(default = "default_timeout")]
    pub inactivity_timeout_ms: u64,
    #[serde(default = "default_user_key")]
    pub user_key: String,
    #[serde(default = "default_activity_key")]
    pub activity_key: String,
    #[serde(default)]
    pub kdf: KdfSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            encryption_key: None,
            inactivity_timeout_ms: DEFAULT_INACTIVITY_TIMEOUT_MS,
            user_key: DEFAULT_USER_KEY.to_string(),
            activity_key: DEFAULT_ACTIVITY_KEY.to_string(),
            kdf: KdfSettings::default(),
        }
    }
}

impl SessionSettings {
    /// Defaults with the passphrase taken from the environment, if set.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(ENCRYPTION_KEY_ENV) {
            if !key.is_empty() {
                self.encryption_key = Some(key);
            }
        }
        self
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }

    /// The configured passphrase, or the development fallback.
    pub fn passphrase(&self) -> &str {
        match self.encryption_key.as_deref() {
            Some(key) if !key.is_empty() => key,
            _ => {
                warn!(
                    env = ENCRYPTION_KEY_ENV,
                    "no encryption key configured; using insecure development fallback"
                );
                FALLBACK_ENCRYPTION_KEY
            }
        }
    }
}

/// Reads settings from a JSON file; a missing file yields defaults.
/// The environment passphrase always overrides the file.
pub fn load_settings(path: &Path) -> anyhow::Result<SessionSettings> {
    let settings = if path.exists() {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data)?
    } else {
        SessionSettings::default()
    };
    Ok(settings.with_env_overrides())
}

pub fn save_settings(path: &Path, settings: &SessionSettings) -> anyhow::Result<()> {
    let data = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, data)?;
    Ok(())
}

fn default_timeout() -> u64 {
    DEFAULT_INACTIVITY_TIMEOUT_MS
}

fn default_user_key() -> String {
    DEFAULT_USER_KEY.to_string()
}

fn default_activity_key() -> String {
    DEFAULT_ACTIVITY_KEY.to_string()
}

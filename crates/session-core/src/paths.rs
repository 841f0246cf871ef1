use directories::ProjectDirs;
use std::path::PathBuf;

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "darklock";
pub const APP_NAME: &str = "session";

pub const STORE_FILE: &str = "local-store.json";
pub const SETTINGS_FILE: &str = "settings.json";

pub fn data_dir() -> anyhow::Result<PathBuf> {
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("cannot determine data directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn store_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(STORE_FILE)
}

pub fn settings_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(SETTINGS_FILE)
}

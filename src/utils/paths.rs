use crate::constants::paths;
use std::env;
use std::path::{Path, PathBuf};

fn normalize_env_path(value: Option<String>) -> Option<PathBuf> {
    let raw = value?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if lowered == "undefined" || lowered == "null" {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

/// Configuration directory: CLI flag, then env override, then `./config`
/// relative to the working directory.
pub fn resolve_config_dir(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Some(path) = normalize_env_path(env::var(paths::CONFIG_DIR_ENV).ok()) {
        return path;
    }
    PathBuf::from(paths::DEFAULT_CONFIG_DIR)
}

pub fn resolve_credentials_dir(config_dir: &Path) -> PathBuf {
    if let Some(path) = normalize_env_path(env::var(paths::CREDENTIALS_DIR_ENV).ok()) {
        return path;
    }
    config_dir.join(paths::CREDENTIALS_SUBDIR)
}

pub fn api_config_path(config_dir: &Path) -> PathBuf {
    config_dir.join(paths::API_CONFIG_FILE)
}

pub fn output_config_path(config_dir: &Path) -> PathBuf {
    config_dir.join(paths::OUTPUT_CONFIG_FILE)
}

//! Path utilities for tube-autoplay
//!
//! Respects XDG Base Directory Specification

use crate::error::Result;
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;

const APP_NAME: &str = "tube-autoplay";

/// Get config directory path
/// Respects XDG_CONFIG_HOME, defaults to ~/.config/tube-autoplay
pub fn get_config_dir() -> PathBuf {
    let base = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(dirs::config_dir)
        .unwrap_or_else(|| home_dir().join(".config"));

    base.join(APP_NAME)
}

/// Get cache directory path
/// Respects XDG_CACHE_HOME, defaults to ~/.cache/tube-autoplay
pub fn get_cache_dir() -> PathBuf {
    let base = env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(|| home_dir().join(".cache"));

    base.join(APP_NAME)
}

/// Get data directory path
/// Respects XDG_DATA_HOME, defaults to ~/.local/share/tube-autoplay
pub fn get_data_dir() -> PathBuf {
    let base = env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(dirs::data_dir)
        .unwrap_or_else(|| home_dir().join(".local/share"));

    base.join(APP_NAME)
}

fn home_dir() -> PathBuf {
    PathBuf::from(env::var("HOME").unwrap_or_default())
}

/// Get config file path
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Get watch positions file path
pub fn get_positions_path() -> PathBuf {
    get_data_dir().join("positions.json")
}

/// Get mpv IPC socket path, unique per process
pub fn get_mpv_socket_path() -> PathBuf {
    let base = env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir());
    base.join(format!("{}-{}.sock", APP_NAME, std::process::id()))
}

/// Ensure a directory exists
pub async fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    Ok(())
}

/// Ensure all required app directories exist
pub async fn ensure_app_dirs() -> Result<()> {
    ensure_dir(&get_config_dir()).await?;
    ensure_dir(&get_cache_dir()).await?;
    ensure_dir(&get_data_dir()).await?;
    Ok(())
}

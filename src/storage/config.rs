//! Configuration management

use crate::error::{Result, TubeError};
use crate::types::Config;
use crate::utils::paths::{ensure_dir, get_config_path};
use std::path::Path;
use tokio::fs;
use tokio::process::Command;

/// Load configuration from the default location
pub async fn load_config() -> Result<Config> {
    load_config_from(&get_config_path()).await
}

/// Load configuration from `path`. Missing keys fall back to defaults and a
/// missing file yields the defaults outright.
pub async fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path).await?;
    let config: Config = serde_json::from_str(&content)
        .map_err(|e| TubeError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if !(0.25..=4.0).contains(&config.playback_speed) {
        return Err(TubeError::InvalidConfig(format!(
            "playback_speed must be between 0.25 and 4.0, got {}",
            config.playback_speed
        )));
    }
    if config.seek_increment_secs == 0 {
        return Err(TubeError::InvalidConfig(
            "seek_increment_secs must be positive".into(),
        ));
    }
    if !config.instance.starts_with("http://") && !config.instance.starts_with("https://") {
        return Err(TubeError::InvalidConfig(format!(
            "instance must be an http(s) URL, got {}",
            config.instance
        )));
    }
    Ok(())
}

/// Save configuration to `path`
pub async fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content).await?;
    Ok(())
}

/// Open config file in editor
pub async fn edit_config(editor: &str) -> Result<()> {
    let config_path = get_config_path();

    // Ensure config file exists
    if !config_path.exists() {
        save_config(&Config::default(), &config_path).await?;
    }

    Command::new(editor)
        .arg(&config_path)
        .status()
        .await
        .map_err(|e| TubeError::Spawn(format!("Failed to start {}: {}", editor, e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RepeatMode;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = load_config_from(&tmp.path().join("none.json")).await.unwrap();
        assert!(config.autoplay);
        assert_eq!(config.sponsor_categories, vec!["sponsor".to_string()]);
    }

    #[tokio::test]
    async fn test_partial_file_merges_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{"autoplay": false, "repeat_mode": "queue"}"#)
            .await
            .unwrap();

        let config = load_config_from(&path).await.unwrap();
        assert!(!config.autoplay);
        assert_eq!(config.repeat_mode, RepeatMode::Queue);
        assert_eq!(config.seek_increment_secs, 10);
    }

    #[tokio::test]
    async fn test_invalid_values_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{"playback_speed": 9.0}"#).await.unwrap();
        assert!(matches!(
            load_config_from(&path).await,
            Err(TubeError::InvalidConfig(_))
        ));

        fs::write(&path, "{not json").await.unwrap();
        assert!(matches!(
            load_config_from(&path).await,
            Err(TubeError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/config.json");
        let mut config = Config::default();
        config.playback_speed = 1.25;
        save_config(&config, &path).await.unwrap();

        let loaded = load_config_from(&path).await.unwrap();
        assert_eq!(loaded.playback_speed, 1.25);
    }
}

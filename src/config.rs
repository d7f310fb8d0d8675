use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::device::DEFAULT_LOCK_FILE;

const DEFAULT_HELPER: &str = "puppy";
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Name or path of the puppy binary.
    pub helper: String,
    pub lock_file: PathBuf,
    pub turbo: bool,
    pub show_hidden: bool,
    /// PVR directories skipped by full cache rebuilds.
    pub exclusions: Vec<String>,
    pub refresh_interval_secs: u64,
    pub last_local_dir: Option<PathBuf>,
    pub last_remote_dir: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            helper: DEFAULT_HELPER.to_string(),
            lock_file: PathBuf::from(DEFAULT_LOCK_FILE),
            turbo: false,
            show_hidden: false,
            exclusions: vec!["\\DataFiles".to_string()],
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            last_local_dir: None,
            last_remote_dir: None,
        }
    }
}

#[derive(Debug)]
pub struct ConfigManager {
    config_file: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("pvrdeck");

        // Create config directory if it doesn't exist
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        }

        Ok(Self {
            config_file: config_dir.join("pvrdeck.toml"),
        })
    }

    /// Use an explicit config file instead of the per-user one.
    pub fn with_file(config_file: impl Into<PathBuf>) -> Result<Self> {
        let config_file = config_file.into();
        if let Some(parent) = config_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        Ok(Self { config_file })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_file
    }

    pub fn load_config(&self) -> Result<AppConfig> {
        // If config file doesn't exist, create it with default values
        if !self.config_file.exists() {
            let default_config = AppConfig::default();
            self.save_config(&default_config)?;
        }

        let content =
            fs::read_to_string(&self.config_file).context("Failed to read config file")?;

        let mut config: AppConfig =
            toml::from_str(&content).context("Failed to parse config file")?;

        // A zero interval would refresh on every tick
        if config.refresh_interval_secs == 0 {
            config.refresh_interval_secs = DEFAULT_REFRESH_INTERVAL_SECS;
        }

        Ok(config)
    }

    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(&self.config_file, toml).context("Failed to write config file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_file(dir.path().join("nested").join("pvrdeck.toml")).unwrap();

        let config = manager.load_config().unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(manager.config_path().exists());
        assert_eq!(config.exclusions, vec!["\\DataFiles".to_string()]);
    }

    #[test]
    fn round_trips_settings() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_file(dir.path().join("pvrdeck.toml")).unwrap();

        let config = AppConfig {
            turbo: true,
            show_hidden: true,
            last_local_dir: Some(PathBuf::from("/home/me/Videos")),
            last_remote_dir: Some("\\MOVIES".to_string()),
            ..AppConfig::default()
        };
        manager.save_config(&config).unwrap();
        assert_eq!(manager.load_config().unwrap(), config);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pvrdeck.toml");
        fs::write(&path, "helper = \"/opt/puppy/bin/puppy\"\nrefresh_interval_secs = 0\n").unwrap();

        let config = ConfigManager::with_file(&path).unwrap().load_config().unwrap();
        assert_eq!(config.helper, "/opt/puppy/bin/puppy");
        assert_eq!(config.refresh_interval_secs, 600);
        assert!(!config.turbo);
    }
}

//! Application configuration management.
//!
//! Configuration covers the backend URL, where session tokens are kept,
//! refresh and timeout intervals, and the last used username.
//!
//! Configuration is stored at `~/.config/learnplus/config.json`. The
//! backend URL can be overridden with `LEARNPLUS_API_URL`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::auth::{
    FileTokenStore, KeyringTokenStore, TokenStore, DEFAULT_REFRESH_INTERVAL, MAX_REFRESH_INTERVAL,
};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "learnplus";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the configured backend URL
pub const API_URL_ENV: &str = "LEARNPLUS_API_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub last_username: Option<String>,
    #[serde(default)]
    pub token_storage: TokenStorage,
    pub refresh_interval_minutes: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Backend URL: environment override, then config, then default.
    pub fn api_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Refresh period, capped at [`MAX_REFRESH_INTERVAL`].
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval_minutes
            .filter(|&m| m > 0)
            .map(|m| Duration::from_secs(m.saturating_mul(60)).min(MAX_REFRESH_INTERVAL))
            .unwrap_or(DEFAULT_REFRESH_INTERVAL)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .filter(|&s| s > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    /// Token store selected by `token_storage`.
    pub fn token_store(&self) -> Result<Arc<dyn TokenStore>> {
        let store: Arc<dyn TokenStore> = match self.token_storage {
            TokenStorage::File => Arc::new(FileTokenStore::new(self.cache_dir()?)),
            TokenStorage::Keyring => Arc::new(KeyringTokenStore::new()?),
        };
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.token_storage, TokenStorage::File);
        assert_eq!(config.refresh_interval(), DEFAULT_REFRESH_INTERVAL);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_intervals_fall_back_to_defaults() {
        let config = Config {
            refresh_interval_minutes: Some(0),
            request_timeout_secs: Some(0),
            ..Config::default()
        };
        assert_eq!(config.refresh_interval(), DEFAULT_REFRESH_INTERVAL);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));

        let config = Config {
            refresh_interval_minutes: Some(10),
            ..Config::default()
        };
        assert_eq!(config.refresh_interval(), Duration::from_secs(600));
    }

    #[test]
    fn test_huge_refresh_interval_is_capped() {
        let config = Config {
            refresh_interval_minutes: Some(u64::MAX),
            ..Config::default()
        };
        assert_eq!(config.refresh_interval(), MAX_REFRESH_INTERVAL);

        let config = Config {
            refresh_interval_minutes: Some(7 * 24 * 60),
            ..Config::default()
        };
        assert_eq!(config.refresh_interval(), MAX_REFRESH_INTERVAL);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learnplus").join(CONFIG_FILE);

        assert!(Config::load_from(&path).unwrap().api_url.is_none());

        let config = Config {
            api_url: Some("https://lms.example.com/api".to_string()),
            last_username: Some("ada".to_string()),
            token_storage: TokenStorage::Keyring,
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.api_url.as_deref(), Some("https://lms.example.com/api"));
        assert_eq!(loaded.last_username.as_deref(), Some("ada"));
        assert_eq!(loaded.token_storage, TokenStorage::Keyring);
    }

    #[test]
    fn test_parse_partial_config() {
        let config: Config = serde_json::from_str(r#"{"token_storage":"keyring"}"#).unwrap();
        assert_eq!(config.token_storage, TokenStorage::Keyring);
        assert!(config.last_username.is_none());
    }
}

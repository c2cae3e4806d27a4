//! Application configuration management.
//!
//! This module handles loading the application configuration:
//! where the Pokédex save file lives, how long API responses are cached, and
//! the default auto-save policy for a fresh Pokédex.
//!
//! Configuration is stored at `~/.config/pokedexcli/config.json`. The save
//! file defaults to `~/.pokedexcli_save.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::client::DEFAULT_BASE_URL;
use crate::cache::response::MAX_SWEEP_INTERVAL;
use crate::state::AutoSaveSettings;

/// Application name used for the config directory path
const APP_NAME: &str = "pokedexcli";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Save file name, placed in the home directory
const SAVE_FILE: &str = ".pokedexcli_save.json";

/// Default cache lifetime for API responses.
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Overrides `save_file`.
pub const SAVE_FILE_ENV: &str = "POKEDEX_SAVE_FILE";

/// Overrides `cache_ttl_secs`.
pub const CACHE_TTL_ENV: &str = "POKEDEX_CACHE_TTL_SECS";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub save_file: Option<PathBuf>,
    pub cache_ttl_secs: u64,
    pub auto_save_enabled: bool,
    pub auto_save_interval: u32,
    pub api_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            save_file: None,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            auto_save_enabled: true,
            auto_save_interval: 1,
            api_base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Config {
    /// Load the config file (or defaults), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var(SAVE_FILE_ENV).filter(|p| !p.trim().is_empty()) {
            self.save_file = Some(PathBuf::from(path));
        }
        if let Some(raw) = var(CACHE_TTL_ENV) {
            match raw.trim().parse() {
                Ok(secs) => self.cache_ttl_secs = secs,
                Err(e) => warn!(value = %raw, error = %e, "Ignoring invalid {}", CACHE_TTL_ENV),
            }
        }
    }

    /// Explicit path, else `~/.pokedexcli_save.json`, else the working directory.
    pub fn save_file_path(&self) -> PathBuf {
        if let Some(ref path) = self.save_file {
            return path.clone();
        }
        match dirs::home_dir() {
            Some(home) => home.join(SAVE_FILE),
            None => PathBuf::from(SAVE_FILE),
        }
    }

    /// Cache lifetime, capped at one year.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs).min(MAX_SWEEP_INTERVAL)
    }

    pub fn auto_save(&self) -> AutoSaveSettings {
        AutoSaveSettings::new(self.auto_save_enabled, self.auto_save_interval)
    }
}

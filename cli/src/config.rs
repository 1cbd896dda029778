// Configuration management for the blecounter CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/blecounter/config.json
// - Linux: ~/.config/blecounter/config.json
// - Windows: %APPDATA%\blecounter\config.json

use anyhow::{Context, Result};
use blecounter_core::{
    CentralConfig, CharacteristicId, ExchangeProfile, PeripheralConfig, ServiceId,
    COUNTER_CHARACTERISTIC_ID, COUNTER_SERVICE_ID,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service the peripheral advertises and the central scans for
    pub service_id: ServiceId,

    /// Characteristic carrying the counter
    pub characteristic_id: CharacteristicId,

    /// Local name in the advertisement
    pub local_name: Option<String>,

    /// Demo counter tick in milliseconds
    pub tick_interval_ms: u64,

    /// Answer out-of-range reads with an error instead of ignoring them
    pub reject_invalid_offset: bool,

    /// Default log filter when RUST_LOG is unset
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_id: COUNTER_SERVICE_ID,
            characteristic_id: COUNTER_CHARACTERISTIC_ID,
            local_name: Some("BLE-COUNTER".to_string()),
            tick_interval_ms: 500,
            reject_invalid_offset: false,
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("blecounter");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Update a single key in memory
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "service_id" => {
                self.service_id = value.parse().context("Invalid service id")?;
            }
            "characteristic_id" => {
                self.characteristic_id = value.parse().context("Invalid characteristic id")?;
            }
            "local_name" => {
                self.local_name = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "tick_interval_ms" => {
                self.tick_interval_ms = value.parse().context("Invalid number")?;
            }
            "reject_invalid_offset" => {
                self.reject_invalid_offset = value.parse().context("Invalid boolean value")?;
            }
            "log_level" => {
                self.log_level = value.to_string();
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    /// Set a config value and persist it
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.apply(key, value)?;
        self.save()
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "service_id" => Some(self.service_id.to_string()),
            "characteristic_id" => Some(self.characteristic_id.to_string()),
            "local_name" => self.local_name.clone(),
            "tick_interval_ms" => Some(self.tick_interval_ms.to_string()),
            "reject_invalid_offset" => Some(self.reject_invalid_offset.to_string()),
            "log_level" => Some(self.log_level.clone()),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            ("service_id".to_string(), self.service_id.to_string()),
            ("characteristic_id".to_string(), self.characteristic_id.to_string()),
            (
                "local_name".to_string(),
                self.local_name.clone().unwrap_or_else(|| "(none)".to_string()),
            ),
            ("tick_interval_ms".to_string(), format!("{}ms", self.tick_interval_ms)),
            (
                "reject_invalid_offset".to_string(),
                self.reject_invalid_offset.to_string(),
            ),
            ("log_level".to_string(), self.log_level.clone()),
        ]
    }

    pub fn profile(&self) -> ExchangeProfile {
        ExchangeProfile {
            service_id: self.service_id,
            characteristic_id: self.characteristic_id,
        }
    }

    pub fn central_config(&self) -> CentralConfig {
        CentralConfig::new(self.profile())
    }

    pub fn peripheral_config(&self) -> PeripheralConfig {
        PeripheralConfig {
            profile: self.profile(),
            local_name: self.local_name.clone(),
            reject_invalid_offset: self.reject_invalid_offset,
        }
    }
}

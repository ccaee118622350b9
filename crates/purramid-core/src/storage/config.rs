//! TOML-based application configuration.
//!
//! Stores:
//! - Per-feature instance limits
//! - Timer tick period
//! - Database file name
//! - Default log filter
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::error::{ConfigError, Result};
use crate::feature::FeatureType;

/// Largest pool a feature may be configured with.
pub const MAX_POOL_CAPACITY: u32 = 32;

/// Maximum live instances per feature type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_capacity")]
    pub clock: u32,
    #[serde(default = "default_capacity")]
    pub timer: u32,
    #[serde(default = "default_capacity")]
    pub screen_mask: u32,
    #[serde(default = "default_capacity")]
    pub spotlight: u32,
    #[serde(default = "default_capacity")]
    pub traffic_light: u32,
    #[serde(default = "default_capacity")]
    pub dice: u32,
    #[serde(default = "default_capacity")]
    pub coin: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// File name inside the data directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub pools: PoolConfig,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_capacity() -> u32 {
    4
}
fn default_tick_interval_ms() -> u64 {
    50
}
fn default_database_file() -> String {
    "purramid.db".into()
}
fn default_log_filter() -> String {
    "info".into()
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            clock: default_capacity(),
            timer: default_capacity(),
            screen_mask: default_capacity(),
            spotlight: default_capacity(),
            traffic_light: default_capacity(),
            dice: default_capacity(),
            coin: default_capacity(),
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: default_database_file(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl PoolConfig {
    pub fn capacity(&self, feature: FeatureType) -> u32 {
        match feature {
            FeatureType::Clock => self.clock,
            FeatureType::Timer => self.timer,
            FeatureType::ScreenMask => self.screen_mask,
            FeatureType::Spotlight => self.spotlight,
            FeatureType::TrafficLight => self.traffic_light,
            FeatureType::Dice => self.dice,
            FeatureType::Coin => self.coin,
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;
            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Number(_) => serde_json::Value::Number(
                    value
                        .parse::<u64>()
                        .map_err(|e| invalid(e.to_string()))?
                        .into(),
                ),
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    return Err(invalid("not a leaf value".into()));
                }
                _ => serde_json::Value::String(value.into()),
            };
            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    /// Reject values the rest of the system cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for feature in FeatureType::ALL {
            let capacity = self.pools.capacity(feature);
            if !(1..=MAX_POOL_CAPACITY).contains(&capacity) {
                return Err(ConfigError::InvalidValue {
                    key: format!("pools.{}", feature.key()),
                    message: format!("must be between 1 and {MAX_POOL_CAPACITY}"),
                });
            }
        }
        if !(10..=1000).contains(&self.timer.tick_interval_ms) {
            return Err(ConfigError::InvalidValue {
                key: "timer.tick_interval_ms".into(),
                message: "must be between 10 and 1000".into(),
            });
        }
        if self.storage.database_file.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "storage.database_file".into(),
                message: "must not be empty".into(),
            });
        }
        Ok(())
    }

    pub fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Full path of the SQLite database.
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(data_dir()?.join(&self.storage.database_file))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.timer.tick_interval_ms)
    }

    /// Load from disk, writing defaults if no file exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key. The change is validated but not saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value is invalid.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json)?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.pools.capacity(FeatureType::Spotlight), 4);
        assert_eq!(parsed.tick_interval(), Duration::from_millis(50));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[pools]\ndice = 7\n").unwrap();
        assert_eq!(parsed.pools.dice, 7);
        assert_eq!(parsed.pools.coin, 4);
        assert_eq!(parsed.storage.database_file, "purramid.db");
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("pools.timer").as_deref(), Some("4"));
        assert_eq!(cfg.get("logging.filter").as_deref(), Some("info"));
        assert!(cfg.get("pools").is_none());
        assert!(cfg.get("pools.missing_key").is_none());
    }

    #[test]
    fn set_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.set("pools.spotlight", "6").unwrap();
        cfg.set("logging.filter", "purramid_core=debug").unwrap();
        assert_eq!(cfg.pools.spotlight, 6);
        assert_eq!(cfg.logging.filter, "purramid_core=debug");
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_values() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("pools.laser", "2"),
            Err(CoreError::Config(ConfigError::UnknownKey(_)))
        ));
        assert!(cfg.set("pools.clock", "many").is_err());
        assert!(cfg.set("pools.clock", "0").is_err());
        assert!(cfg.set("timer.tick_interval_ms", "5").is_err());
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        let mut changed = cfg.clone();
        changed.set("pools.coin", "9").unwrap();
        changed.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().pools.coin, 9);
    }

    #[test]
    fn load_from_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[timer]\ntick_interval_ms = 1\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}

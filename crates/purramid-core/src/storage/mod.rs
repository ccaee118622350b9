mod config;
pub mod database;
mod legacy;
pub mod migrations;
mod record;
mod store;

pub use config::{
    Config, LoggingConfig, PoolConfig, StorageConfig, TimerConfig, MAX_POOL_CAPACITY,
};
pub use database::Database;
pub use legacy::{repair_spotlight_rows, LegacySpotlightRow};
pub use record::{FieldValue, Record};
pub use store::{MemoryStore, StateStore};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the application data directory, creating it if needed.
///
/// `PURRAMID_DATA_DIR` wins when set. Otherwise `~/.config/purramid`, or
/// `~/.config/purramid-dev` when `PURRAMID_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("PURRAMID_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("PURRAMID_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("purramid-dev")
            } else {
                base_dir.join("purramid")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

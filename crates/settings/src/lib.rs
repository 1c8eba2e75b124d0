//! ErrandBit Settings
//!
//! Configuration for the payment daemon and the operator CLI.
//!
//! ## Sections
//!
//! - `server`: HTTP listen address
//! - `database`: ledger file location
//! - `payments`: invoice expiry, payload limits, job price bounds
//! - `monitoring`: monitor cadence and alert thresholds
//! - `guard`: per-action rate limits
//! - `lightning`: provider mode and credentials
//! - `rates`: fiat conversion
//!
//! ## Usage
//!
//! ```no_run
//! use errandbit_settings::Settings;
//!
//! let mut settings = Settings::load_or_default()?;
//! settings.monitoring.stuck_threshold_secs = 3 * 3600;
//! settings.save()?;
//! # Ok::<(), errandbit_settings::SettingsError>(())
//! ```

mod config;

pub use config::{
    DatabaseSettings, GuardSettings, LightningMode, LightningSettings, MonitoringSettings,
    PaymentSettings, RateLimit, RateSettings, ServerSettings, Settings,
};

use std::path::PathBuf;

use thiserror::Error;

/// Environment variable overriding the settings file location
pub const CONFIG_ENV_VAR: &str = "ERRANDBIT_CONFIG";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    ReadError(std::io::Error),

    #[error("Failed to write settings: {0}")]
    WriteError(std::io::Error),

    #[error("Failed to parse settings: {0}")]
    ParseError(serde_json::Error),

    #[error("Failed to create config directory: {0}")]
    CreateDirError(std::io::Error),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Platform config directory for ErrandBit
pub fn default_config_dir() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("errandbit")
}

/// Settings file path, honouring `ERRANDBIT_CONFIG`
pub fn default_settings_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| default_config_dir().join("settings.json"))
}

//! Configuration types

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{default_config_dir, default_settings_path, Result, SettingsError};

/// Main settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub payments: PaymentSettings,

    #[serde(default)]
    pub monitoring: MonitoringSettings,

    #[serde(default)]
    pub guard: GuardSettings,

    #[serde(default)]
    pub lightning: LightningSettings,

    #[serde(default)]
    pub rates: RateSettings,

    /// Custom settings file path (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from the default path, or create defaults
    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&default_settings_path())
    }

    /// Load settings from a specific path, or create defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
            let settings: Settings =
                serde_json::from_str(&content).map_err(SettingsError::ParseError)?;
            info!("Loaded settings from {:?}", path);
            settings
        } else {
            Self::default()
        };
        settings.config_path = Some(path.to_path_buf());
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to the configured path
    pub fn save(&self) -> Result<()> {
        let path = self.config_path.clone().unwrap_or_else(default_settings_path);
        self.save_to(&path)
    }

    /// Save settings to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(SettingsError::CreateDirError)?;
            }
        }

        let content = serde_json::to_string_pretty(self).map_err(SettingsError::ParseError)?;
        std::fs::write(path, content).map_err(SettingsError::WriteError)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.payments.invoice_expiry_secs == 0 {
            return Err(SettingsError::Invalid(
                "payments.invoice_expiry_secs must be positive".to_string(),
            ));
        }
        if self.payments.min_price_cents <= 0
            || self.payments.min_price_cents > self.payments.max_price_cents
        {
            return Err(SettingsError::Invalid(format!(
                "payments price bounds {}..{} are not a valid range",
                self.payments.min_price_cents, self.payments.max_price_cents
            )));
        }
        if !(0.0..=100.0).contains(&self.monitoring.success_threshold_pct) {
            return Err(SettingsError::Invalid(
                "monitoring.success_threshold_pct must be within 0..100".to_string(),
            ));
        }
        if self.lightning.mode == LightningMode::Lnbits && self.lightning.api_key.is_empty() {
            return Err(SettingsError::Invalid(
                "lightning.api_key is required in lnbits mode".to_string(),
            ));
        }
        if self.rates.sats_per_usd == 0 {
            return Err(SettingsError::Invalid(
                "rates.sats_per_usd must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Ledger storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    default_config_dir().join("payments.db")
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Payment policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSettings {
    /// Invoice expiry requested from the provider, and the pending window
    #[serde(default = "default_invoice_expiry")]
    pub invoice_expiry_secs: u64,

    /// Longest accepted invoice string
    #[serde(default = "default_max_invoice_len")]
    pub max_invoice_len: usize,

    #[serde(default = "default_min_price")]
    pub min_price_cents: i64,

    #[serde(default = "default_max_price")]
    pub max_price_cents: i64,
}

fn default_invoice_expiry() -> u64 {
    3600
}

fn default_max_invoice_len() -> usize {
    2048
}

fn default_min_price() -> i64 {
    100
}

fn default_max_price() -> i64 {
    1_000_000
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            invoice_expiry_secs: default_invoice_expiry(),
            max_invoice_len: default_max_invoice_len(),
            min_price_cents: default_min_price(),
            max_price_cents: default_max_price(),
        }
    }
}

/// Monitor cadence and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold_secs: u64,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_success_threshold")]
    pub success_threshold_pct: f64,

    #[serde(default = "default_min_sample")]
    pub min_sample: u64,

    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,

    /// How often expired invoices are swept
    #[serde(default = "default_monitor_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_monitor_interval() -> u64 {
    300
}

fn default_stuck_threshold() -> u64 {
    2 * 3600
}

fn default_page_size() -> usize {
    100
}

fn default_success_threshold() -> f64 {
    90.0
}

fn default_min_sample() -> u64 {
    10
}

fn default_health_timeout() -> u64 {
    10
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_monitor_interval(),
            stuck_threshold_secs: default_stuck_threshold(),
            page_size: default_page_size(),
            success_threshold_pct: default_success_threshold(),
            min_sample: default_min_sample(),
            health_timeout_secs: default_health_timeout(),
            cleanup_interval_secs: default_monitor_interval(),
        }
    }
}

/// A request budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window_secs: u64,
}

/// Abuse guard limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardSettings {
    #[serde(default = "default_payment_limit")]
    pub payment: RateLimit,

    #[serde(default = "default_confirm_limit")]
    pub confirm: RateLimit,

    #[serde(default = "default_monitoring_limit")]
    pub monitoring: RateLimit,

    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

fn default_payment_limit() -> RateLimit {
    RateLimit {
        max_requests: 10,
        window_secs: 60,
    }
}

fn default_confirm_limit() -> RateLimit {
    RateLimit {
        max_requests: 5,
        window_secs: 60,
    }
}

fn default_monitoring_limit() -> RateLimit {
    RateLimit {
        max_requests: 30,
        window_secs: 60,
    }
}

fn default_purge_interval() -> u64 {
    60
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            payment: default_payment_limit(),
            confirm: default_confirm_limit(),
            monitoring: default_monitoring_limit(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

/// Which Lightning backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LightningMode {
    /// In-memory node for development
    #[default]
    Mock,
    /// LNbits wallet API
    Lnbits,
}

/// Lightning provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightningSettings {
    #[serde(default)]
    pub mode: LightningMode,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for LightningSettings {
    fn default() -> Self {
        Self {
            mode: LightningMode::default(),
            api_url: default_api_url(),
            api_key: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Exchange rate source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateSettings {
    /// Fixed satoshis per US dollar
    #[serde(default = "default_sats_per_usd")]
    pub sats_per_usd: u64,
}

fn default_sats_per_usd() -> u64 {
    1500
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            sats_per_usd: default_sats_per_usd(),
        }
    }
}

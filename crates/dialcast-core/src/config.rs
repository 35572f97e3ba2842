//! Dialcast configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DialError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DialcastConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub telephony: TelephonyConfig,
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl DialcastConfig {
    /// Load config from the default path (~/.dialcast/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DialError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| DialError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| DialError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dialcast")
            .join("config.toml")
    }
}

/// Tick loop + state-machine knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between ticks.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Seconds a campaign may sit in `waiting` before the watchdog trips.
    #[serde(default = "default_watchdog_threshold")]
    pub watchdog_threshold_secs: u64,
    /// Upper bound of the random pre-dial delay per campaign.
    #[serde(default = "default_jitter_max")]
    pub jitter_max_ms: u64,
    /// Delay between the call-status write and the visit-record write.
    /// The CRM backend reads call status while computing the visit record;
    /// writing too fast makes it read a stale status.
    #[serde(default = "default_visit_delay")]
    pub visit_record_delay_ms: u64,
    /// Restart campaigns stuck in `error` automatically.
    #[serde(default)]
    pub auto_restart: bool,
}

fn default_tick_interval() -> u64 { 1 }
fn default_watchdog_threshold() -> u64 { 90 }
fn default_jitter_max() -> u64 { 100 }
fn default_visit_delay() -> u64 { 100 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            watchdog_threshold_secs: default_watchdog_threshold(),
            jitter_max_ms: default_jitter_max(),
            visit_record_delay_ms: default_visit_delay(),
            auto_restart: false,
        }
    }
}

/// Telephony platform connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    #[serde(default = "default_telephony_host")]
    pub host: String,
    /// Process-wide credentials used for the shared polling token.
    #[serde(default = "default_grant_type")]
    pub admin_grant_type: String,
    #[serde(default)]
    pub admin_client_id: String,
    #[serde(default)]
    pub admin_client_secret: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_telephony_host() -> String { "https://pbx.example.com".into() }
fn default_grant_type() -> String { "client_credentials".into() }
fn default_request_timeout() -> u64 { 10 }

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            host: default_telephony_host(),
            admin_grant_type: default_grant_type(),
            admin_client_id: String::new(),
            admin_client_secret: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// CRM connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    #[serde(default = "default_crm_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_crm_host() -> String { "https://crm.example.com".into() }

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            host: default_crm_host(),
            api_key: String::new(),
            api_secret: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Error-change alerting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Webhook URL for error notifications. None disables alerting.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_alert_interval")]
    pub check_interval_secs: u64,
}

fn default_alert_interval() -> u64 { 300 }

impl Default for AlertConfig {
    fn default() -> Self {
        Self { webhook_url: None, check_interval_secs: default_alert_interval() }
    }
}

/// Registry backup through the CRM config store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_backup_name")]
    pub name: String,
    #[serde(default = "default_backup_interval")]
    pub interval_secs: u64,
}

fn bool_true() -> bool { true }
fn default_backup_name() -> String { "dialcast-projects".into() }
fn default_backup_interval() -> u64 { 60 }

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: default_backup_name(),
            interval_secs: default_backup_interval(),
        }
    }
}

/// Operator-facing HTTP/WS server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

fn default_gateway_host() -> String { "0.0.0.0".into() }
fn default_gateway_port() -> u16 { 3020 }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { host: default_gateway_host(), port: default_gateway_port() }
    }
}

//! Hub configuration.
//!
//! Read from `~/.config/clickerhub/config.json`. Every field is optional in
//! the file; a missing file or one that fails to parse yields the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use clickerhub_hub_connection::ConnectConfig;
use clickerhub_hub_core::HubOptions;
use clickerhub_protocol::{Credentials, Delimiters};
use clickerhub_protocol::constants::{
    CONNECT_RETRY_BACKOFF, CONNECT_TIMEOUT, HEARTBEAT_PERIOD, LOGIN_PORT, MAX_CONNECT_ATTEMPTS,
};

/// Which delimiter set the server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DelimiterSet {
    /// Two-character escaped separators.
    #[default]
    Legacy,
    /// Single-character separators.
    Plain,
}

impl DelimiterSet {
    pub fn delimiters(self) -> Delimiters {
        match self {
            Self::Legacy => Delimiters::default(),
            Self::Plain => Delimiters::plain(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Session server host. Empty means "ask the operator".
    pub server_address: String,
    pub admin: String,
    /// Identifier sent at login.
    pub id: String,
    pub login_port: u16,
    pub connect_timeout_ms: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub heartbeat_secs: u64,
    /// Per-delivery timeout; absent means unbounded.
    pub delivery_timeout_ms: Option<u64>,
    pub delimiters: DelimiterSet,
    /// Consumer keys that start disabled.
    pub disabled_consumers: Vec<String>,
}

fn default_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "ClickerHub".into())
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            server_address: String::new(),
            admin: "admin".into(),
            id: default_id(),
            login_port: LOGIN_PORT,
            connect_timeout_ms: CONNECT_TIMEOUT.as_millis() as u64,
            max_attempts: MAX_CONNECT_ATTEMPTS,
            retry_backoff_ms: CONNECT_RETRY_BACKOFF.as_millis() as u64,
            heartbeat_secs: HEARTBEAT_PERIOD.as_secs(),
            delivery_timeout_ms: None,
            delimiters: DelimiterSet::default(),
            disabled_consumers: Vec::new(),
        }
    }
}

impl HubConfig {
    /// Loads the configuration from its default location.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<HubConfig>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.admin, &self.id)
    }

    pub fn hub_options(&self) -> HubOptions {
        // The probe delay and period share one setting.
        let heartbeat = if self.heartbeat_secs == 0 {
            HEARTBEAT_PERIOD
        } else {
            Duration::from_secs(self.heartbeat_secs)
        };
        HubOptions {
            delimiters: self.delimiters.delimiters(),
            delivery_timeout: self.delivery_timeout_ms.map(Duration::from_millis),
            connect: ConnectConfig {
                login_port: self.login_port,
                connect_timeout: Duration::from_millis(self.connect_timeout_ms),
                max_attempts: self.max_attempts.max(1),
                retry_backoff: Duration::from_millis(self.retry_backoff_ms),
                heartbeat_period: heartbeat,
                heartbeat_initial_delay: heartbeat,
                ..ConnectConfig::default()
            },
        }
    }
}

/// `~/.config/clickerhub/config.json`.
pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(config_base_dir()?.join("clickerhub").join("config.json"))
}

fn config_base_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA")
            .map_err(|_| anyhow::anyhow!("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home).join(".config"))
    }
}

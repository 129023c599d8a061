//! Configuration file support for the bridge.
//!
//! Loads settings from `~/.config/hamalert-bridge/config.toml` on Linux
//! (or platform-appropriate location on other OSes). Command-line flags and
//! environment variables override the file.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::notifier::{DEFAULT_WEBHOOK_TIMEOUT, NotifierConfig};
use crate::session::{HAMALERT_HOST, HAMALERT_PORT, SessionConfig};
use crate::supervisor::DEFAULT_RECONNECT_DELAY;

const DEFAULT_USERNAME: &str = "INSERT_USERNAME";
const DEFAULT_PASSWORD: &str = "INSERT_PASSWORD";
const DEFAULT_WEBHOOK_URL: &str = "INSERT_DISCORD_WEBHOOK";

/// Values treated as "not configured" in addition to the empty string.
const PLACEHOLDERS: &[&str] = &[
    DEFAULT_USERNAME,
    DEFAULT_PASSWORD,
    DEFAULT_WEBHOOK_URL,
    "USERNAME",
    "PASSWORD",
    "INSERT DISCORD WEBHOOK HERE",
];

fn is_placeholder(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || PLACEHOLDERS.contains(&value)
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HamAlert telnet server hostname.
    pub host: String,

    /// HamAlert telnet server port.
    pub port: u16,

    /// HamAlert account name.
    pub username: String,

    /// HamAlert telnet password.
    pub password: String,

    /// Webhook URL notifications are posted to.
    pub webhook_url: String,

    /// Seconds during which a repeated (callsign, band, mode) is not re-posted.
    pub dedup_window: u64,

    /// Log notifications instead of posting them.
    pub dry_run: bool,

    /// Seconds to wait before reconnecting.
    pub reconnect_delay: u64,

    /// Connection and login prompt timeout in seconds.
    pub connect_timeout: u64,

    /// Seconds without a line before a keepalive is sent.
    pub idle_timeout: u64,

    /// Webhook request timeout in seconds.
    pub webhook_timeout: u64,

    /// Enable Prometheus metrics HTTP endpoint.
    pub metrics_enabled: bool,

    /// Port for Prometheus metrics HTTP endpoint.
    pub metrics_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: HAMALERT_HOST.to_string(),
            port: HAMALERT_PORT,
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            webhook_url: DEFAULT_WEBHOOK_URL.to_string(),
            dedup_window: 20 * 60,
            dry_run: false,
            reconnect_delay: DEFAULT_RECONNECT_DELAY.as_secs(),
            connect_timeout: 30,
            idle_timeout: 30,
            webhook_timeout: DEFAULT_WEBHOOK_TIMEOUT.as_secs(),
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

impl Config {
    /// Load configuration from the default config file location.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but is malformed.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    /// Load configuration from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in config file: {}", path.display()))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hamalert-bridge/config.toml"))
    }

    /// Validate settings that would make the bridge unable to run at all.
    ///
    /// Missing credentials are not an error; see [`Config::placeholder_fields`].
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            bail!("host must not be empty");
        }
        if self.connect_timeout == 0 {
            bail!("connect_timeout must be at least 1 second");
        }
        if self.idle_timeout == 0 {
            bail!("idle_timeout must be at least 1 second");
        }
        if self.webhook_timeout == 0 {
            bail!("webhook_timeout must be at least 1 second");
        }
        Ok(())
    }

    /// Names of credential settings that are missing or still placeholders.
    ///
    /// The webhook URL is not needed in dry-run mode.
    pub fn placeholder_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_placeholder(&self.username) {
            missing.push("HAMALERT_USERNAME");
        }
        if is_placeholder(&self.password) {
            missing.push("HAMALERT_PASSWORD");
        }
        if !self.dry_run && is_placeholder(&self.webhook_url) {
            missing.push("DISCORD_WEBHOOK_URL");
        }
        missing
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            idle_timeout: Duration::from_secs(self.idle_timeout),
        }
    }

    pub fn notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            webhook_url: self.webhook_url.clone(),
            dry_run: self.dry_run,
            timeout: Duration::from_secs(self.webhook_timeout),
        }
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay)
    }
}

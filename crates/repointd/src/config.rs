//! Daemon configuration: a YAML file plus `REPOINT_*` environment
//! overrides for the daemon-level scalars. Group and check shapes live in
//! `repoint_core::config`; this module wraps them with the service-level
//! sections and top-level validation.

use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;

use config::FileFormat;
use serde::Deserialize;

use repoint_core::config::GroupConfig;

pub const ENV_PREFIX: &str = "REPOINT";

// (ENV_NAME, config_key)
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("REPOINT_SERVICE_NAME", "service.name"),
    ("REPOINT_LOG_LEVEL", "telemetry.logging.level"),
    ("REPOINT_LOG_FORMAT", "telemetry.logging.format"),
    ("REPOINT_STATUS_SERVER_ENABLED", "status_server.enabled"),
    ("REPOINT_STATUS_SERVER_HOST", "status_server.host"),
    ("REPOINT_STATUS_SERVER_PORT", "status_server.port"),
    ("REPOINT_HEARTBEAT_ENABLED", "heartbeat.enabled"),
    ("REPOINT_HEARTBEAT_URL", "heartbeat.url"),
    ("REPOINT_HEARTBEAT_INTERVAL_SECS", "heartbeat.interval_secs"),
    ("REPOINT_HEARTBEAT_TIMEOUT_SECS", "heartbeat.timeout_secs"),
    ("REPOINT_NOTIFICATIONS_ENABLED", "notifications.enabled"),
];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Config compatibility number; must be 1.
    pub version: u32,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub status_server: StatusServerConfig,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,

    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.version != 1 {
            anyhow::bail!("unsupported config version {}, expected 1", self.version);
        }

        let mut ids = HashSet::new();
        for group in &self.groups {
            if !ids.insert(group.id.as_str()) {
                anyhow::bail!("duplicate group id {}", group.id);
            }
            group.validate()?;
        }

        self.telemetry.logging.validate()?;
        self.heartbeat.validate()?;
        self.notifications.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name used in logs.
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "repoint".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// One of `debug`, `info`, `warn`, `error`.
    pub level: String,
    /// One of `json`, `text`.
    pub format: String,
}

impl LoggingConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !matches!(self.level.as_str(), "debug" | "info" | "warn" | "error") {
            anyhow::bail!("unsupported log level {}", self.level);
        }
        if !matches!(self.format.as_str(), "json" | "text") {
            anyhow::bail!("unsupported log format {}", self.format);
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "json".into(),
        }
    }
}

/// The embedded HTTP server exposing health, version and metrics.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusServerConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for StatusServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".into(),
            port: 8484,
        }
    }
}

/// Periodic GET ping against an external aliveness service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub url: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.url.trim().is_empty() {
            anyhow::bail!("heartbeat.url is required when the heartbeat is enabled");
        }
        if self.interval_secs == 0 {
            anyhow::bail!("heartbeat.interval_secs must be > 0");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("heartbeat.timeout_secs must be > 0");
        }
        Ok(())
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            interval_secs: 60,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub targets: Vec<NotificationTargetConfig>,
}

impl NotificationsConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.targets.is_empty() {
            anyhow::bail!("notifications are enabled but no targets are configured");
        }
        if self.targets.len() > 1 {
            anyhow::bail!("multiple notification targets are not supported yet");
        }
        for target in &self.targets {
            target.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationTargetKind {
    /// Mattermost-compatible incoming webhook.
    Webhook,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationTargetConfig {
    #[serde(rename = "type")]
    pub kind: NotificationTargetKind,

    pub url: String,

    #[serde(default)]
    pub username: String,

    /// Channel slug, not the display name.
    #[serde(default)]
    pub channel: String,

    #[serde(default)]
    pub icon_emoji: String,
}

impl NotificationTargetConfig {
    pub fn icon_emoji_or_default(&self) -> &str {
        if self.icon_emoji.is_empty() {
            ":dolphin:"
        } else {
            &self.icon_emoji
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.url.trim().is_empty() {
            anyhow::bail!("notification target url cannot be empty");
        }
        Ok(())
    }
}

/// Load the configuration from the given YAML file, applying the
/// `REPOINT_*` environment overrides on top.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    let mut builder = config::Config::builder()
        .add_source(config::File::from(path).format(FileFormat::Yaml))
        .set_default("version", 1)?;

    for (env_key, cfg_key) in ENV_OVERRIDES {
        if let Ok(value) = env::var(env_key) {
            builder = builder.set_override(*cfg_key, value)?;
        }
    }

    let cfg: Config = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

//! Configuration model for monitored groups and their health checks.
//!
//! The daemon crate owns file/env loading; this module owns the shapes and
//! their validation. Durations are `*_secs` integer fields where `0` (the
//! serde default) means "use the built-in default".

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 20;
const DEFAULT_PLAN_APPLY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;
const DEFAULT_CHECK_TIMEOUT_SECS: u64 = 10;

const ALLOWED_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH",
];

/// Which provider backs a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Hetzner,
}

/// Config for one independent group of floating IPs and servers.
///
/// Groups can carry their own provider credentials, so one daemon instance
/// can watch resources across different cloud accounts.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    /// Unique id, used in logs and metrics.
    pub id: String,
    pub display_name: String,

    /// Observe and notify only; never execute plans.
    #[serde(default)]
    pub readonly: bool,

    #[serde(default)]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub poll_timeout_secs: u64,
    #[serde(default)]
    pub plan_apply_timeout_secs: u64,

    /// Apply plans even while some servers still have unknown status.
    /// Off by default to avoid acting on half-debounced state at startup.
    #[serde(default)]
    pub plan_apply_with_unknown_status: bool,

    pub provider: ProviderKind,

    /// Hetzner credentials and selectors, required when `provider = hetzner`.
    #[serde(default)]
    pub hetzner: Option<HetznerConfig>,

    #[serde(default)]
    pub checks: Vec<HealthCheckConfig>,
}

impl GroupConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(non_zero_or(self.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS))
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(non_zero_or(self.poll_timeout_secs, DEFAULT_POLL_TIMEOUT_SECS))
    }

    pub fn plan_apply_timeout(&self) -> Duration {
        Duration::from_secs(non_zero_or(
            self.plan_apply_timeout_secs,
            DEFAULT_PLAN_APPLY_TIMEOUT_SECS,
        ))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.id.trim().is_empty() {
            anyhow::bail!("group id cannot be empty");
        }
        if self.display_name.trim().is_empty() {
            anyhow::bail!("group {}: display_name cannot be empty", self.id);
        }
        if self.provider == ProviderKind::Hetzner && self.hetzner.is_none() {
            anyhow::bail!(
                "group {}: hetzner section is required for the hetzner provider",
                self.id
            );
        }
        if let Some(hetzner) = &self.hetzner {
            hetzner
                .validate()
                .map_err(|err| err.context(format!("group {}", self.id)))?;
        }

        let mut ids = HashSet::new();
        for check in &self.checks {
            if !ids.insert(check.id.as_str()) {
                anyhow::bail!("group {}: duplicate check id {}", self.id, check.id);
            }
            check
                .validate()
                .map_err(|err| err.context(format!("group {}", self.id)))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HetznerConfig {
    /// API token used to authenticate against the Hetzner Cloud API.
    pub api_token: String,

    /// Project id as shown in the Hetzner Cloud console URL. The API has no
    /// way to list or verify it, so it must be known in advance.
    pub project_id: String,

    /// Override of the API endpoint; the public API when unset.
    #[serde(default)]
    pub api_endpoint: Option<String>,

    pub floating_ips: HetznerSelector,
    pub servers: HetznerSelector,
}

impl HetznerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_token.trim().is_empty() {
            anyhow::bail!("hetzner.api_token cannot be empty");
        }
        if self.project_id.trim().is_empty() {
            anyhow::bail!("hetzner.project_id cannot be empty");
        }
        self.floating_ips.validate()?;
        self.servers.validate()?;
        Ok(())
    }
}

/// Selects a set of Hetzner resources. An empty selector would match the
/// whole project, so it is rejected.
#[derive(Debug, Clone, Deserialize)]
pub struct HetznerSelector {
    pub label_selector: String,
}

impl HetznerSelector {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.label_selector.trim().is_empty() {
            anyhow::bail!("label_selector cannot be empty");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Http,
    Https,
}

impl CheckKind {
    pub fn scheme(&self) -> &'static str {
        match self {
            CheckKind::Http => "http",
            CheckKind::Https => "https",
        }
    }
}

/// Which address families a check probes on each server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    Ipv4,
    Ipv6,
    #[default]
    Both,
}

/// Config for one health check, run against every server in the group.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckConfig {
    /// Unique id within the group.
    pub id: String,
    pub display_name: String,

    #[serde(rename = "type")]
    pub kind: CheckKind,

    #[serde(default)]
    pub interval_secs: u64,
    #[serde(default)]
    pub timeout_secs: u64,

    /// Consecutive failures required to latch unhealthy.
    #[serde(default)]
    pub fall: u64,
    /// Consecutive successes required to latch healthy.
    #[serde(default)]
    pub rise: u64,

    #[serde(default)]
    pub method: String,

    /// Virtual host for the Host header and, for https, SNI. The server's
    /// certificate must match this value. Falls back to the target address.
    #[serde(default)]
    pub host: Option<String>,

    /// Port to probe; 80 for http and 443 for https when unset.
    #[serde(default)]
    pub port: u16,

    /// URL path, must start with `/`.
    pub path: String,

    #[serde(default)]
    pub ip_version: IpVersion,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(non_zero_or(self.interval_secs, DEFAULT_CHECK_INTERVAL_SECS))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(non_zero_or(self.timeout_secs, DEFAULT_CHECK_TIMEOUT_SECS))
    }

    pub fn port_or_default(&self) -> u16 {
        if self.port != 0 {
            return self.port;
        }
        match self.kind {
            CheckKind::Http => 80,
            CheckKind::Https => 443,
        }
    }

    pub fn method_or_default(&self) -> &str {
        if self.method.is_empty() {
            "GET"
        } else {
            &self.method
        }
    }

    pub fn rise_or_default(&self) -> u64 {
        non_zero_or(self.rise, 1)
    }

    pub fn fall_or_default(&self) -> u64 {
        non_zero_or(self.fall, 1)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.id.trim().is_empty() {
            anyhow::bail!("check id cannot be empty");
        }
        if self.display_name.is_empty() || self.display_name.len() > 128 {
            anyhow::bail!(
                "check {}: display_name must be between 1 and 128 characters",
                self.id
            );
        }
        if !self.path.starts_with('/') {
            anyhow::bail!("check {}: path must start with '/'", self.id);
        }
        if !self.method.is_empty() && !ALLOWED_METHODS.contains(&self.method.as_str()) {
            anyhow::bail!("check {}: unsupported method {}", self.id, self.method);
        }
        if self.kind == CheckKind::Https && self.host.as_deref().unwrap_or("").is_empty() {
            anyhow::bail!("check {}: https checks require host", self.id);
        }
        Ok(())
    }
}

fn non_zero_or(value: u64, default: u64) -> u64 {
    if value == 0 {
        default
    } else {
        value
    }
}

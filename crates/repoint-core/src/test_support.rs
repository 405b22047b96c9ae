//! Shared fixtures for unit tests.

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::check::{Check, CheckResult};
use crate::config::{CheckKind, GroupConfig, HealthCheckConfig, IpVersion, ProviderKind};
use crate::notify::Notifier;
use crate::provider::ProviderName;
use crate::resource::{FloatingIp, Server};

pub(crate) fn mock_server(
    id: &str,
    name: &str,
    location: &str,
    network_zone: &str,
    resource_index: i64,
) -> Server {
    Server {
        provider: ProviderName::Mock,
        id: id.into(),
        name: name.into(),
        location: location.into(),
        network_zone: network_zone.into(),
        resource_index,
        public_ipv4: Some(Ipv4Addr::LOCALHOST),
        public_ipv6: None,
    }
}

pub(crate) fn mock_floating_ip(
    id: &str,
    name: &str,
    location: &str,
    network_zone: &str,
) -> FloatingIp {
    FloatingIp {
        provider: ProviderName::Mock,
        id: id.into(),
        name: name.into(),
        location: location.into(),
        network_zone: network_zone.into(),
        address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        current_target: None,
        resource_index: -1,
    }
}

pub(crate) fn check_config(id: &str, kind: CheckKind) -> HealthCheckConfig {
    HealthCheckConfig {
        id: id.into(),
        display_name: format!("Check {id}"),
        kind,
        interval_secs: 0,
        timeout_secs: 0,
        fall: 0,
        rise: 0,
        method: String::new(),
        host: match kind {
            CheckKind::Http => None,
            CheckKind::Https => Some("check.example.com".into()),
        },
        port: 0,
        path: "/healthz".into(),
        ip_version: IpVersion::Both,
    }
}

pub(crate) fn group_config(id: &str) -> GroupConfig {
    GroupConfig {
        id: id.into(),
        display_name: format!("Group {id}"),
        readonly: false,
        poll_interval_secs: 0,
        poll_timeout_secs: 0,
        plan_apply_timeout_secs: 0,
        plan_apply_with_unknown_status: false,
        provider: ProviderKind::Hetzner,
        hetzner: None,
        checks: vec![],
    }
}

/// A check that replays a scripted sequence of results. Once the script is
/// exhausted it keeps returning the last result.
pub(crate) struct ScriptedCheck {
    cfg: HealthCheckConfig,
    script: Mutex<VecDeque<CheckResult>>,
    last: Mutex<CheckResult>,
}

impl ScriptedCheck {
    pub(crate) fn new(cfg: HealthCheckConfig, results: Vec<CheckResult>) -> Arc<Self> {
        let mut script: VecDeque<CheckResult> = results.into();
        let last = script.pop_back().unwrap_or_else(CheckResult::ok);
        script.push_back(last.clone());
        Arc::new(Self {
            cfg,
            script: Mutex::new(script),
            last: Mutex::new(last),
        })
    }

}

#[async_trait]
impl Check for ScriptedCheck {
    async fn check(&self) -> CheckResult {
        let mut script = self.script.lock().expect("lock");
        match script.pop_front() {
            Some(result) => {
                *self.last.lock().expect("lock") = result.clone();
                result
            }
            None => self.last.lock().expect("lock").clone(),
        }
    }

    fn config(&self) -> &HealthCheckConfig {
        &self.cfg
    }
}

/// Notifier that records every message for assertions.
#[derive(Default)]
#[derive(Debug)]
pub(crate) struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) -> anyhow::Result<()> {
        self.messages.lock().expect("lock").push(message.to_string());
        Ok(())
    }
}

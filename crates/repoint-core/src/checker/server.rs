use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::check::{DynCheck, HttpCheck};
use crate::checker::{CheckState, MultiCheck, MultiUpdate, StatefulUpdate};
use crate::config::{HealthCheckConfig, IpVersion};
use crate::resource::{HealthState, Server, Status, WithStatus};

/// An update to a server's derived health.
#[derive(Debug, Clone)]
pub struct ServerCheckUpdate {
    pub previous_state: HealthState,
    pub state: HealthState,
    pub state_changed: bool,

    /// The server that was checked.
    pub server: Server,

    /// The aggregate result that produced this update.
    pub result: MultiUpdate,
}

impl ServerCheckUpdate {
    pub fn unhealthy_checks(&self) -> Vec<&StatefulUpdate> {
        self.result.unhealthy_checks()
    }
}

/// Checks the health of one server's public interfaces.
///
/// For every configured check, one variant is created per address family the
/// server actually has (subject to the check's `ip_version`), with the check
/// id suffixed `__ipv4` / `__ipv6` so aggregation keys stay unique.
pub struct ServerChecker {
    server: Arc<WithStatus<Server>>,
    multi: MultiCheck,
}

impl ServerChecker {
    pub fn new(
        cfgs: &[HealthCheckConfig],
        server: Arc<WithStatus<Server>>,
    ) -> anyhow::Result<Self> {
        let checks = build_checks(cfgs, &server.resource)?;
        Ok(Self {
            server,
            multi: MultiCheck::new(checks),
        })
    }

    /// Run periodic checks until cancelled, keeping the server's status cell
    /// up to date and forwarding every aggregate update downstream.
    pub async fn run(self, token: CancellationToken, updates: mpsc::Sender<ServerCheckUpdate>) {
        let (multi_tx, mut multi_rx) = mpsc::channel(16);
        tokio::spawn(self.multi.run(token.clone(), multi_tx));

        let mut last_state = HealthState::unknown();
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                Some(multi_update) = multi_rx.recv() => {
                    let status = match multi_update.state {
                        CheckState::Healthy => Status::Healthy,
                        CheckState::Unknown => Status::Unknown,
                        CheckState::Unhealthy => Status::Unhealthy,
                    };
                    let state = HealthState {
                        status,
                        last_updated: Some(Utc::now()),
                    };
                    let state_changed = state.status != last_state.status;

                    let update = ServerCheckUpdate {
                        previous_state: last_state,
                        state,
                        state_changed,
                        server: self.server.resource.clone(),
                        result: multi_update,
                    };
                    if state_changed {
                        last_state = state;
                        self.server.set_state(state);
                    }
                    if updates.send(update).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

fn build_checks(cfgs: &[HealthCheckConfig], server: &Server) -> anyhow::Result<Vec<DynCheck>> {
    let mut checks: Vec<DynCheck> = Vec::new();
    for cfg in cfgs {
        if let Some(addr) = server.public_ipv4 {
            if cfg.ip_version != IpVersion::Ipv6 {
                let mut variant = cfg.clone();
                variant.id.push_str("__ipv4");
                checks.push(Arc::new(HttpCheck::new(variant, IpAddr::V4(addr))?));
            }
        }
        if let Some(addr) = server.public_ipv6 {
            if cfg.ip_version != IpVersion::Ipv4 {
                let mut variant = cfg.clone();
                variant.id.push_str("__ipv6");
                checks.push(Arc::new(HttpCheck::new(variant, IpAddr::V6(addr))?));
            }
        }
    }
    Ok(checks)
}

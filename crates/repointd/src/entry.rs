//! Assembles the daemon from configuration and runs it to completion.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use repoint_core::monitor::{GroupMonitor, Monitor};

use crate::{config, heartbeat, notifier, providers, telemetry, version};

/// Load the configuration and run the monitor until the token is cancelled.
///
/// A status-server failure (e.g. the port is already taken) cancels the
/// whole daemon and is returned as the fatal error; heartbeat failures are
/// only ever logged.
pub async fn monitor(config_path: &Path, token: CancellationToken) -> anyhow::Result<()> {
    let cfg = config::load(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    telemetry::init_tracing(&cfg.telemetry.logging);

    info!(
        version = version::VERSION,
        service = %cfg.service.name,
        groups = cfg.groups.len(),
        "repointd starting"
    );

    let notifier = notifier::from_config(&cfg.notifications)?;

    let mut groups = Vec::with_capacity(cfg.groups.len());
    for group_cfg in &cfg.groups {
        let provider = providers::build(group_cfg)
            .with_context(|| format!("failed to create provider for group {}", group_cfg.id))?;
        groups.push(GroupMonitor::new(
            group_cfg.clone(),
            provider,
            notifier.clone(),
        ));
    }
    let monitor = Monitor::new(groups, version::VERSION)?;

    let mut status_server: Option<JoinHandle<anyhow::Result<()>>> = None;
    if cfg.status_server.enabled {
        let handle = telemetry::init_metrics_recorder();
        let addr: SocketAddr = format!("{}:{}", cfg.status_server.host, cfg.status_server.port)
            .parse()
            .map_err(|err| anyhow::anyhow!("invalid status server bind address: {err}"))?;
        let shutdown = token.child_token();
        let fail_token = token.clone();
        status_server = Some(tokio::spawn(async move {
            let cancelled = shutdown.clone();
            let result =
                telemetry::serve_status(handle, addr, async move { cancelled.cancelled().await })
                    .await;
            if result.is_err() {
                // Running on without health/metrics endpoints would be
                // worse than exiting; cancel everything and surface the
                // error at shutdown.
                fail_token.cancel();
            }
            result
        }));
    }

    let mut heartbeat_task: Option<JoinHandle<()>> = None;
    if cfg.heartbeat.enabled {
        info!("starting heartbeat");
        let heartbeat_cfg = cfg.heartbeat.clone();
        let heartbeat_token = token.child_token();
        heartbeat_task = Some(tokio::spawn(async move {
            if let Err(err) = heartbeat::heartbeat_loop(heartbeat_cfg, heartbeat_token).await {
                error!(?err, "heartbeat loop terminated with error");
            }
        }));
    }

    let watch_result = monitor.watch(token.child_token()).await;

    // Bring the aux tasks down no matter why the monitor stopped, so the
    // joins below cannot hang.
    token.cancel();

    let mut status_result: anyhow::Result<()> = Ok(());
    if let Some(handle) = status_server {
        status_result = match handle.await {
            Ok(result) => result.context("status server failed"),
            Err(err) => Err(anyhow::anyhow!("status server task panicked: {err}")),
        };
    }
    if let Some(task) = heartbeat_task {
        let _ = task.await;
    }

    watch_result.and(status_result)
}

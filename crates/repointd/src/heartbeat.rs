//! Optional aliveness ping against an external monitoring service.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::HeartbeatConfig;

async fn ping(client: &reqwest::Client, cfg: &HeartbeatConfig) {
    debug!(url = %cfg.url, "sending heartbeat");
    match client.get(&cfg.url).send().await {
        Err(err) => error!(?err, "failed to send heartbeat"),
        Ok(response) if response.status() != reqwest::StatusCode::OK => {
            error!(status = %response.status(), "heartbeat returned non-200 status");
        }
        Ok(_) => {}
    }
}

/// Send a GET to the configured URL immediately and then on every interval,
/// until cancelled. Failures are logged and never propagate.
pub async fn heartbeat_loop(cfg: HeartbeatConfig, token: CancellationToken) -> anyhow::Result<()> {
    let client = reqwest::Client::builder().timeout(cfg.timeout()).build()?;
    let mut interval = tokio::time::interval(cfg.interval());

    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            _ = interval.tick() => {
                tokio::select! {
                    _ = token.cancelled() => return Ok(()),
                    _ = ping(&client, &cfg) => {}
                }
            }
        }
    }
}

use anyhow::Context;
use metrics::counter;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::GroupConfig;
use crate::provider::DynProvider;
use crate::resource::{Group, GroupChangeset};

/// The current inventory and the changes since the previous update.
#[derive(Debug, Clone)]
pub struct ResourceUpdate {
    /// Strictly increasing per watcher; used to detect stale actions.
    pub sequence: u64,
    pub resources: Group,
    pub changeset: GroupChangeset,
}

#[derive(Debug, Default)]
struct Snapshot {
    resources: Group,
    sequence: u64,
}

/// Polls the provider on a schedule and emits sequenced changesets.
///
/// The watcher is the only writer of the snapshot. Concurrent update
/// attempts (the timer and the controller's post-plan refresh) serialize on
/// an internal mutex.
#[derive(Debug)]
pub struct ResourceWatcher {
    cfg: GroupConfig,
    provider: DynProvider,
    snapshot: Mutex<Snapshot>,
}

impl ResourceWatcher {
    pub fn new(cfg: GroupConfig, provider: DynProvider) -> Self {
        Self {
            cfg,
            provider,
            snapshot: Mutex::new(Snapshot::default()),
        }
    }

    async fn poll(&self) -> anyhow::Result<Group> {
        let group = tokio::time::timeout(self.cfg.poll_timeout(), self.provider.poll())
            .await
            .with_context(|| {
                format!(
                    "provider poll timed out after {:?}",
                    self.cfg.poll_timeout()
                )
            })?
            .context("provider poll failed")?;
        Ok(group)
    }

    /// Poll once and fold the result into the snapshot. The sequence is
    /// bumped per attempt, including failed ones. Empty changesets are
    /// suppressed unless `force` is set. Returns the attempt's sequence.
    pub async fn perform_update(
        &self,
        on_change: &mpsc::Sender<ResourceUpdate>,
        on_error: &mpsc::Sender<anyhow::Error>,
        force: bool,
    ) -> u64 {
        let mut snapshot = self.snapshot.lock().await;
        snapshot.sequence += 1;
        let sequence = snapshot.sequence;

        match self.poll().await {
            Err(err) => {
                counter!("repoint_poll_total", "group" => self.cfg.id.clone(), "result" => "error")
                    .increment(1);
                // Keep the previous snapshot; the next poll may succeed.
                let _ = on_error.send(err).await;
            }
            Ok(resources) => {
                counter!("repoint_poll_total", "group" => self.cfg.id.clone(), "result" => "ok")
                    .increment(1);
                let changeset = GroupChangeset::diff(&snapshot.resources, &resources);
                snapshot.resources = resources.clone();
                if force || !changeset.is_empty() {
                    let _ = on_change
                        .send(ResourceUpdate {
                            sequence,
                            resources,
                            changeset,
                        })
                        .await;
                }
            }
        }
        sequence
    }

    /// Poll immediately, then on every poll interval, until cancelled.
    pub async fn run(
        &self,
        token: CancellationToken,
        on_change: mpsc::Sender<ResourceUpdate>,
        on_error: mpsc::Sender<anyhow::Error>,
    ) {
        let mut interval = tokio::time::interval(self.cfg.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => {
                    debug!(group = %self.cfg.id, "watcher polling resources");
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = self.perform_update(&on_change, &on_error, false) => {}
                    }
                }
            }
        }
    }
}

use std::sync::Arc;

use anyhow::Context;
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::GroupConfig;
use crate::monitor::{HealthKeeper, HealthKeeperAction, ResourceUpdate, ResourceWatcher};
use crate::notify::{render, DynNotifier};
use crate::plan::{Plan, PlanState};
use crate::provider::DynProvider;

/// Orchestrates one group: watcher, health keeper and plan execution.
#[derive(Debug)]
pub struct GroupMonitor {
    cfg: GroupConfig,
    provider: DynProvider,
    notifier: DynNotifier,
    watcher: Arc<ResourceWatcher>,
}

impl GroupMonitor {
    pub fn new(cfg: GroupConfig, provider: DynProvider, notifier: DynNotifier) -> Self {
        let watcher = Arc::new(ResourceWatcher::new(cfg.clone(), provider.clone()));
        Self {
            cfg,
            provider,
            notifier,
            watcher,
        }
    }

    pub fn group_id(&self) -> &str {
        &self.cfg.id
    }

    async fn notify(&self, message: &str) {
        if let Err(err) = self.notifier.notify(message).await {
            warn!(group = %self.cfg.id, ?err, "failed to send notification");
        }
    }

    /// Run the group until cancelled.
    pub async fn run(self, token: CancellationToken, version: &str) {
        let mut message = format!(
            ":eyes: Starting monitor for group **{}** (`{}`). repoint version `{}`.",
            self.cfg.display_name, self.cfg.id, version
        );
        if self.cfg.readonly {
            message.push_str(
                "\n:lock: **Read-only mode** enabled, no actions will be taken. \
                 Only unhealthy/healthy notifications will be sent.",
            );
        }
        self.notify(&message).await;

        let (change_tx, change_rx) = mpsc::channel::<ResourceUpdate>(16);
        let (error_tx, mut error_rx) = mpsc::channel::<anyhow::Error>(16);
        let (action_tx, mut action_rx) = mpsc::channel::<HealthKeeperAction>(1);

        debug!(group = %self.cfg.id, "starting resource watcher");
        {
            let watcher = self.watcher.clone();
            let token = token.child_token();
            let change_tx = change_tx.clone();
            let error_tx = error_tx.clone();
            tokio::spawn(async move { watcher.run(token, change_tx, error_tx).await });
        }

        let keeper = HealthKeeper::new(self.cfg.clone(), self.notifier.clone());
        tokio::spawn(keeper.run(token.child_token(), change_rx, action_tx));

        let mut min_sequence = 0u64;

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                Some(err) = error_rx.recv() => {
                    // Not fatal: the change that failed to be observed will
                    // be picked up by a later poll.
                    error!(group = %self.cfg.id, ?err, "resources watcher update failed");
                }
                Some(action) = action_rx.recv() => {
                    self.handle_action(action, &mut min_sequence, &change_tx, &error_tx)
                        .await;
                }
            }
        }
    }

    async fn handle_action(
        &self,
        action: HealthKeeperAction,
        min_sequence: &mut u64,
        change_tx: &mpsc::Sender<ResourceUpdate>,
        error_tx: &mpsc::Sender<anyhow::Error>,
    ) {
        // Updates that were buffered while a plan was being applied are no
        // longer trustworthy; the post-apply refresh supersedes them.
        if action.sequence < *min_sequence {
            debug!(
                group = %self.cfg.id,
                sequence = action.sequence,
                min_sequence = *min_sequence,
                "ignoring stale action"
            );
            return;
        }

        if self.cfg.readonly {
            info!(
                group = %self.cfg.id,
                plan_id = %action.plan.id,
                "read-only group, not executing plan"
            );
            return;
        }

        info!(group = %self.cfg.id, plan_id = %action.plan.id, "executing plan");
        self.notify(&render::render_plan_execution(
            &self.cfg,
            &action.state,
            &action.plan,
        ))
        .await;

        match self.execute_plan(&action.state, &action.plan).await {
            Err(err) => {
                counter!("repoint_plan_apply_total", "group" => self.cfg.id.clone(), "result" => "error")
                    .increment(1);
                error!(
                    group = %self.cfg.id,
                    plan_id = %action.plan.id,
                    ?err,
                    "failed to execute plan"
                );
                self.notify(&format!(
                    ":boom: Failed to execute plan `{}` for group **{}** (`{}`).\nError: `{}`",
                    action.plan.id, self.cfg.display_name, self.cfg.id, err
                ))
                .await;
            }
            Ok(()) => {
                counter!("repoint_plan_apply_total", "group" => self.cfg.id.clone(), "result" => "ok")
                    .increment(1);
                let unhealthy = action.state.unhealthy_server_count();
                gauge!("repoint_unhealthy_servers", "group" => self.cfg.id.clone())
                    .set(unhealthy as f64);
                info!(
                    group = %self.cfg.id,
                    plan_id = %action.plan.id,
                    unhealthy_servers = unhealthy,
                    "plan executed successfully"
                );

                let mut message = format!(
                    ":rocket: **Plan** `{}` **executed successfully** for group **{}** (`{}`).",
                    action.plan.id, self.cfg.display_name, self.cfg.id
                );
                if unhealthy > 0 {
                    message
                        .push_str(&format!("\n**Note: {unhealthy} servers are still _unhealthy_ :fire:.**"));
                } else {
                    message.push_str("\nNo servers are _unhealthy_.");
                }
                self.notify(&message).await;
            }
        }

        // Refresh the inventory regardless of the outcome and treat anything
        // derived from older polls as stale.
        *min_sequence = self.watcher.perform_update(change_tx, error_tx, true).await;
    }

    /// Apply the plan's actions in order, bounded by the configured timeout.
    async fn execute_plan(&self, state: &PlanState, plan: &Plan) -> anyhow::Result<()> {
        let apply = async {
            for action in &plan.actions {
                let flip = state
                    .floating_ips
                    .get(&action.floating_ip_id)
                    .with_context(|| {
                        format!("floating IP {} not found in state", action.floating_ip_id)
                    })?;
                let server = state.servers.get(&action.server_id).with_context(|| {
                    format!("server {} not found in state", action.server_id)
                })?;

                self.provider
                    .assign_floating_ip(flip, &server.resource)
                    .await
                    .with_context(|| {
                        format!(
                            "failed to assign floating IP {} to server {}",
                            action.floating_ip_id, action.server_id
                        )
                    })?;
                info!(
                    group = %self.cfg.id,
                    floating_ip_id = %action.floating_ip_id,
                    server_id = %action.server_id,
                    "floating IP assigned"
                );
            }
            Ok(())
        };

        tokio::time::timeout(self.cfg.plan_apply_timeout(), apply)
            .await
            .with_context(|| {
                format!(
                    "plan apply timed out after {:?}",
                    self.cfg.plan_apply_timeout()
                )
            })?
    }
}

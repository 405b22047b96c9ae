use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::checker::{ServerCheckUpdate, ServerChecker};
use crate::config::GroupConfig;
use crate::monitor::ResourceUpdate;
use crate::notify::{render, DynNotifier};
use crate::plan::{self, Plan, PlanState};
use crate::resource::{HealthState, Identified, Server, Status, WithStatus};

/// A plan the health keeper wants executed, together with the state it was
/// computed from and the inventory sequence it is based on.
#[derive(Debug, Clone)]
pub struct HealthKeeperAction {
    pub sequence: u64,
    pub state: PlanState,
    pub plan: Plan,
}

/// Tracks the health of a group's resources and asks for corrective actions.
///
/// Owns the authoritative in-memory state: inventory changesets flow in from
/// the watcher, per-server checker subtasks report back, and whenever the
/// picture changes a fresh plan is computed.
pub struct HealthKeeper {
    cfg: GroupConfig,
    notifier: DynNotifier,

    state: PlanState,
    tracker_tokens: HashMap<String, CancellationToken>,
    seen_initial_update: bool,
    sequence: u64,
}

impl HealthKeeper {
    pub fn new(cfg: GroupConfig, notifier: DynNotifier) -> Self {
        Self {
            cfg,
            notifier,
            state: PlanState::default(),
            tracker_tokens: HashMap::new(),
            seen_initial_update: false,
            sequence: 0,
        }
    }

    /// Consume inventory updates and check results until cancelled,
    /// emitting actions whenever the state calls for one.
    pub async fn run(
        mut self,
        token: CancellationToken,
        mut resource_updates: mpsc::Receiver<ResourceUpdate>,
        actions: mpsc::Sender<HealthKeeperAction>,
    ) {
        // One channel fans in the updates of every server checker.
        let (check_tx, mut check_rx) = mpsc::channel::<ServerCheckUpdate>(32);

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                Some(update) = resource_updates.recv() => {
                    info!(group = %self.cfg.id, sequence = update.sequence, "resources changed, updating state");
                    self.apply_resource_update(&token, update, &check_tx).await;
                }
                Some(update) = check_rx.recv() => {
                    self.handle_check_update(update, &actions).await;
                }
            }
        }
    }

    fn start_tracker(
        &mut self,
        token: &CancellationToken,
        server: Server,
        check_tx: &mpsc::Sender<ServerCheckUpdate>,
    ) {
        let with_status = WithStatus::new(server, HealthState::unknown());
        let checker = match ServerChecker::new(&self.cfg.checks, with_status.clone()) {
            Ok(checker) => checker,
            Err(err) => {
                // Config validation should make this unreachable; keep the
                // server visible (as unknown) rather than dropping it.
                error!(
                    group = %self.cfg.id,
                    server_id = %with_status.resource.id,
                    ?err,
                    "failed to build server checker"
                );
                self.state
                    .servers
                    .insert(with_status.resource.id.clone(), with_status);
                return;
            }
        };

        let child = token.child_token();
        self.tracker_tokens
            .insert(with_status.resource.id.clone(), child.clone());
        self.state
            .servers
            .insert(with_status.resource.id.clone(), with_status);
        tokio::spawn(checker.run(child, check_tx.clone()));
    }

    fn stop_tracker(&mut self, server_id: &str) {
        if let Some(tracker) = self.tracker_tokens.remove(server_id) {
            tracker.cancel();
        }
        self.state.servers.remove(server_id);
    }

    async fn apply_resource_update(
        &mut self,
        token: &CancellationToken,
        update: ResourceUpdate,
        check_tx: &mpsc::Sender<ServerCheckUpdate>,
    ) {
        self.sequence = update.sequence;
        let changeset = update.changeset;

        if changeset.is_empty() {
            debug!(group = %self.cfg.id, "no changes");
            return;
        }

        // Membership changes are worth telling the operators about, except
        // for the initial snapshot at startup.
        if self.seen_initial_update && !changeset.is_updates_only() {
            let message = format!(
                ":zap: Resources in group **{}** (`{}`) changed substantially.\n```\n{}\n```",
                self.cfg.display_name, self.cfg.id, changeset
            );
            if let Err(err) = self.notifier.notify(&message).await {
                warn!(group = %self.cfg.id, ?err, "failed to send notification");
            }
        }
        self.seen_initial_update = true;

        for flip in changeset
            .floating_ips
            .added
            .into_iter()
            .chain(changeset.floating_ips.updated)
        {
            self.state.floating_ips.insert(flip.id.clone(), flip);
        }
        for flip in &changeset.floating_ips.removed {
            self.state.floating_ips.remove(flip.id());
        }

        for server in changeset.servers.added {
            self.start_tracker(token, server, check_tx);
        }
        for server in changeset.servers.updated {
            // Any field change may invalidate the check endpoints, so the
            // tracker is fully restarted; the server passes through unknown
            // again even when only a label changed.
            self.stop_tracker(server.id());
            self.start_tracker(token, server, check_tx);
        }
        for server in &changeset.servers.removed {
            self.stop_tracker(server.id());
        }
    }

    async fn handle_check_update(
        &mut self,
        update: ServerCheckUpdate,
        actions: &mpsc::Sender<HealthKeeperAction>,
    ) {
        let server_id = update.server.id.clone();
        if !self.state.servers.contains_key(&server_id) {
            // An update can be buffered for a server that was removed since.
            warn!(
                group = %self.cfg.id,
                server_id = %server_id,
                "server no longer in state, dropping check update"
            );
            return;
        }

        let last_update = update.result.last_update();
        debug!(
            group = %self.cfg.id,
            server_id = %server_id,
            check_id = %last_update.check_id,
            state = %update.state.status,
            rise = last_update.rise,
            fall = last_update.fall,
            "server health check completed"
        );

        if update.state_changed {
            info!(
                group = %self.cfg.id,
                server_id = %server_id,
                server_name = %update.server.name,
                status = %update.state.status,
                "server state changed"
            );
            self.notify_state_change(&update).await;
        }

        let action_plan = plan::plan(&self.state);
        if action_plan.is_empty() {
            debug!(group = %self.cfg.id, "no actions required");
            return;
        }

        if !self.cfg.plan_apply_with_unknown_status && self.state.has_servers_with_unknown_status()
        {
            // Acting before every check has debounced would produce a burst
            // of churn at startup.
            debug!(
                group = %self.cfg.id,
                "servers with unknown status remain, deferring plan"
            );
            return;
        }

        info!(
            group = %self.cfg.id,
            plan_id = %action_plan.id,
            plan = %action_plan,
            "actions required"
        );
        let _ = actions
            .send(HealthKeeperAction {
                sequence: self.sequence,
                state: self.state.clone(),
                plan: action_plan,
            })
            .await;
    }

    async fn notify_state_change(&self, update: &ServerCheckUpdate) {
        let message = match update.state.status {
            Status::Unhealthy => {
                let failing: Vec<String> = update
                    .unhealthy_checks()
                    .iter()
                    .map(|check| {
                        format!(
                            "{}: {}",
                            check.check_id,
                            check.result.error.as_deref().unwrap_or("check failed")
                        )
                    })
                    .collect();
                error!(
                    group = %self.cfg.id,
                    server_id = %update.server.id,
                    failing = ?failing,
                    "server became unhealthy"
                );
                Some(format!(
                    ":fire: Server **`{}`** ({}) in location `{}` became **_unhealthy_**.\n```\n{}\n```\n{}",
                    update.server.name,
                    update.server.id,
                    update.server.location,
                    failing.join("\n"),
                    render::render_state(&self.cfg, &self.state),
                ))
            }
            // The first unknown -> healthy transition is normal startup.
            Status::Healthy if update.previous_state.status != Status::Unknown => Some(format!(
                ":white_check_mark: Server **`{}`** ({}) in location `{}` became **_healthy_** again.\n{}",
                update.server.name,
                update.server.id,
                update.server.location,
                render::render_state(&self.cfg, &self.state),
            )),
            _ => None,
        };

        if let Some(message) = message {
            if let Err(err) = self.notifier.notify(&message).await {
                warn!(group = %self.cfg.id, ?err, "failed to send notification");
            }
        }
    }
}

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::check::DynCheck;
use crate::checker::{CheckState, Stateful, StatefulUpdate};

/// An update from a multi check: the aggregate over the most recent update
/// of every child check.
#[derive(Debug, Clone)]
pub struct MultiUpdate {
    /// Worst state across all children seen so far.
    pub state: CheckState,

    /// Id of the child whose update triggered this emission.
    pub last_updated_id: String,

    /// Most recent update per child check id.
    pub updates: HashMap<String, StatefulUpdate>,
}

impl MultiUpdate {
    /// The child update that triggered this emission.
    pub fn last_update(&self) -> &StatefulUpdate {
        &self.updates[&self.last_updated_id]
    }

    pub fn unhealthy_checks(&self) -> Vec<&StatefulUpdate> {
        let mut unhealthy: Vec<_> = self
            .updates
            .values()
            .filter(|update| update.state == CheckState::Unhealthy)
            .collect();
        unhealthy.sort_by(|a, b| a.check_id.cmp(&b.check_id));
        unhealthy
    }
}

/// Fans N stateful checks into one aggregated signal.
///
/// Children run in parallel, each on its own schedule; every child emission
/// recomputes the aggregate as the worst of the latest per-child states.
pub struct MultiCheck {
    checks: Vec<Stateful>,
}

impl MultiCheck {
    pub fn new(checks: Vec<DynCheck>) -> Self {
        Self {
            checks: checks.into_iter().map(Stateful::new).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub async fn run(self, token: CancellationToken, updates: mpsc::Sender<MultiUpdate>) {
        let (child_tx, mut child_rx) = mpsc::channel(16);
        for check in self.checks {
            tokio::spawn(check.run(token.clone(), child_tx.clone()));
        }
        drop(child_tx);

        let mut last_updates: HashMap<String, StatefulUpdate> = HashMap::new();
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                Some(child_update) = child_rx.recv() => {
                    let id = child_update.check_id.clone();
                    last_updates.insert(id.clone(), child_update);

                    let state = last_updates
                        .values()
                        .map(|update| update.state)
                        .max()
                        .unwrap_or(CheckState::Healthy);
                    let update = MultiUpdate {
                        state,
                        last_updated_id: id,
                        updates: last_updates.clone(),
                    };
                    if updates.send(update).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

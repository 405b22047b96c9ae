use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::check::{CheckResult, DynCheck};
use crate::checker::{CheckState, Periodic, PeriodicUpdate};

/// An update from a stateful (debounced) health check.
#[derive(Debug, Clone)]
pub struct StatefulUpdate {
    pub result: CheckResult,
    pub timestamp: DateTime<Utc>,
    pub duration: Duration,

    /// Debounced state after applying this result.
    pub state: CheckState,

    /// Id of the check this update belongs to.
    pub check_id: String,

    /// Consecutive successes so far.
    pub rise: u64,
    /// Consecutive failures so far.
    pub fall: u64,
}

/// Debounces a periodic check with rise/fall thresholds.
///
/// The state starts as unknown and latches healthy after `rise` consecutive
/// successes or unhealthy after `fall` consecutive failures.
pub struct Stateful {
    check: DynCheck,
    id: String,
    rise_threshold: u64,
    fall_threshold: u64,
    rise: u64,
    fall: u64,
    state: CheckState,
}

impl Stateful {
    pub fn new(check: DynCheck) -> Self {
        let cfg = check.config();
        let id = cfg.id.clone();
        let rise_threshold = cfg.rise_or_default();
        let fall_threshold = cfg.fall_or_default();
        Self {
            check,
            id,
            rise_threshold,
            fall_threshold,
            rise: 0,
            fall: 0,
            state: CheckState::Unknown,
        }
    }

    /// Feed one observation into the counters and return the new state.
    fn observe(&mut self, healthy: bool) -> CheckState {
        if healthy {
            self.rise += 1;
            self.fall = 0;
        } else {
            self.fall += 1;
            self.rise = 0;
        }

        if self.rise >= self.rise_threshold {
            self.state = CheckState::Healthy;
        } else if self.fall >= self.fall_threshold {
            self.state = CheckState::Unhealthy;
        }
        self.state
    }

    fn to_update(&self, periodic: PeriodicUpdate) -> StatefulUpdate {
        StatefulUpdate {
            result: periodic.result,
            timestamp: periodic.started_at,
            duration: periodic.duration,
            state: self.state,
            check_id: self.id.clone(),
            rise: self.rise,
            fall: self.fall,
        }
    }

    /// Run until cancelled, emitting one update per underlying execution.
    pub async fn run(mut self, token: CancellationToken, updates: mpsc::Sender<StatefulUpdate>) {
        let (periodic_tx, mut periodic_rx) = mpsc::channel(16);
        let periodic = Periodic::new(self.check.clone());
        tokio::spawn(periodic.run(token.clone(), periodic_tx));

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                Some(periodic_update) = periodic_rx.recv() => {
                    self.observe(periodic_update.result.healthy());
                    let update = self.to_update(periodic_update);
                    if updates.send(update).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckKind;
    use crate::test_support::{check_config, ScriptedCheck};

    fn debouncer(rise: u64, fall: u64) -> Stateful {
        let mut cfg = check_config("web", CheckKind::Http);
        cfg.rise = rise;
        cfg.fall = fall;
        Stateful::new(ScriptedCheck::new(cfg, vec![]))
    }

    #[test]
    fn latches_after_thresholds() {
        // rise=3/fall=2 over F,F,S,S,S,F,F: one failure leaves the state
        // unknown, the second latches unhealthy, three successes latch
        // healthy, one failure is tolerated, the second flips back.
        let mut stateful = debouncer(3, 2);

        let observations = [false, false, true, true, true, false, false];
        let states: Vec<_> = observations
            .into_iter()
            .map(|healthy| stateful.observe(healthy))
            .collect();

        assert_eq!(
            states,
            vec![
                CheckState::Unknown,
                CheckState::Unhealthy,
                CheckState::Unhealthy,
                CheckState::Unhealthy,
                CheckState::Healthy,
                CheckState::Healthy,
                CheckState::Unhealthy,
            ]
        );
    }

    #[test]
    fn counters_reset_each_other() {
        let mut stateful = debouncer(3, 3);

        stateful.observe(true);
        stateful.observe(true);
        assert_eq!(stateful.rise, 2);
        assert_eq!(stateful.fall, 0);

        stateful.observe(false);
        assert_eq!(stateful.rise, 0);
        assert_eq!(stateful.fall, 1);

        stateful.observe(true);
        assert_eq!(stateful.rise, 1);
        assert_eq!(stateful.fall, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pipeline_carries_counters_and_state() {
        let mut cfg = check_config("web", CheckKind::Http);
        cfg.rise = 2;
        cfg.fall = 1;
        let check = ScriptedCheck::new(
            cfg,
            vec![
                CheckResult::ok(),
                CheckResult::ok(),
                CheckResult::failure("down"),
            ],
        );
        let (tx, mut rx) = mpsc::channel(16);
        let token = CancellationToken::new();
        tokio::spawn(Stateful::new(check).run(token.clone(), tx));

        let first = rx.recv().await.expect("update");
        assert_eq!(first.check_id, "web");
        assert_eq!(first.state, CheckState::Unknown);
        assert_eq!((first.rise, first.fall), (1, 0));

        let second = rx.recv().await.expect("update");
        assert_eq!(second.state, CheckState::Healthy);
        assert_eq!((second.rise, second.fall), (2, 0));

        let third = rx.recv().await.expect("update");
        assert_eq!(third.state, CheckState::Unhealthy);
        assert_eq!((third.rise, third.fall), (0, 1));

        token.cancel();
    }
}

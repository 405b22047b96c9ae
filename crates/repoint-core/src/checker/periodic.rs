use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::check::{CheckResult, DynCheck};

/// One timed execution of a check.
#[derive(Debug, Clone)]
pub struct PeriodicUpdate {
    pub result: CheckResult,

    /// When the check was started.
    pub started_at: DateTime<Utc>,

    /// How long the check took.
    pub duration: Duration,
}

/// Runs a check once immediately and then on a fixed interval.
///
/// Checks never overlap: a tick that fires while the previous execution is
/// still running is delayed, not run concurrently.
pub struct Periodic {
    check: DynCheck,
}

impl Periodic {
    pub fn new(check: DynCheck) -> Self {
        Self { check }
    }

    async fn run_once(&self) -> PeriodicUpdate {
        let started_at = Utc::now();
        let started = Instant::now();
        let result = self.check.check().await;
        PeriodicUpdate {
            result,
            started_at,
            duration: started.elapsed(),
        }
    }

    /// Run until cancelled, emitting one update per execution. The stream
    /// just stops on cancellation; no synthetic final result is emitted.
    pub async fn run(self, token: CancellationToken, updates: mpsc::Sender<PeriodicUpdate>) {
        let mut interval = tokio::time::interval(self.check.config().interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => {
                    let update = tokio::select! {
                        _ = token.cancelled() => return,
                        update = self.run_once() => update,
                    };
                    if updates.send(update).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

//! Per-group monitoring: inventory watching, health keeping and plan
//! execution, plus the top-level fan-out over all configured groups.

mod group;
mod health;
mod watcher;

pub use group::GroupMonitor;
pub use health::{HealthKeeper, HealthKeeperAction};
pub use watcher::{ResourceUpdate, ResourceWatcher};

use tokio_util::sync::CancellationToken;
use tracing::error;

/// Watches multiple independent groups in parallel.
#[derive(Debug)]
pub struct Monitor {
    groups: Vec<GroupMonitor>,
    version: String,
}

impl Monitor {
    pub fn new(groups: Vec<GroupMonitor>, version: impl Into<String>) -> anyhow::Result<Self> {
        if groups.is_empty() {
            anyhow::bail!("no groups to monitor, check your configuration");
        }
        Ok(Self {
            groups,
            version: version.into(),
        })
    }

    /// Run all groups until the token is cancelled.
    pub async fn watch(self, token: CancellationToken) -> anyhow::Result<()> {
        let mut handles = Vec::new();
        for group in self.groups {
            let token = token.child_token();
            let version = self.version.clone();
            handles.push(tokio::spawn(async move {
                group.run(token, &version).await;
            }));
        }

        for handle in handles {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    error!(?err, "group monitor panicked");
                    anyhow::bail!("group monitor panicked");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_requires_at_least_one_group() {
        let err = Monitor::new(vec![], "0.0.0").expect_err("no groups");
        assert!(err.to_string().contains("no groups to monitor"));
    }
}

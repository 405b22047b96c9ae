//! Outbound operator notifications.

use std::sync::Arc;

use async_trait::async_trait;

pub mod render;

pub type DynNotifier = Arc<dyn Notifier>;

/// A sink for human-readable markdown notifications.
///
/// Delivery failures are the sink's problem to report; callers log and move
/// on, a notification is never allowed to wedge the control loop.
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    async fn notify(&self, message: &str) -> anyhow::Result<()>;
}

/// Discards every notification.
#[derive(Debug)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _message: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

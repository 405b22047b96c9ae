//! Webhook notifier, Mattermost-compatible.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use repoint_core::notify::{DynNotifier, NoopNotifier, Notifier};

use crate::config::{NotificationTargetConfig, NotificationTargetKind, NotificationsConfig};

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    username: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    channel: &'a str,
    icon_emoji: &'a str,
}

/// POSTs notifications as JSON to a configured incoming-webhook URL and
/// expects HTTP 200.
#[derive(Debug)]
pub struct WebhookNotifier {
    cfg: NotificationTargetConfig,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(cfg: NotificationTargetConfig) -> Self {
        Self {
            cfg,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) -> anyhow::Result<()> {
        debug!(url = %self.cfg.url, "sending webhook notification");

        let body = WebhookMessage {
            text: message,
            username: &self.cfg.username,
            channel: &self.cfg.channel,
            icon_emoji: self.cfg.icon_emoji_or_default(),
        };
        let response = self
            .client
            .post(&self.cfg.url)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            anyhow::bail!("webhook returned non-200 status: {status}");
        }
        Ok(())
    }
}

/// Build the notifier the configuration asks for; a disabled section yields
/// the no-op sink.
pub fn from_config(cfg: &NotificationsConfig) -> anyhow::Result<DynNotifier> {
    if !cfg.enabled {
        return Ok(Arc::new(NoopNotifier));
    }
    match cfg.targets.as_slice() {
        [] => anyhow::bail!("notifications are enabled but no targets are configured"),
        [target] => match target.kind {
            NotificationTargetKind::Webhook => Ok(Arc::new(WebhookNotifier::new(target.clone()))),
        },
        _ => anyhow::bail!("multiple notification targets are not supported yet"),
    }
}

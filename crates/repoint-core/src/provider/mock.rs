//! In-memory provider used by unit and integration tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::provider::{Provider, ProviderError, ProviderName};
use crate::resource::{FloatingIp, Group, Identified, Server};

#[derive(Debug, Default)]
struct Inner {
    servers: Vec<Server>,
    floating_ips: Vec<FloatingIp>,
    poll_error: Option<String>,
    assign_error: Option<String>,
    assign_calls: Vec<(String, String)>,
}

/// A provider backed by plain vectors, with injectable delays and failures.
///
/// `assign_floating_ip` mutates the stored floating IP's target, so a
/// subsequent poll observes the reassignment just like a real provider.
#[derive(Debug, Default)]
pub struct MockProvider {
    inner: Mutex<Inner>,
    pub poll_delay: Duration,
    pub assign_delay: Duration,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    pub fn with_assign_delay(mut self, delay: Duration) -> Self {
        self.assign_delay = delay;
        self
    }

    pub fn push_server(&self, server: Server) {
        self.inner.lock().expect("lock").servers.push(server);
    }

    pub fn push_floating_ip(&self, floating_ip: FloatingIp) {
        self.inner
            .lock()
            .expect("lock")
            .floating_ips
            .push(floating_ip);
    }

    pub fn set_servers(&self, servers: Vec<Server>) {
        self.inner.lock().expect("lock").servers = servers;
    }

    pub fn remove_server(&self, id: &str) {
        self.inner
            .lock()
            .expect("lock")
            .servers
            .retain(|s| s.id != id);
    }

    pub fn set_poll_error(&self, message: Option<&str>) {
        self.inner.lock().expect("lock").poll_error = message.map(String::from);
    }

    pub fn set_assign_error(&self, message: Option<&str>) {
        self.inner.lock().expect("lock").assign_error = message.map(String::from);
    }

    pub fn floating_ips(&self) -> Vec<FloatingIp> {
        self.inner.lock().expect("lock").floating_ips.clone()
    }

    /// `(floating_ip_id, server_id)` pairs in the order they were attempted.
    pub fn assign_calls(&self) -> Vec<(String, String)> {
        self.inner.lock().expect("lock").assign_calls.clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Mock
    }

    async fn poll(&self) -> Result<Group, ProviderError> {
        if !self.poll_delay.is_zero() {
            tokio::time::sleep(self.poll_delay).await;
        }

        let inner = self.inner.lock().expect("lock");
        if let Some(message) = &inner.poll_error {
            return Err(ProviderError::api("mock poll", anyhow::anyhow!("{message}")));
        }
        Ok(Group {
            servers: inner.servers.clone(),
            floating_ips: inner.floating_ips.clone(),
        })
    }

    async fn assign_floating_ip(
        &self,
        floating_ip: &FloatingIp,
        server: &Server,
    ) -> Result<(), ProviderError> {
        if !self.assign_delay.is_zero() {
            tokio::time::sleep(self.assign_delay).await;
        }

        let mut inner = self.inner.lock().expect("lock");
        inner
            .assign_calls
            .push((floating_ip.id.clone(), server.id.clone()));
        if let Some(message) = &inner.assign_error {
            return Err(ProviderError::api(
                "mock assign",
                anyhow::anyhow!("{message}"),
            ));
        }
        if let Some(stored) = inner
            .floating_ips
            .iter_mut()
            .find(|f| f.id() == floating_ip.id())
        {
            stored.current_target = Some(server.id.clone());
        }
        Ok(())
    }
}

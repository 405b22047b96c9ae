//! The narrow interface the core consumes to talk to a cloud provider.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::resource::{FloatingIp, Group, Server};

pub mod mock;

pub type DynProvider = Arc<dyn Provider>;

/// Identifies a cloud provider implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    Hetzner,
    /// In-memory provider used by tests.
    Mock,
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderName::Hetzner => "hetzner",
            ProviderName::Mock => "mock",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The resource handed to the provider belongs to a different provider.
    #[error("resource belongs to a different provider")]
    WrongProvider,

    #[error("provider is read-only")]
    ReadOnly,

    #[error("failed to reach provider API: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{context}: {source}")]
    Api {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ProviderError {
    pub fn api(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Api {
            context: context.into(),
            source: source.into(),
        }
    }
}

/// A cloud provider that owns a group's inventory.
///
/// Callers bound `poll` and `assign_floating_ip` with their own timeouts by
/// dropping the returned future; implementations only need to keep each
/// suspension point cancel-safe.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Opaque identifier of the provider.
    fn name(&self) -> ProviderName;

    /// Full inventory snapshot. May be expensive.
    async fn poll(&self) -> Result<Group, ProviderError>;

    /// Point one floating IP at one server. A failed assign may or may not
    /// have taken effect; the next poll is authoritative.
    async fn assign_floating_ip(
        &self,
        floating_ip: &FloatingIp,
        server: &Server,
    ) -> Result<(), ProviderError>;
}

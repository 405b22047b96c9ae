//! Provider adapters wired up from group configuration.

use std::sync::Arc;

use repoint_core::config::{GroupConfig, ProviderKind};
use repoint_core::provider::DynProvider;

pub mod hetzner;

pub use hetzner::HetznerProvider;

/// Build the provider a group is configured for.
pub fn build(group: &GroupConfig) -> anyhow::Result<DynProvider> {
    match group.provider {
        ProviderKind::Hetzner => Ok(Arc::new(HetznerProvider::new(group)?)),
    }
}

use std::fmt;
use std::net::IpAddr;

use serde::Serialize;

use crate::provider::ProviderName;
use crate::resource::Identified;

/// A reassignable public IP that the provider can repoint between servers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FloatingIp {
    /// Cloud provider the floating IP belongs to.
    pub provider: ProviderName,

    /// Provider-unique identifier.
    pub id: String,

    pub name: String,

    /// Home datacenter of the floating IP, e.g. `fsn1`.
    pub location: String,

    /// Network zone that bounds which servers may hold this IP.
    pub network_zone: String,

    /// The address itself, IPv4 or IPv6.
    pub address: IpAddr,

    /// Id of the server this IP currently points at, `None` when unassigned.
    pub current_target: Option<String>,

    /// Operator-assigned pairing index, `-1` when unspecified.
    pub resource_index: i64,
}

impl Identified for FloatingIp {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for FloatingIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FloatingIp{{id: {}, name: {}, address: {}, location: {}/{}, target: {}}}",
            self.id,
            self.name,
            self.address,
            self.location,
            self.network_zone,
            self.current_target.as_deref().unwrap_or("<unassigned>")
        )
    }
}

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::Serialize;

use crate::provider::ProviderName;
use crate::resource::Identified;

/// A physical or virtual server that can be the target of a floating IP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Server {
    /// Cloud provider the server belongs to.
    pub provider: ProviderName,

    /// Provider-unique identifier.
    pub id: String,

    pub name: String,

    /// Datacenter the server runs in, e.g. `fsn1`.
    pub location: String,

    /// Network zone the datacenter belongs to, e.g. `eu-central`.
    pub network_zone: String,

    /// Operator-assigned index used to pair servers with "their" floating
    /// IPs during planning. `-1` when unspecified.
    pub resource_index: i64,

    pub public_ipv4: Option<Ipv4Addr>,

    pub public_ipv6: Option<Ipv6Addr>,
}

impl Identified for Server {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Server{{id: {}, name: {}, location: {}/{}, index: {}}}",
            self.id, self.name, self.location, self.network_zone, self.resource_index
        )
    }
}

use std::collections::HashMap;

use crate::resource::{FloatingIp, Identified, Server};

/// A snapshot of the resources in one monitored group, usually the result of
/// a provider poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub servers: Vec<Server>,
    pub floating_ips: Vec<FloatingIp>,
}

impl Group {
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty() && self.floating_ips.is_empty()
    }

    pub fn servers_by_id(&self) -> HashMap<&str, &Server> {
        self.servers.iter().map(|s| (s.id(), s)).collect()
    }

    pub fn floating_ips_by_id(&self) -> HashMap<&str, &FloatingIp> {
        self.floating_ips.iter().map(|f| (f.id(), f)).collect()
    }
}

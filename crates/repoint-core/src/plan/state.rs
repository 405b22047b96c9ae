use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::resource::{FloatingIp, Group, HealthState, Server, Status, WithStatus};

/// The planner's view of a group: floating IPs by id and servers (with their
/// live status cells) by id.
#[derive(Debug, Clone, Default)]
pub struct PlanState {
    pub floating_ips: HashMap<String, FloatingIp>,
    pub servers: HashMap<String, Arc<WithStatus<Server>>>,
}

impl PlanState {
    pub fn new(floating_ips: Vec<FloatingIp>, servers: Vec<Arc<WithStatus<Server>>>) -> Self {
        Self {
            floating_ips: floating_ips
                .into_iter()
                .map(|f| (f.id.clone(), f))
                .collect(),
            servers: servers
                .into_iter()
                .map(|s| (s.resource.id.clone(), s))
                .collect(),
        }
    }

    /// Build a state from a raw snapshot; every server starts unknown.
    pub fn from_group(group: &Group) -> Self {
        Self::new(
            group.floating_ips.clone(),
            group
                .servers
                .iter()
                .map(|server| WithStatus::new(server.clone(), HealthState::unknown()))
                .collect(),
        )
    }

    /// Healthy servers, or all servers when none are healthy (pointing at a
    /// possibly-down server beats pointing at nothing). Sorted by location,
    /// then resource index with `-1` last, then name.
    pub fn candidate_servers(&self) -> Vec<Arc<WithStatus<Server>>> {
        let mut candidates: Vec<_> = self
            .servers
            .values()
            .filter(|server| server.is_healthy())
            .cloned()
            .collect();

        if candidates.is_empty() {
            if !self.servers.is_empty() {
                warn!("no healthy servers found, considering all servers");
            }
            candidates = self.servers.values().cloned().collect();
        }

        candidates.sort_by(|a, b| {
            let a = &a.resource;
            let b = &b.resource;
            a.location
                .cmp(&b.location)
                .then_with(|| match (a.resource_index, b.resource_index) {
                    (-1, -1) => Ordering::Equal,
                    (-1, _) => Ordering::Greater,
                    (_, -1) => Ordering::Less,
                    (x, y) => x.cmp(&y),
                })
                .then_with(|| a.name.cmp(&b.name))
        });
        candidates
    }

    /// Floating IPs whose target this tool may manage, sorted by id for
    /// deterministic planning. IPs pointed at a server outside the group are
    /// excluded; we must not disturb assignments we do not own.
    pub fn candidate_floating_ips(&self) -> Vec<&FloatingIp> {
        let mut candidates: Vec<_> = self
            .floating_ips
            .values()
            .filter(|flip| match &flip.current_target {
                Some(target) if !self.servers.contains_key(target) => {
                    warn!(
                        floating_ip_id = %flip.id,
                        server_id = %target,
                        "floating IP points at a server outside the group"
                    );
                    false
                }
                _ => true,
            })
            .collect();
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        candidates
    }

    pub fn unassigned_floating_ips(&self) -> Vec<&FloatingIp> {
        let mut unassigned: Vec<_> = self
            .floating_ips
            .values()
            .filter(|flip| flip.current_target.is_none())
            .collect();
        unassigned.sort_by(|a, b| a.name.cmp(&b.name));
        unassigned
    }

    /// Floating IPs currently pointed at an unhealthy server.
    pub fn unhealthy_floating_ips(&self) -> Vec<&FloatingIp> {
        let mut unhealthy: Vec<_> = self
            .floating_ips
            .values()
            .filter(|flip| {
                flip.current_target
                    .as_ref()
                    .and_then(|target| self.servers.get(target))
                    .is_some_and(|server| server.is_unhealthy())
            })
            .collect();
        unhealthy.sort_by(|a, b| a.name.cmp(&b.name));
        unhealthy
    }

    /// Floating IPs whose target is a server id unknown to this group.
    pub fn floating_ips_outside_group(&self) -> Vec<&FloatingIp> {
        let mut outside: Vec<_> = self
            .floating_ips
            .values()
            .filter(|flip| match &flip.current_target {
                Some(target) => !self.servers.contains_key(target),
                None => false,
            })
            .collect();
        outside.sort_by(|a, b| a.name.cmp(&b.name));
        outside
    }

    /// Server id to the floating IPs pointed at it, each list sorted by name.
    pub fn floating_ips_by_server(&self) -> HashMap<&str, Vec<&FloatingIp>> {
        let mut by_server: HashMap<&str, Vec<&FloatingIp>> = HashMap::new();
        for flip in self.floating_ips.values() {
            if let Some(target) = &flip.current_target {
                by_server.entry(target.as_str()).or_default().push(flip);
            }
        }
        for flips in by_server.values_mut() {
            flips.sort_by(|a, b| a.name.cmp(&b.name));
        }
        by_server
    }

    pub fn has_servers_with_unknown_status(&self) -> bool {
        self.servers
            .values()
            .any(|server| server.status() == Status::Unknown)
    }

    pub fn unhealthy_server_count(&self) -> usize {
        self.servers
            .values()
            .filter(|server| server.is_unhealthy())
            .count()
    }

    /// Sorted by name, for rendering.
    pub fn servers_sorted(&self) -> Vec<&Arc<WithStatus<Server>>> {
        let mut servers: Vec<_> = self.servers.values().collect();
        servers.sort_by(|a, b| a.resource.name.cmp(&b.resource.name));
        servers
    }
}

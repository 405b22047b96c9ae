//! The reassignment planner: a pure function from observed state to an
//! ordered list of floating-IP reassignments.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::warn;
use uuid::Uuid;

mod state;

pub use state::PlanState;

/// Point one floating IP at one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassignAction {
    pub floating_ip_id: String,
    pub server_id: String,
}

impl fmt::Display for ReassignAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.floating_ip_id, self.server_id)
    }
}

/// An immutable, ordered list of reassignments with a fresh identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub id: Uuid,
    pub actions: Vec<ReassignAction>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Ids of the floating IPs this plan will move.
    pub fn to_be_reassigned(&self) -> HashSet<&str> {
        self.actions
            .iter()
            .map(|action| action.floating_ip_id.as_str())
            .collect()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actions: Vec<String> = self.actions.iter().map(|a| a.to_string()).collect();
        write!(f, "Plan{{{}}}", actions.join(", "))
    }
}

/// Compute a plan for the given state.
///
/// Deterministic modulo the plan id: identical inputs produce identical
/// actions in identical order. A state at fixpoint yields an empty plan.
pub fn plan(state: &PlanState) -> Plan {
    let candidates = state.candidate_servers();
    let todo = state.candidate_floating_ips();

    // Floating IP id -> proposed server id.
    let mut proposal: HashMap<&str, &str> = HashMap::new();
    // Server id -> number of IPs proposed onto it so far.
    let mut assign_count: HashMap<&str, usize> = HashMap::new();

    let mut candidates_per_location: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut zones_with_candidates: HashSet<&str> = HashSet::new();
    for server in &candidates {
        candidates_per_location
            .entry(server.resource.location.as_str())
            .or_default()
            .push(server.resource.id.as_str());
        zones_with_candidates.insert(server.resource.network_zone.as_str());
    }

    // Server id -> resource index, for the affinity pass.
    let index_of: HashMap<&str, i64> = candidates
        .iter()
        .map(|server| (server.resource.id.as_str(), server.resource.resource_index))
        .collect();

    let mut unassignable: HashSet<&str> = HashSet::new();

    // Pass 1: same location, matching resource index.
    for flip in &todo {
        if !zones_with_candidates.contains(flip.network_zone.as_str()) {
            unassignable.insert(flip.id.as_str());
            warn!(
                floating_ip_id = %flip.id,
                network_zone = %flip.network_zone,
                "no candidate servers in network zone for floating IP"
            );
            continue;
        }

        let Some(local) = candidates_per_location.get(flip.location.as_str()) else {
            continue;
        };
        for &server_id in local {
            if index_of[server_id] == flip.resource_index {
                proposal.insert(flip.id.as_str(), server_id);
                *assign_count.entry(server_id).or_default() += 1;
                break;
            }
        }
    }

    // Pass 2: least-loaded candidate, same location when possible.
    let all_candidate_ids: Vec<&str> = candidates
        .iter()
        .map(|server| server.resource.id.as_str())
        .collect();
    for flip in &todo {
        if proposal.contains_key(flip.id.as_str()) || unassignable.contains(flip.id.as_str()) {
            continue;
        }

        let pool = candidates_per_location
            .get(flip.location.as_str())
            .unwrap_or(&all_candidate_ids);

        let mut best: Option<(&str, usize)> = None;
        for &server_id in pool {
            let count = assign_count.get(server_id).copied().unwrap_or(0);
            match best {
                Some((_, best_count)) if count >= best_count => {}
                _ => best = Some((server_id, count)),
            }
        }
        if let Some((server_id, _)) = best {
            proposal.insert(flip.id.as_str(), server_id);
            *assign_count.entry(server_id).or_default() += 1;
        }
    }

    // Drop assignments that are already in place.
    for flip in state.floating_ips.values() {
        let Some(target) = &flip.current_target else {
            continue;
        };
        if proposal.get(flip.id.as_str()) == Some(&target.as_str()) {
            proposal.remove(flip.id.as_str());
        }
    }

    let mut floating_ip_ids: Vec<&str> = proposal.keys().copied().collect();
    floating_ip_ids.sort_unstable();

    Plan {
        id: Uuid::new_v4(),
        actions: floating_ip_ids
            .into_iter()
            .map(|floating_ip_id| ReassignAction {
                floating_ip_id: floating_ip_id.to_string(),
                server_id: proposal[floating_ip_id].to_string(),
            })
            .collect(),
    }
}

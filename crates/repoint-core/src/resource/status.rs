use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health status of a resource as derived from its checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Not enough observations yet to call it either way.
    Unknown,
    Healthy,
    Unhealthy,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Unknown => "unknown",
            Status::Healthy => "healthy",
            Status::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// A status paired with the time it was last derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthState {
    pub status: Status,
    pub last_updated: Option<DateTime<Utc>>,
}

impl HealthState {
    pub fn unknown() -> Self {
        Self {
            status: Status::Unknown,
            last_updated: None,
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::unknown()
    }
}

/// A resource paired with an atomically swappable [`HealthState`].
///
/// The state cell is read by the planner and written by the per-server check
/// pipeline, from different tasks; loads and swaps are lock-free.
#[derive(Debug)]
pub struct WithStatus<R> {
    pub resource: R,
    state: ArcSwap<HealthState>,
}

impl<R> WithStatus<R> {
    pub fn new(resource: R, state: HealthState) -> Arc<Self> {
        Arc::new(Self {
            resource,
            state: ArcSwap::from_pointee(state),
        })
    }

    /// Replace the state, returning the previous one.
    pub fn set_state(&self, state: HealthState) -> HealthState {
        *self.state.swap(Arc::new(state))
    }

    pub fn state(&self) -> HealthState {
        **self.state.load()
    }

    pub fn status(&self) -> Status {
        self.state().status
    }

    pub fn is_healthy(&self) -> bool {
        self.status() == Status::Healthy
    }

    pub fn is_unhealthy(&self) -> bool {
        self.status() == Status::Unhealthy
    }
}

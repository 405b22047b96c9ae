//! Controllers that run health checks and keep the state around them.
//!
//! Composable in layers: [`Periodic`] runs one check on a timer,
//! [`Stateful`] debounces a periodic check with rise/fall thresholds,
//! [`MultiCheck`] fans several stateful checks into one aggregate and
//! [`ServerChecker`] derives a server's health from a multi check.

use std::fmt;

mod multi;
mod periodic;
mod server;
mod stateful;

pub use multi::{MultiCheck, MultiUpdate};
pub use periodic::{Periodic, PeriodicUpdate};
pub use server::{ServerCheckUpdate, ServerChecker};
pub use stateful::{Stateful, StatefulUpdate};

/// Debounced state of a health check.
///
/// Variant order is meaningful: aggregation takes the maximum, so
/// `Unhealthy` dominates `Unknown` dominates `Healthy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckState {
    Healthy,
    Unknown,
    Unhealthy,
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckState::Healthy => "healthy",
            CheckState::Unknown => "unknown",
            CheckState::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

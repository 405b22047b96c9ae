//! Core control loop for repoint.
//!
//! A group of cloud resources (servers plus reassignable "floating" IPs) is
//! kept healthy by four cooperating pieces: the inventory watcher polls the
//! provider and diffs snapshots, the health keeper runs per-server check
//! pipelines over the inventory, the planner turns the observed state into a
//! deterministic list of reassignments, and the group controller applies
//! those plans back through the provider.
//!
//! The crate is transport-agnostic at the edges: cloud providers implement
//! [`provider::Provider`] and outbound notifications go through
//! [`notify::Notifier`]. Everything in between is owned here.

pub mod check;
pub mod checker;
pub mod config;
pub mod monitor;
pub mod notify;
pub mod plan;
pub mod provider;
pub mod resource;

#[cfg(test)]
pub(crate) mod test_support;

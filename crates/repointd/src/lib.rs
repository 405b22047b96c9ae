//! The repoint daemon: configuration, telemetry, provider adapters, the
//! webhook notifier and the heartbeat pinger around the core control loop
//! of the `repoint-core` crate.

pub mod config;
pub mod entry;
pub mod heartbeat;
pub mod notifier;
pub mod providers;
pub mod telemetry;
pub mod version;

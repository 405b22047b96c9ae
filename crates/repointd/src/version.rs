/// Crate version, surfaced in the CLI, startup log and notifications.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

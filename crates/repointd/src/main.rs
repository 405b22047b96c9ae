use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use repointd::{entry, version};

#[derive(Debug, Parser)]
#[command(
    name = "repointd",
    version = version::VERSION,
    about = "Watches cloud resources and re-points reassignable IPs to healthy servers"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start monitoring the configured groups.
    Monitor {
        /// Path to the configuration file.
        #[arg(long, short = 'c', default_value = "repointd.yaml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Monitor { config } => {
            let token = CancellationToken::new();
            {
                let token = token.clone();
                tokio::spawn(async move {
                    shutdown_signal().await;
                    info!("shutdown signal received, stopping");
                    token.cancel();
                });
            }
            entry::monitor(&config, token).await
        }
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => stream.recv().await,
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler");
                None
            }
        };
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_declaration_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn monitor_defaults_to_repointd_yaml() {
        let cli = Cli::parse_from(["repointd", "monitor"]);
        let Commands::Monitor { config } = cli.command;
        assert_eq!(config, PathBuf::from("repointd.yaml"));
    }

    #[test]
    fn monitor_accepts_short_config_flag() {
        let cli = Cli::parse_from(["repointd", "monitor", "-c", "/etc/repoint/groups.yaml"]);
        let Commands::Monitor { config } = cli.command;
        assert_eq!(config, PathBuf::from("/etc/repoint/groups.yaml"));
    }
}

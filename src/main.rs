//! # Device Bridge Entry Point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use device_bridge::{
    config::ConfigLoader,
    server::{build_orchestrator, run_server},
    telemetry::init_tracing,
};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API (default)
    Serve,
    /// Print the effective configuration with secrets redacted and exit
    CheckConfig,
    /// Run one vendor cluster discovery and print the topology
    Discover,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration from layered env files and variables
    let config = ConfigLoader::new()
        .load()
        .context("loading configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::CheckConfig => {
            println!(
                "{}",
                config
                    .redacted_json()
                    .context("serializing configuration")?
            );
        }
        Commands::Discover => {
            init_tracing(&config).context("initializing telemetry")?;
            let orchestrator =
                build_orchestrator(&config).context("building vendor client")?;
            let clusters = orchestrator
                .refresh_topology()
                .await
                .context("discovering vendor clusters")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&clusters).context("serializing topology")?
            );
        }
        Commands::Serve => {
            init_tracing(&config).context("initializing telemetry")?;
            info!(profile = %config.profile, "Loaded configuration");
            if let Ok(redacted) = config.redacted_json() {
                tracing::debug!(configuration = %redacted, "Effective configuration");
            }
            run_server(config).await.context("running server")?;
        }
    }

    Ok(())
}

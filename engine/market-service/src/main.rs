//! F1 Driver Market Service
//!
//! Entry point for the driver market. `serve` reads JSON-lines commands from
//! stdin and answers on stdout; `quote` prints the pricing and action of one
//! driver for one user and exits.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use driver_market::{DriverId, LeagueId, UserId};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use market_service::{
    graceful_shutdown, initialize_logging, load_configuration, setup_signal_handlers, ServiceState,
};

#[derive(Debug, Parser)]
#[command(name = "f1-market", version, about = "F1 fantasy driver market")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve JSON-lines commands on stdin/stdout (default)
    Serve,
    /// Print pricing and available action for a driver
    Quote {
        #[arg(long)]
        league: i64,
        #[arg(long)]
        driver: i32,
        #[arg(long)]
        user: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_configuration(cli.config.as_deref()).context("Failed to load configuration")?;
    initialize_logging(&config.logging)?;

    info!("Starting F1 Driver Market Service v{}", env!("CARGO_PKG_VERSION"));

    let service_state = Arc::new(ServiceState::new(config).await?);
    info!("Service state initialized");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(service_state).await,
        Command::Quote { league, driver, user } => {
            quote(&service_state, LeagueId(league), DriverId(driver), UserId(user)).await
        }
    }
}

async fn serve(service_state: Arc<ServiceState>) -> Result<()> {
    let shutdown_signal = setup_signal_handlers()?;
    info!("Signal handlers configured");

    info!("Starting RosterManager...");
    let roster_handle = service_state.start_roster_manager();

    info!("Starting command loop...");
    let mut command_handle = {
        let state = service_state.clone();
        tokio::spawn(async move {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            if let Err(e) = state.run_command_loop(stdin, tokio::io::stdout()).await {
                error!("Command loop failed: {}", e);
            }
        })
    };

    info!("F1 Driver Market Service is running. Press Ctrl+C to shutdown gracefully.");
    let command_handle = tokio::select! {
        _ = shutdown_signal => {
            info!("Shutdown signal received. Initiating graceful shutdown...");
            Some(command_handle)
        }
        _ = &mut command_handle => {
            info!("Command input finished. Shutting down...");
            None
        }
    };

    graceful_shutdown(service_state, command_handle, roster_handle).await?;

    info!("F1 Driver Market Service shutdown complete");
    Ok(())
}

async fn quote(
    service_state: &ServiceState,
    league_id: LeagueId,
    driver_id: DriverId,
    user_id: UserId,
) -> Result<()> {
    let executor = &service_state.executor;
    let quoted_at: chrono::DateTime<chrono::Utc> = executor.clock().now();
    let pricing = executor.driver_pricing(league_id, driver_id, user_id).await?;
    let action = match executor.driver_action(league_id, driver_id, user_id).await {
        Ok(action) => Some(action),
        Err(e) => {
            info!("No action available for user {}: {}", user_id, e);
            None
        }
    };

    let body = serde_json::json!({ "quoted_at": quoted_at, "pricing": pricing, "action": action });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

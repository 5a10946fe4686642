//! Service state management and component initialization

use anyhow::{Context, Result};
use driver_market::{
    DriverRegistry, InMemoryMarketStore, MarketStore, ReservePromotionPolicy, RosterManager,
    TransactionExecutor,
};
use market_persistence::PgMarketStore;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::commands::CommandHandler;
use crate::config::ServiceConfig;

/// Service state containing all initialized components
#[derive(Debug)]
pub struct ServiceState {
    /// Service configuration
    pub config: ServiceConfig,

    pub executor: Arc<TransactionExecutor>,

    pub roster: Arc<RosterManager>,

    pub handler: CommandHandler,

    shutdown: watch::Sender<bool>,
}

impl ServiceState {
    /// Create a new service state with all components initialized
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        info!("Initializing service components...");

        if config.metrics.enabled {
            install_metrics_exporter(&config)?;
        }

        let registry = match &config.seed.drivers_file {
            Some(path) => DriverRegistry::load_from_file(path)
                .await
                .context("Failed to load driver seed file")?,
            None => {
                warn!("No driver seed file configured, starting with an empty registry");
                DriverRegistry::new()
            }
        };

        let store = open_store(&config).await?;
        let executor =
            Arc::new(TransactionExecutor::new(store, Arc::new(registry), config.market.clone()));

        for league_id in &config.seed.leagues {
            let created = executor
                .seed_league(*league_id)
                .await
                .with_context(|| format!("Failed to seed league {league_id}"))?;
            info!("League {} seeded with {} new free agents", league_id, created);
        }

        let policy = ReservePromotionPolicy::new(config.market.emergency_price_ceiling);
        let roster = Arc::new(RosterManager::new(&executor, Arc::new(policy)));
        let handler = CommandHandler::new(executor.clone(), roster.clone());
        let (shutdown, _) = watch::channel(false);

        info!("Service components initialized");
        Ok(Self { config, executor, roster, handler, shutdown })
    }

    /// Spawn the task that applies replacement policies to roster vacancies
    pub fn start_roster_manager(&self) -> JoinHandle<()> {
        let receiver = self.executor.events().subscribe();
        tokio::spawn(self.roster.clone().run(receiver))
    }

    /// Serve JSON-lines commands until input closes or shutdown is requested
    pub async fn run_command_loop<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut shutdown = self.shutdown.subscribe();
        let mut served: u64 = 0;

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line.context("Failed to read command")?,
                _ = shutdown.wait_for(|stop| *stop) => {
                    info!("Command loop interrupted by shutdown");
                    break;
                }
            };
            let Some(line) = line else {
                info!("Command input closed");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            let response = self.handler.handle_line(&line).await;
            writer.write_all(response.to_line().as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            served += 1;
        }

        info!("Command loop stopped after {} commands", served);
        Ok(())
    }

    /// Ask running loops to stop
    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

async fn open_store(config: &ServiceConfig) -> Result<Arc<dyn MarketStore>> {
    match &config.database.url {
        Some(_) => {
            info!("Connecting to Postgres market store...");
            let store = PgMarketStore::connect(&config.database)
                .await
                .context("Failed to connect to Postgres market store")?;
            Ok(Arc::new(store))
        }
        None => {
            info!("Using in-memory market store");
            Ok(Arc::new(InMemoryMarketStore::new()))
        }
    }
}

fn install_metrics_exporter(config: &ServiceConfig) -> Result<()> {
    let addr = config.metrics.socket_addr()?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!("Prometheus exporter listening on {}", addr);
    Ok(())
}

//! Signal handling for graceful shutdown

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::service::ServiceState;

/// Time the command loop gets to drain before it is aborted
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Setup signal handlers for graceful shutdown
///
/// The returned receiver resolves on Ctrl+C or SIGTERM, whichever comes first.
pub fn setup_signal_handlers() -> Result<oneshot::Receiver<()>> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let sigterm = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    signal_hook::flag::register(signal_hook::consts::SIGTERM, sigterm.clone())?;

    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("Ctrl+C signal received"),
                Err(e) => {
                    error!("Failed to listen for Ctrl+C signal: {}", e);
                    return;
                }
            },
            _ = wait_for_flag(sigterm) => info!("SIGTERM signal received"),
        }
        let _ = shutdown_tx.send(());
    });

    Ok(shutdown_rx)
}

async fn wait_for_flag(flag: Arc<AtomicBool>) {
    while !flag.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Graceful shutdown handler
///
/// `command_handle` is `None` when the loop already finished on its own. The
/// command loop stops first so no new vacancies are produced.
pub async fn graceful_shutdown(
    state: Arc<ServiceState>,
    command_handle: Option<JoinHandle<()>>,
    roster_handle: JoinHandle<()>,
) -> Result<()> {
    info!("Starting graceful shutdown...");
    state.request_shutdown();

    if let Some(mut command_handle) = command_handle {
        match timeout(SHUTDOWN_TIMEOUT, &mut command_handle).await {
            Ok(Ok(())) => info!("Command loop stopped gracefully"),
            Ok(Err(e)) => error!("Command loop task failed: {}", e),
            Err(_) => {
                warn!("Command loop did not stop within timeout, forcing shutdown");
                command_handle.abort();
            }
        }
    }

    roster_handle.abort();
    match roster_handle.await {
        Err(e) if !e.is_cancelled() => error!("Roster manager task failed: {}", e),
        _ => info!("Roster manager stopped"),
    }

    info!("Graceful shutdown complete");
    Ok(())
}

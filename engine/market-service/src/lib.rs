//! F1 Driver Market Service Library
//!
//! Wires the driver market into a running process: layered configuration,
//! logging, store selection, the JSON-lines command loop and graceful shutdown.

use anyhow::{Context, Result};
use std::path::Path;

pub mod commands;
pub mod config;
pub mod logging;
pub mod service;
pub mod signals;

pub use commands::{CommandHandler, CommandResponse, MarketCommand};
pub use config::ServiceConfig;
pub use logging::initialize_logging;
pub use service::ServiceState;
pub use signals::{graceful_shutdown, setup_signal_handlers};

/// Load configuration from an optional file and environment variables
pub fn load_configuration(path: Option<&Path>) -> Result<ServiceConfig> {
    config::load_config(path).context("Failed to load service configuration")
}

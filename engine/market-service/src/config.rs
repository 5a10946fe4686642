//! Service configuration management

use anyhow::{Context, Result};
use driver_market::{LeagueId, MarketConfig};
use market_persistence::DatabaseConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `F1_MARKET__MARKET__LOCK_DAYS=3`
pub const ENV_PREFIX: &str = "F1_MARKET";

/// Main service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Pricing and roster rules
    pub market: MarketConfig,

    /// Postgres settings; without a URL the in-memory store is used
    pub database: DatabaseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,

    /// Reference data and leagues created at startup
    pub seed: SeedConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

/// Metrics configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the Prometheus exporter
    pub enabled: bool,

    /// Address the exporter's scrape endpoint listens on
    pub listen_addr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// JSON file with the driver reference data
    pub drivers_file: Option<PathBuf>,

    /// Leagues whose ownership rows are created on startup
    pub leagues: Vec<LeagueId>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: false, listen_addr: "127.0.0.1:9090".to_string() }
    }
}

impl MetricsConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .with_context(|| format!("Invalid metrics listen address: {}", self.listen_addr))
    }
}

/// Load configuration from defaults, an optional TOML file and the environment
///
/// A `.env` file in the working directory is read first so its values take
/// part in the environment layer. The flat `MARKET_*` variables are applied
/// last, on top of `F1_MARKET__MARKET__*`.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    dotenv::dotenv().ok();

    let mut builder = config::Config::builder();
    if let Some(path) = path {
        tracing::debug!("Loading configuration from file: {:?}", path);
        builder = builder.add_source(
            config::File::from(path).format(config::FileFormat::Toml).required(true),
        );
    }
    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let mut config: ServiceConfig = builder
        .build()
        .context("Failed to assemble configuration sources")?
        .try_deserialize()
        .context("Failed to deserialize service configuration")?;

    config.market.apply_env().context("Invalid MARKET_* override")?;

    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    config.market.validate().context("Invalid market configuration")?;
    config.database.validate().context("Invalid database configuration")?;

    match config.logging.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow::anyhow!("Invalid log level: {}", config.logging.level)),
    }

    match config.logging.format.as_str() {
        "json" | "pretty" | "compact" => {}
        _ => return Err(anyhow::anyhow!("Invalid log format: {}", config.logging.format)),
    }

    if config.metrics.enabled {
        config.metrics.socket_addr()?;
    }

    if let Some(file) = &config.seed.drivers_file {
        if !file.exists() {
            return Err(anyhow::anyhow!("Driver seed file not found: {:?}", file));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use driver_market::Money;
    use std::io::Write;
    use std::sync::Mutex;

    // Serializes tests that read or write process environment
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.market.lock_days, 7);
        assert!(config.database.url.is_none());
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_config(
            r#"
[market]
lock_days = 3
initial_budget = 50000000

[market.pricing]
buyout_multiplier = "1.5"

[logging]
format = "json"

[seed]
leagues = [1, 2]
"#,
        );

        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let config = load_config(Some(file.path())).expect("config loads");
        assert_eq!(config.market.lock_days, 3);
        assert_eq!(config.market.initial_budget, Money::new(50_000_000));
        assert_eq!(config.market.pricing.buyout_multiplier.to_string(), "1.5");
        assert_eq!(config.market.max_drivers_per_user, 4);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.seed.leagues, vec![LeagueId(1), LeagueId(2)]);
    }

    #[test]
    fn test_bundled_example_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/market.toml");
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let config = load_config(Some(&path)).expect("example config loads");
        let expected = MarketConfig {
            current_season: config.market.current_season,
            ..MarketConfig::default()
        };
        assert_eq!(config.market, expected);
        assert_eq!(config.logging.format, "compact");
        assert_eq!(config.seed.leagues, vec![LeagueId(1)]);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let file = write_config("[logging]\nformat = \"xml\"\n");
        assert!(load_config(Some(file.path())).is_err());

        let file = write_config("[market.pricing]\nrefund_ratio = \"1.2\"\n");
        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_market_env_overrides_file_values() {
        let file = write_config("[market]\nlock_days = 5\n");
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("MARKET_LOCK_DAYS_AFTER_PURCHASE", "3");
        std::env::set_var("MARKET_BUYOUT_MULTIPLIER", "1.5");

        let from_file = load_config(Some(file.path()));
        let without_file = load_config(None);

        std::env::remove_var("MARKET_LOCK_DAYS_AFTER_PURCHASE");
        std::env::remove_var("MARKET_BUYOUT_MULTIPLIER");

        let config = from_file.expect("config loads");
        assert_eq!(config.market.lock_days, 3);
        assert_eq!(config.market.pricing.buyout_multiplier.to_string(), "1.5");

        let config = without_file.expect("config loads");
        assert_eq!(config.market.lock_days, 3);
        assert_eq!(config.market.max_drivers_per_user, 4);
    }

    #[test]
    fn test_bad_market_env_value_fails_loading() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("MARKET_MAX_DRIVERS_PER_USER", "lots");
        let result = load_config(None);
        std::env::remove_var("MARKET_MAX_DRIVERS_PER_USER");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_seed_file_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = ServiceConfig::default();
        config.seed.drivers_file = Some(dir.path().join("drivers.json"));
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_metrics_address_is_checked_when_enabled() {
        let mut config = ServiceConfig::default();
        config.metrics.listen_addr = "not an address".to_string();
        assert!(validate_config(&config).is_ok());

        config.metrics.enabled = true;
        assert!(validate_config(&config).is_err());
    }
}

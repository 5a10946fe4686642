//! Connection settings for the Postgres market store

use crate::error::{PersistenceError, Result};
use serde::{Deserialize, Serialize};

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres URL; `None` selects the in-memory store
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Apply embedded migrations on connect
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 5,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    /// Create config from `DATABASE_URL`, keeping default pool sizes
    pub fn from_env() -> Self {
        Self { url: std::env::var("DATABASE_URL").ok(), ..Default::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(PersistenceError::config("max_connections must be positive"));
        }
        if self.min_connections > self.max_connections {
            return Err(PersistenceError::config(
                "min_connections cannot exceed max_connections",
            ));
        }
        if let Some(url) = &self.url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(PersistenceError::config("database url must be a postgres:// url"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid_and_memory_backed() {
        let config = DatabaseConfig::default();
        assert!(config.url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let config = DatabaseConfig { min_connections: 20, ..Default::default() };
        assert!(matches!(config.validate(), Err(PersistenceError::Config(_))));

        let config = DatabaseConfig { url: Some("mysql://db".into()), ..Default::default() };
        assert!(config.validate().is_err());
    }
}

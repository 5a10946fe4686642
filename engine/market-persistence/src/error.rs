//! Error types for the Postgres market store

use driver_market::{LeagueId, MarketError, UserId};
use thiserror::Error;

/// Result type alias for persistence operations
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Errors that can occur in the persistence layer
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Driver or connection errors from sqlx
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failures
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A versioned update matched no row
    #[error("Version conflict on {0}")]
    Conflict(String),

    #[error("Team of user {user_id} already exists in league {league_id}")]
    TeamAlreadyExists { user_id: UserId, league_id: LeagueId },

    /// Stored data that cannot be mapped back to the domain model
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PersistenceError {
    /// Create a new conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a new corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<PersistenceError> for MarketError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Conflict(resource) => MarketError::Conflict { resource },
            PersistenceError::TeamAlreadyExists { user_id, league_id } => {
                MarketError::TeamAlreadyExists { user_id, league_id }
            }
            PersistenceError::Config(message) => MarketError::InvalidConfig { message },
            other => MarketError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_maps_to_market_conflict() {
        let err: MarketError = PersistenceError::conflict("driver 44 in league 1").into();
        assert_eq!(err, MarketError::conflict("driver 44 in league 1"));
        assert!(err.is_user_facing());
    }

    #[test]
    fn test_corruption_maps_to_storage() {
        let err: MarketError = PersistenceError::corruption("negative version").into();
        assert!(matches!(err, MarketError::Storage(ref msg) if msg.contains("negative version")));
        assert!(!err.is_user_facing());
    }
}

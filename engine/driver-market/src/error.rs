//! Error types for the driver market

use crate::ids::{DriverId, LeagueId, UserId};
use crate::money::Money;
use thiserror::Error;

/// Result type for driver market operations
pub type Result<T> = std::result::Result<T, MarketError>;

/// Every way a market request can fail.
///
/// All variants are per-request failures: a rejected transaction leaves the
/// ledger and every budget exactly as they were.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Money, available: Money },

    #[error("Roster full: {count} of {max} driver slots in use")]
    RosterFull { count: usize, max: usize },

    #[error("Driver {driver_id} is not a free agent")]
    NotFreeAgent { driver_id: DriverId },

    #[error("Driver {driver_id} is not listed for sale")]
    NotForSale { driver_id: DriverId },

    #[error("User {user_id} does not own driver {driver_id}")]
    NotOwner { driver_id: DriverId, user_id: UserId },

    #[error("Driver {driver_id} is already listed for sale")]
    AlreadyListed { driver_id: DriverId },

    #[error("Driver {driver_id} is not listed")]
    NotListed { driver_id: DriverId },

    #[error("Driver {driver_id} is locked until {locked_until}")]
    IsLocked { driver_id: DriverId, locked_until: chrono::DateTime<chrono::Utc> },

    #[error("User {user_id} cannot trade with themselves")]
    SelfTrade { user_id: UserId },

    #[error("Concurrent update on {resource}, transaction lost the race")]
    Conflict { resource: String },

    #[error("Buyout limit of {limit} reached: user {buyer} on user {victim} in season {season}")]
    BuyoutLimitReached { buyer: UserId, victim: UserId, season: i32, limit: u32 },

    #[error("Driver {driver_id} not found in league {league_id}")]
    DriverNotFound { driver_id: DriverId, league_id: LeagueId },

    #[error("Team not found for user {user_id} in league {league_id}")]
    TeamNotFound { user_id: UserId, league_id: LeagueId },

    #[error("User {user_id} already has a team in league {league_id}")]
    TeamAlreadyExists { user_id: UserId, league_id: LeagueId },

    #[error("Not enough free agents in league {league_id}: need {needed}, found {available}")]
    NotEnoughFreeAgents { league_id: LeagueId, needed: usize, available: usize },

    #[error("Invalid price: {price}")]
    InvalidPrice { price: Money },

    #[error("Driver {driver_id} is not on the roster of user {user_id}")]
    DriverNotOnRoster { driver_id: DriverId, user_id: UserId },

    #[error("Driver {driver_id} is already the reserve driver")]
    AlreadyReserve { driver_id: DriverId },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl MarketError {
    /// Create a conflict error for a resource
    pub fn conflict(resource: impl Into<String>) -> Self {
        Self::Conflict { resource: resource.into() }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    /// Rule rejections a user can act on, as opposed to storage or config faults
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::InvalidConfig { .. })
    }

    /// Stable machine-readable code, used in service responses and metric labels
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::RosterFull { .. } => "roster_full",
            Self::NotFreeAgent { .. } => "not_free_agent",
            Self::NotForSale { .. } => "not_for_sale",
            Self::NotOwner { .. } => "not_owner",
            Self::AlreadyListed { .. } => "already_listed",
            Self::NotListed { .. } => "not_listed",
            Self::IsLocked { .. } => "is_locked",
            Self::SelfTrade { .. } => "self_trade",
            Self::Conflict { .. } => "conflict",
            Self::BuyoutLimitReached { .. } => "buyout_limit_reached",
            Self::DriverNotFound { .. } => "driver_not_found",
            Self::TeamNotFound { .. } => "team_not_found",
            Self::TeamAlreadyExists { .. } => "team_already_exists",
            Self::NotEnoughFreeAgents { .. } => "not_enough_free_agents",
            Self::InvalidPrice { .. } => "invalid_price",
            Self::DriverNotOnRoster { .. } => "driver_not_on_roster",
            Self::AlreadyReserve { .. } => "already_reserve",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(err: serde_json::Error) -> Self {
        MarketError::Storage(format!("serialization: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_split() {
        assert!(MarketError::SelfTrade { user_id: UserId(1) }.is_user_facing());
        assert!(MarketError::conflict("driver 1").is_user_facing());
        assert!(!MarketError::storage("connection reset").is_user_facing());
        assert!(!MarketError::invalid_config("lock_days").is_user_facing());
    }

    #[test]
    fn test_error_codes() {
        let err = MarketError::InsufficientFunds {
            required: Money::new(26_000_000),
            available: Money::new(25_999_999),
        };
        assert_eq!(err.code(), "insufficient_funds");
        assert_eq!(MarketError::NotListed { driver_id: DriverId(44) }.code(), "not_listed");
    }
}

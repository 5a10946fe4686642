//! Configuration for the driver market

use crate::error::{MarketError, Result};
use crate::money::Money;
use chrono::Datelike;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Multipliers used by the pricing calculator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingRules {
    /// Premium paid on a forced buyout (1.3 = 130% of acquisition price)
    pub buyout_multiplier: Decimal,

    /// Share of the acquisition price refunded on a quick-sell
    pub refund_ratio: Decimal,

    /// Default markup over acquisition price when listing without a price
    pub listing_markup: Decimal,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            buyout_multiplier: Decimal::new(13, 1),
            refund_ratio: Decimal::new(8, 1),
            listing_markup: Decimal::new(11, 1),
        }
    }
}

/// Market configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub pricing: PricingRules,

    /// Days a driver stays protected from buyouts after acquisition
    pub lock_days: u32,

    /// Roster cap (3 lineup + 1 reserve)
    pub max_drivers_per_user: usize,

    /// Buyouts one user may execute against the same victim per season
    pub max_buyouts_per_pair_per_season: u32,

    /// Budget a team starts with when joining a league
    pub initial_budget: Money,

    /// Highest market price an emergency replacement may have
    pub emergency_price_ceiling: Money,

    /// Free drivers handed out when a user joins a league
    pub starter_pack_size: usize,

    /// Season used for buyout limits
    pub current_season: i32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            pricing: PricingRules::default(),
            lock_days: 7,
            max_drivers_per_user: 4,
            max_buyouts_per_pair_per_season: 2,
            initial_budget: Money::new(100_000_000),
            emergency_price_ceiling: Money::new(10_000_000),
            starter_pack_size: 3,
            current_season: chrono::Utc::now().year(),
        }
    }
}

impl MarketConfig {
    /// Lock window applied on every acquisition
    pub fn lock_duration(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.lock_days))
    }

    /// Create config from `MARKET_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields with any `MARKET_*` environment variables that are set
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `MARKET_*` overrides from `lookup`, then validate the result
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_var::<Decimal>(&lookup, "MARKET_BUYOUT_MULTIPLIER")? {
            self.pricing.buyout_multiplier = value;
        }
        if let Some(value) = parse_var::<Decimal>(&lookup, "MARKET_SELL_TO_MARKET_REFUND")? {
            self.pricing.refund_ratio = value;
        }
        if let Some(value) = parse_var::<Decimal>(&lookup, "MARKET_LISTING_MARKUP")? {
            self.pricing.listing_markup = value;
        }
        if let Some(value) = parse_var::<u32>(&lookup, "MARKET_LOCK_DAYS_AFTER_PURCHASE")? {
            self.lock_days = value;
        }
        if let Some(value) = parse_var::<usize>(&lookup, "MARKET_MAX_DRIVERS_PER_USER")? {
            self.max_drivers_per_user = value;
        }
        if let Some(value) =
            parse_var::<u32>(&lookup, "MARKET_MAX_BUYOUTS_PER_USER_PAIR_PER_SEASON")?
        {
            self.max_buyouts_per_pair_per_season = value;
        }
        if let Some(value) = parse_var::<i64>(&lookup, "MARKET_INITIAL_BUDGET")? {
            self.initial_budget = Money::new(value);
        }
        if let Some(value) = parse_var::<i64>(&lookup, "MARKET_EMERGENCY_PRICE_CEILING")? {
            self.emergency_price_ceiling = Money::new(value);
        }
        if let Some(value) = parse_var::<i32>(&lookup, "MARKET_CURRENT_SEASON")? {
            self.current_season = value;
        }

        self.validate()
    }

    /// Reject settings that would break pricing or roster invariants
    pub fn validate(&self) -> Result<()> {
        let pricing = &self.pricing;
        if pricing.buyout_multiplier < Decimal::ONE {
            return Err(MarketError::invalid_config("buyout_multiplier must be >= 1"));
        }
        if pricing.refund_ratio < Decimal::ZERO || pricing.refund_ratio > Decimal::ONE {
            return Err(MarketError::invalid_config("refund_ratio must be within [0, 1]"));
        }
        if pricing.listing_markup < Decimal::ONE {
            return Err(MarketError::invalid_config("listing_markup must be >= 1"));
        }
        if self.max_drivers_per_user == 0 {
            return Err(MarketError::invalid_config("max_drivers_per_user must be positive"));
        }
        if self.starter_pack_size > self.max_drivers_per_user {
            return Err(MarketError::invalid_config(
                "starter_pack_size cannot exceed max_drivers_per_user",
            ));
        }
        if self.initial_budget.is_negative() || self.emergency_price_ceiling.is_negative() {
            return Err(MarketError::invalid_config("money settings must be non-negative"));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| MarketError::invalid_config(format!("Invalid {key}: {raw}"))),
        None => Ok(None),
    }
}

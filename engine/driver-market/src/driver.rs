//! Driver reference data and the registry that serves it

use crate::error::{MarketError, Result};
use crate::ids::{ConstructorId, DriverId};
use crate::money::Money;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Season results used for tiering and display
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonStats {
    pub points: u32,
    pub podiums: u32,
    pub victories: u32,
    pub poles: u32,
    pub fastest_laps: u32,
}

/// An F1 driver as a tradeable asset
///
/// Everything except `market_price` is immutable reference data. The market
/// price is computed from performance by an upstream collaborator and fed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub number: u32,
    pub name: String,
    pub acronym: String,
    pub color: Option<String>,
    pub country: Option<String>,
    pub headshot_url: Option<String>,
    pub constructor_id: Option<ConstructorId>,
    #[serde(default)]
    pub season: SeasonStats,
    pub market_price: Money,
}

/// Relative strength of a driver against the points leader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverTier {
    /// At least 70% of the leader's points
    A,
    /// 40-69% of the leader's points
    B,
    /// Below 40% of the leader's points
    C,
}

impl DriverTier {
    /// Classify `points` against the leader's points
    pub fn classify(points: u32, leader_points: u32) -> Self {
        // A zero-point leader counts as one point.
        let leader = u64::from(leader_points.max(1));
        let percentage = u64::from(points) * 100 / leader;
        if percentage >= 70 {
            DriverTier::A
        } else if percentage >= 40 {
            DriverTier::B
        } else {
            DriverTier::C
        }
    }
}

/// Seed file layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSeed {
    pub drivers: Vec<Driver>,
}

/// Driver Registry - serves driver reference data and current market prices
#[derive(Debug, Default)]
pub struct DriverRegistry {
    drivers: DashMap<DriverId, Driver>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self { drivers: DashMap::new() }
    }

    /// Build a registry from an in-memory list
    pub fn from_drivers(drivers: impl IntoIterator<Item = Driver>) -> Self {
        let registry = Self::new();
        for driver in drivers {
            registry.insert(driver);
        }
        registry
    }

    /// Load drivers from a JSON seed file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Loading driver data from: {:?}", path.as_ref());

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            MarketError::storage(format!("cannot read {:?}: {e}", path.as_ref()))
        })?;
        let seed: DriverSeed = serde_json::from_str(&content)?;

        info!("Loaded {} drivers from file", seed.drivers.len());
        Ok(Self::from_drivers(seed.drivers))
    }

    pub fn insert(&self, driver: Driver) {
        self.drivers.insert(driver.id, driver);
    }

    pub fn get(&self, driver_id: DriverId) -> Option<Driver> {
        self.drivers.get(&driver_id).map(|entry| entry.value().clone())
    }

    /// Current market price of a driver
    pub fn market_price(&self, driver_id: DriverId) -> Option<Money> {
        self.drivers.get(&driver_id).map(|entry| entry.market_price)
    }

    /// Feed a freshly computed market price
    pub fn set_market_price(&self, driver_id: DriverId, price: Money) -> Result<()> {
        if price.is_negative() {
            return Err(MarketError::InvalidPrice { price });
        }
        let mut entry = self.drivers.get_mut(&driver_id).ok_or_else(|| {
            MarketError::storage(format!("driver {driver_id} missing from registry"))
        })?;
        debug!("Driver {} market price {} -> {}", driver_id, entry.market_price, price);
        entry.market_price = price;
        Ok(())
    }

    /// All driver IDs, sorted
    pub fn ids(&self) -> Vec<DriverId> {
        let mut ids: Vec<DriverId> = self.drivers.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    /// Tier of a driver within the given candidate pool
    pub fn tier_within(&self, driver_id: DriverId, pool: &[DriverId]) -> Option<DriverTier> {
        let points = self.drivers.get(&driver_id)?.season.points;
        let leader = pool
            .iter()
            .filter_map(|id| self.drivers.get(id).map(|d| d.season.points))
            .max()
            .unwrap_or(points);
        Some(DriverTier::classify(points, leader))
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_driver(id: i32, price: i64, points: u32) -> Driver {
    Driver {
        id: DriverId(id),
        number: id as u32,
        name: format!("Driver {id}"),
        acronym: format!("D{id:02}"),
        color: None,
        country: None,
        headshot_url: None,
        constructor_id: None,
        season: SeasonStats { points, ..Default::default() },
        market_price: Money::new(price),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_classification() {
        assert_eq!(DriverTier::classify(100, 100), DriverTier::A);
        assert_eq!(DriverTier::classify(70, 100), DriverTier::A);
        assert_eq!(DriverTier::classify(69, 100), DriverTier::B);
        assert_eq!(DriverTier::classify(40, 100), DriverTier::B);
        assert_eq!(DriverTier::classify(39, 100), DriverTier::C);
        assert_eq!(DriverTier::classify(0, 0), DriverTier::C);
    }

    #[test]
    fn test_registry_market_price_updates() {
        let registry = DriverRegistry::from_drivers([test_driver(1, 10_000_000, 50)]);
        assert_eq!(registry.market_price(DriverId(1)), Some(Money::new(10_000_000)));

        registry.set_market_price(DriverId(1), Money::new(12_500_000)).expect("known driver");
        assert_eq!(registry.market_price(DriverId(1)), Some(Money::new(12_500_000)));

        assert!(registry.set_market_price(DriverId(1), Money::new(-1)).is_err());
        assert!(registry.set_market_price(DriverId(99), Money::new(1)).is_err());
    }

    #[test]
    fn test_tier_within_pool() {
        let registry = DriverRegistry::from_drivers([
            test_driver(1, 30_000_000, 300),
            test_driver(2, 20_000_000, 150),
            test_driver(3, 10_000_000, 20),
        ]);
        let pool = registry.ids();
        assert_eq!(registry.tier_within(DriverId(1), &pool), Some(DriverTier::A));
        assert_eq!(registry.tier_within(DriverId(2), &pool), Some(DriverTier::B));
        assert_eq!(registry.tier_within(DriverId(3), &pool), Some(DriverTier::C));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_storage_error() {
        let result = DriverRegistry::load_from_file("/nonexistent/drivers.json").await;
        assert!(matches!(result, Err(MarketError::Storage(_))));
    }
}

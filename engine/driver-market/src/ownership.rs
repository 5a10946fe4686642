//! Ownership ledger rows and their derived market state
//!
//! One `DriverOwnership` row exists per driver per league. It is created as a
//! free agent when the league is seeded and is never deleted: a sale back to
//! the market reverts it to `Ownership::FreeAgent`.
//!
//! Lock expiry is never stored as a state change. `locked_until` is compared
//! against the clock on every read, so two reads at different times may
//! report different states for the same row.

use crate::ids::{DriverId, LeagueId, UserId};
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An open sale listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Owner-set price; `None` falls back to the acquisition price
    pub asking_price: Option<Money>,
}

/// Ownership details of an owned driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedDriver {
    pub owner_id: UserId,
    pub acquisition_price: Money,
    pub locked_until: Option<DateTime<Utc>>,
    pub listing: Option<Listing>,
}

/// Free agent or owned, never both
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Ownership {
    FreeAgent,
    Owned(OwnedDriver),
}

/// State of a row as observed at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketState {
    FreeAgent,
    OwnedUnlisted,
    OwnedListed,
    OwnedLocked,
}

/// True while `now` has not passed `locked_until`
pub fn is_locked(locked_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(locked_until, Some(until) if now <= until)
}

/// The authoritative ownership record of a driver in a league
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverOwnership {
    pub driver_id: DriverId,
    pub league_id: LeagueId,
    pub ownership: Ownership,
    /// Optimistic concurrency token, bumped by the store on every write
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl DriverOwnership {
    /// Create a free-agent row
    pub fn free_agent(league_id: LeagueId, driver_id: DriverId, now: DateTime<Utc>) -> Self {
        Self { driver_id, league_id, ownership: Ownership::FreeAgent, version: 0, updated_at: now }
    }

    pub fn owned(&self) -> Option<&OwnedDriver> {
        match &self.ownership {
            Ownership::Owned(owned) => Some(owned),
            Ownership::FreeAgent => None,
        }
    }

    pub fn owner_id(&self) -> Option<UserId> {
        self.owned().map(|owned| owned.owner_id)
    }

    pub fn is_free_agent(&self) -> bool {
        matches!(self.ownership, Ownership::FreeAgent)
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id() == Some(user_id)
    }

    pub fn is_listed(&self) -> bool {
        self.owned().is_some_and(|owned| owned.listing.is_some())
    }

    pub fn locked_until(&self) -> Option<DateTime<Utc>> {
        self.owned().and_then(|owned| owned.locked_until)
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        is_locked(self.locked_until(), now)
    }

    /// Derive the current state; a listing is reported ahead of an active lock
    pub fn market_state(&self, now: DateTime<Utc>) -> MarketState {
        match &self.ownership {
            Ownership::FreeAgent => MarketState::FreeAgent,
            Ownership::Owned(owned) if owned.listing.is_some() => MarketState::OwnedListed,
            Ownership::Owned(owned) if is_locked(owned.locked_until, now) => {
                MarketState::OwnedLocked
            }
            Ownership::Owned(_) => MarketState::OwnedUnlisted,
        }
    }

    /// Hand the driver to a new owner with a fresh lock
    pub(crate) fn transfer(
        &mut self,
        new_owner: UserId,
        price: Money,
        locked_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        self.ownership = Ownership::Owned(OwnedDriver {
            owner_id: new_owner,
            acquisition_price: price,
            locked_until,
            listing: None,
        });
        self.updated_at = now;
    }

    /// Return the driver to the free-agent pool
    pub(crate) fn release(&mut self, now: DateTime<Utc>) {
        self.ownership = Ownership::FreeAgent;
        self.updated_at = now;
    }

    pub(crate) fn set_listing(&mut self, listing: Option<Listing>, now: DateTime<Utc>) {
        if let Ownership::Owned(owned) = &mut self.ownership {
            owned.listing = listing;
            self.updated_at = now;
        }
    }
}

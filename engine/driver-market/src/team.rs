//! User teams: roster slots and the league budget

use crate::error::{MarketError, Result};
use crate::ids::{ConstructorId, DriverId, LeagueId, UserId};
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of lineup (scoring) slots
pub const LINEUP_SLOTS: usize = 3;

/// A roster position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RosterSlot {
    /// Lineup slot, 0-based
    Lineup(usize),
    Reserve,
}

/// A user's team in one league
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTeam {
    pub user_id: UserId,
    pub league_id: LeagueId,
    pub team_name: String,
    pub lineup: [Option<DriverId>; LINEUP_SLOTS],
    pub reserve: Option<DriverId>,
    pub constructor_id: Option<ConstructorId>,
    pub budget_remaining: Money,
    /// Optimistic concurrency token, bumped by the store on every write
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl UserTeam {
    /// Create an empty team
    pub fn new(
        user_id: UserId,
        league_id: LeagueId,
        team_name: impl Into<String>,
        budget: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            league_id,
            team_name: team_name.into(),
            lineup: [None; LINEUP_SLOTS],
            reserve: None,
            constructor_id: None,
            budget_remaining: budget,
            version: 0,
            updated_at: now,
        }
    }

    /// Drivers currently on the roster, lineup first
    pub fn drivers(&self) -> Vec<DriverId> {
        self.lineup.iter().flatten().copied().chain(self.reserve).collect()
    }

    pub fn driver_count(&self) -> usize {
        self.lineup.iter().flatten().count() + usize::from(self.reserve.is_some())
    }

    pub fn slot_of(&self, driver_id: DriverId) -> Option<RosterSlot> {
        if let Some(index) = self.lineup.iter().position(|slot| *slot == Some(driver_id)) {
            return Some(RosterSlot::Lineup(index));
        }
        (self.reserve == Some(driver_id)).then_some(RosterSlot::Reserve)
    }

    pub fn driver_in(&self, slot: RosterSlot) -> Option<DriverId> {
        match slot {
            RosterSlot::Lineup(index) => self.lineup.get(index).copied().flatten(),
            RosterSlot::Reserve => self.reserve,
        }
    }

    /// Fail with `RosterFull` when no acquisition is possible
    pub fn ensure_space(&self, max_drivers: usize) -> Result<()> {
        let count = self.driver_count();
        let has_free_slot = self.lineup.iter().any(Option::is_none) || self.reserve.is_none();
        if count >= max_drivers || !has_free_slot {
            return Err(MarketError::RosterFull { count, max: max_drivers });
        }
        Ok(())
    }

    /// Put a driver in the first empty lineup slot, else the reserve slot
    pub(crate) fn place(&mut self, driver_id: DriverId, max_drivers: usize) -> Result<RosterSlot> {
        self.ensure_space(max_drivers)?;
        if let Some(index) = self.lineup.iter().position(Option::is_none) {
            self.lineup[index] = Some(driver_id);
            return Ok(RosterSlot::Lineup(index));
        }
        self.reserve = Some(driver_id);
        Ok(RosterSlot::Reserve)
    }

    /// Put a driver in a specific empty slot
    pub(crate) fn fill(&mut self, slot: RosterSlot, driver_id: DriverId) {
        match slot {
            RosterSlot::Lineup(index) => {
                if let Some(entry) = self.lineup.get_mut(index) {
                    *entry = Some(driver_id);
                }
            }
            RosterSlot::Reserve => self.reserve = Some(driver_id),
        }
    }

    /// Remove a driver, returning the slot it occupied
    pub(crate) fn vacate(&mut self, driver_id: DriverId) -> Option<RosterSlot> {
        let slot = self.slot_of(driver_id)?;
        match slot {
            RosterSlot::Lineup(index) => self.lineup[index] = None,
            RosterSlot::Reserve => self.reserve = None,
        }
        Some(slot)
    }

    /// Debit the budget, refusing to go below zero
    pub(crate) fn debit(&mut self, amount: Money) -> Result<Money> {
        let remaining = self.budget_remaining.checked_debit(amount).ok_or(
            MarketError::InsufficientFunds { required: amount, available: self.budget_remaining },
        )?;
        self.budget_remaining = remaining;
        Ok(remaining)
    }

    pub(crate) fn credit(&mut self, amount: Money) -> Money {
        self.budget_remaining = self.budget_remaining.saturating_add(amount);
        self.budget_remaining
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team() -> UserTeam {
        UserTeam::new(UserId(1), LeagueId(1), "Scuderia Test", Money::new(100), Utc::now())
    }

    #[test]
    fn test_place_fills_lineup_then_reserve() {
        let mut team = team();
        assert_eq!(team.place(DriverId(1), 4), Ok(RosterSlot::Lineup(0)));
        assert_eq!(team.place(DriverId(2), 4), Ok(RosterSlot::Lineup(1)));
        assert_eq!(team.place(DriverId(3), 4), Ok(RosterSlot::Lineup(2)));
        assert_eq!(team.place(DriverId(4), 4), Ok(RosterSlot::Reserve));
        assert_eq!(team.driver_count(), 4);
        assert!(matches!(
            team.place(DriverId(5), 4),
            Err(MarketError::RosterFull { count: 4, max: 4 })
        ));
    }

    #[test]
    fn test_vacate_then_place_reuses_slot() {
        let mut team = team();
        for id in 1..=4 {
            team.place(DriverId(id), 4).expect("space");
        }
        assert_eq!(team.vacate(DriverId(2)), Some(RosterSlot::Lineup(1)));
        assert_eq!(team.vacate(DriverId(2)), None);
        assert_eq!(team.place(DriverId(9), 4), Ok(RosterSlot::Lineup(1)));
        assert_eq!(team.drivers(), vec![DriverId(1), DriverId(9), DriverId(3), DriverId(4)]);
    }

    #[test]
    fn test_debit_never_goes_negative() {
        let mut team = team();
        assert_eq!(team.debit(Money::new(40)), Ok(Money::new(60)));
        assert_eq!(
            team.debit(Money::new(61)),
            Err(MarketError::InsufficientFunds {
                required: Money::new(61),
                available: Money::new(60)
            })
        );
        assert_eq!(team.budget_remaining, Money::new(60));
        assert_eq!(team.credit(Money::new(5)), Money::new(65));
    }
}

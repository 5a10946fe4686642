//! In-memory market store for tests and single-process deployments

use crate::error::{MarketError, Result};
use crate::ids::{DriverId, LeagueId, UserId};
use crate::ownership::DriverOwnership;
use crate::store::{ChangeSet, MarketStore};
use crate::team::UserTeam;
use crate::transaction::{BuyoutRecord, MarketTransaction, TransactionQuery};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

#[derive(Debug, Default)]
struct State {
    ownerships: BTreeMap<(LeagueId, DriverId), DriverOwnership>,
    teams: BTreeMap<(LeagueId, UserId), UserTeam>,
    transactions: Vec<MarketTransaction>,
    buyouts: Vec<BuyoutRecord>,
}

impl State {
    /// Check every version in the change set without writing anything
    fn validate(&self, changes: &ChangeSet) -> Result<()> {
        let mut seen_drivers = HashSet::new();
        for row in &changes.ownerships {
            let key = (row.league_id, row.driver_id);
            if !seen_drivers.insert(key) {
                return Err(MarketError::storage(format!(
                    "driver {} written twice in one change set",
                    row.driver_id
                )));
            }
            match self.ownerships.get(&key) {
                Some(stored) if stored.version == row.version => {}
                Some(_) => {
                    return Err(MarketError::conflict(format!(
                        "driver {} in league {}",
                        row.driver_id, row.league_id
                    )))
                }
                None => {
                    return Err(MarketError::DriverNotFound {
                        driver_id: row.driver_id,
                        league_id: row.league_id,
                    })
                }
            }
        }

        let mut seen_teams = HashSet::new();
        for team in &changes.teams {
            let key = (team.league_id, team.user_id);
            if !seen_teams.insert(key) {
                return Err(MarketError::storage(format!(
                    "team of user {} written twice in one change set",
                    team.user_id
                )));
            }
            match self.teams.get(&key) {
                Some(stored) if stored.version == team.version => {}
                Some(_) => {
                    return Err(MarketError::conflict(format!(
                        "team of user {} in league {}",
                        team.user_id, team.league_id
                    )))
                }
                None => {
                    return Err(MarketError::TeamNotFound {
                        user_id: team.user_id,
                        league_id: team.league_id,
                    })
                }
            }
        }

        for team in &changes.new_teams {
            let key = (team.league_id, team.user_id);
            if self.teams.contains_key(&key) || !seen_teams.insert(key) {
                return Err(MarketError::TeamAlreadyExists {
                    user_id: team.user_id,
                    league_id: team.league_id,
                });
            }
        }

        Ok(())
    }

    fn apply(&mut self, changes: ChangeSet) {
        for mut row in changes.ownerships {
            row.version += 1;
            self.ownerships.insert((row.league_id, row.driver_id), row);
        }
        for mut team in changes.teams {
            team.version += 1;
            self.teams.insert((team.league_id, team.user_id), team);
        }
        for mut team in changes.new_teams {
            team.version = 1;
            self.teams.insert((team.league_id, team.user_id), team);
        }
        self.transactions.extend(changes.transactions);
        self.buyouts.extend(changes.buyouts);
    }
}

/// Market store held entirely in process memory
#[derive(Debug, Default)]
pub struct InMemoryMarketStore {
    state: RwLock<State>,
}

impl InMemoryMarketStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transaction log entries
    pub fn transaction_count(&self) -> usize {
        self.state.read().transactions.len()
    }

    /// Full buyout history, oldest first
    pub fn buyouts(&self) -> Vec<BuyoutRecord> {
        self.state.read().buyouts.clone()
    }
}

#[async_trait::async_trait]
impl MarketStore for InMemoryMarketStore {
    async fn seed_league(
        &self,
        league_id: LeagueId,
        drivers: &[DriverId],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut state = self.state.write();
        let mut created = 0;
        for &driver_id in drivers {
            state.ownerships.entry((league_id, driver_id)).or_insert_with(|| {
                created += 1;
                let mut row = DriverOwnership::free_agent(league_id, driver_id, now);
                row.version = 1;
                row
            });
        }
        debug!("Seeded {} free agents in league {}", created, league_id);
        Ok(created)
    }

    async fn ownership(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
    ) -> Result<Option<DriverOwnership>> {
        Ok(self.state.read().ownerships.get(&(league_id, driver_id)).cloned())
    }

    async fn ownerships(&self, league_id: LeagueId) -> Result<Vec<DriverOwnership>> {
        let state = self.state.read();
        Ok(state
            .ownerships
            .range((league_id, DriverId(i32::MIN))..=(league_id, DriverId(i32::MAX)))
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn team(&self, league_id: LeagueId, user_id: UserId) -> Result<Option<UserTeam>> {
        Ok(self.state.read().teams.get(&(league_id, user_id)).cloned())
    }

    async fn teams(&self, league_id: LeagueId) -> Result<Vec<UserTeam>> {
        let state = self.state.read();
        Ok(state
            .teams
            .range((league_id, UserId(i64::MIN))..=(league_id, UserId(i64::MAX)))
            .map(|(_, team)| team.clone())
            .collect())
    }

    async fn buyout_count(
        &self,
        league_id: LeagueId,
        buyer_id: UserId,
        victim_id: UserId,
        season: i32,
    ) -> Result<u32> {
        let state = self.state.read();
        let count = state
            .buyouts
            .iter()
            .filter(|record| {
                record.league_id == league_id
                    && record.buyer_id == buyer_id
                    && record.victim_id == victim_id
                    && record.season == season
            })
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<MarketTransaction>> {
        let state = self.state.read();
        let matching = state.transactions.iter().rev().filter(|entry| query.matches(entry));
        Ok(match query.limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        })
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut state = self.state.write();
        state.validate(&changes)?;
        state.apply(changes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;

    async fn seeded() -> InMemoryMarketStore {
        let store = InMemoryMarketStore::new();
        store
            .seed_league(LeagueId(1), &[DriverId(1), DriverId(44)], Utc::now())
            .await
            .expect("seed");
        store
    }

    #[test]
    fn test_seed_is_idempotent() {
        let store = tokio_test::block_on(seeded());
        let created = tokio_test::block_on(store.seed_league(
            LeagueId(1),
            &[DriverId(1), DriverId(44), DriverId(63)],
            Utc::now(),
        ))
        .expect("seed");
        assert_eq!(created, 1);
        assert_eq!(tokio_test::block_on(store.ownerships(LeagueId(1))).expect("read").len(), 3);
        assert!(tokio_test::block_on(store.ownerships(LeagueId(2))).expect("read").is_empty());
    }

    #[tokio::test]
    async fn test_stale_version_aborts_whole_change_set() {
        let store = seeded().await;
        let now = Utc::now();
        let team = UserTeam::new(UserId(7), LeagueId(1), "Team", Money::new(100), now);
        store.commit(ChangeSet::new().new_team(team)).await.expect("create team");

        let row = store.ownership(LeagueId(1), DriverId(1)).await.expect("read").expect("row");
        let mut first = row.clone();
        first.transfer(UserId(7), Money::new(10), None, now);
        store.commit(ChangeSet::new().ownership(first)).await.expect("first writer wins");

        // Same read version: must lose, and the team write must not land either
        let mut team = store.team(LeagueId(1), UserId(7)).await.expect("read").expect("team");
        team.budget_remaining = Money::ZERO;
        let mut second = row;
        second.transfer(UserId(8), Money::new(10), None, now);
        let result = store.commit(ChangeSet::new().ownership(second).team(team)).await;

        assert!(matches!(result, Err(MarketError::Conflict { .. })));
        let team = store.team(LeagueId(1), UserId(7)).await.expect("read").expect("team");
        assert_eq!(team.budget_remaining, Money::new(100));
        let row = store.ownership(LeagueId(1), DriverId(1)).await.expect("read").expect("row");
        assert_eq!(row.owner_id(), Some(UserId(7)));
        assert_eq!(row.version, 2);
    }

    #[tokio::test]
    async fn test_new_team_must_not_exist() {
        let store = seeded().await;
        let team = UserTeam::new(UserId(7), LeagueId(1), "Team", Money::new(100), Utc::now());
        store.commit(ChangeSet::new().new_team(team.clone())).await.expect("create");
        let again = store.commit(ChangeSet::new().new_team(team)).await;
        assert!(matches!(again, Err(MarketError::TeamAlreadyExists { .. })));
    }
}

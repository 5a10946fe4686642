//! Storage seam for the ownership ledger, teams and logs

use crate::error::Result;
use crate::ids::{DriverId, LeagueId, UserId};
use crate::ownership::DriverOwnership;
use crate::team::UserTeam;
use crate::transaction::{BuyoutRecord, MarketTransaction, TransactionQuery};
use chrono::{DateTime, Utc};

/// Everything one market operation writes, committed all-or-nothing.
///
/// Updated rows carry the `version` they were read at. The store rejects the
/// whole set with `MarketError::Conflict` if any stored version moved on, and
/// bumps the version of every row it writes.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub ownerships: Vec<DriverOwnership>,
    pub teams: Vec<UserTeam>,
    /// Teams that must not exist yet
    pub new_teams: Vec<UserTeam>,
    pub transactions: Vec<MarketTransaction>,
    pub buyouts: Vec<BuyoutRecord>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ownership(mut self, row: DriverOwnership) -> Self {
        self.ownerships.push(row);
        self
    }

    pub fn team(mut self, team: UserTeam) -> Self {
        self.teams.push(team);
        self
    }

    pub fn new_team(mut self, team: UserTeam) -> Self {
        self.new_teams.push(team);
        self
    }

    pub fn transaction(mut self, transaction: MarketTransaction) -> Self {
        self.transactions.push(transaction);
        self
    }

    pub fn buyout(mut self, record: BuyoutRecord) -> Self {
        self.buyouts.push(record);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ownerships.is_empty()
            && self.teams.is_empty()
            && self.new_teams.is_empty()
            && self.transactions.is_empty()
            && self.buyouts.is_empty()
    }
}

/// Abstract trait for market storage backends
#[async_trait::async_trait]
pub trait MarketStore: Send + Sync {
    /// Create a free-agent row for every driver not yet in the league.
    /// Returns the number of rows created.
    async fn seed_league(
        &self,
        league_id: LeagueId,
        drivers: &[DriverId],
        now: DateTime<Utc>,
    ) -> Result<usize>;

    /// Load one ownership row
    async fn ownership(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
    ) -> Result<Option<DriverOwnership>>;

    /// All ownership rows of a league, ordered by driver ID
    async fn ownerships(&self, league_id: LeagueId) -> Result<Vec<DriverOwnership>>;

    /// Load one team
    async fn team(&self, league_id: LeagueId, user_id: UserId) -> Result<Option<UserTeam>>;

    /// All teams of a league, ordered by user ID
    async fn teams(&self, league_id: LeagueId) -> Result<Vec<UserTeam>>;

    /// Buyouts `buyer_id` executed against `victim_id` in a league and season
    async fn buyout_count(
        &self,
        league_id: LeagueId,
        buyer_id: UserId,
        victim_id: UserId,
        season: i32,
    ) -> Result<u32>;

    /// Transaction log entries matching the query, newest first
    async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<MarketTransaction>>;

    /// Apply a change set atomically
    async fn commit(&self, changes: ChangeSet) -> Result<()>;
}

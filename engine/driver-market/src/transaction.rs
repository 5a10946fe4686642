//! Append-only market transaction log and buyout history

use crate::ids::{DriverId, LeagueId, UserId};
use crate::money::Money;
use crate::team::RosterSlot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of ownership change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    BuyFromMarket,
    BuyFromUser,
    SellToMarket,
    BuyoutClause,
    EmergencyAssignment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::BuyFromMarket => "buy_from_market",
            TransactionType::BuyFromUser => "buy_from_user",
            TransactionType::SellToMarket => "sell_to_market",
            TransactionType::BuyoutClause => "buyout_clause",
            TransactionType::EmergencyAssignment => "emergency_assignment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "buy_from_market" => Some(TransactionType::BuyFromMarket),
            "buy_from_user" => Some(TransactionType::BuyFromUser),
            "sell_to_market" => Some(TransactionType::SellToMarket),
            "buyout_clause" => Some(TransactionType::BuyoutClause),
            "emergency_assignment" => Some(TransactionType::EmergencyAssignment),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the transaction log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketTransaction {
    pub id: Uuid,
    pub driver_id: DriverId,
    pub league_id: LeagueId,
    /// `None` when the driver came from the market pool
    pub seller_id: Option<UserId>,
    pub buyer_id: UserId,
    pub price: Money,
    pub transaction_type: TransactionType,
    pub timestamp: DateTime<Utc>,
}

impl MarketTransaction {
    /// Create a new transaction entry
    pub fn new(
        league_id: LeagueId,
        driver_id: DriverId,
        seller_id: Option<UserId>,
        buyer_id: UserId,
        price: Money,
        transaction_type: TransactionType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            driver_id,
            league_id,
            seller_id,
            buyer_id,
            price,
            transaction_type,
            timestamp,
        }
    }

    /// Whether `user_id` took part on either side
    pub fn involves(&self, user_id: UserId) -> bool {
        self.buyer_id == user_id || self.seller_id == Some(user_id)
    }
}

/// A buyout counted against the per-season pair limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyoutRecord {
    pub league_id: LeagueId,
    pub buyer_id: UserId,
    pub victim_id: UserId,
    pub driver_id: DriverId,
    pub price: Money,
    pub season: i32,
    pub timestamp: DateTime<Utc>,
}

/// Filter for transaction history reads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionQuery {
    pub league_id: Option<LeagueId>,
    pub driver_id: Option<DriverId>,
    pub user_id: Option<UserId>,
    pub transaction_type: Option<TransactionType>,
    /// Most recent entries first, capped at this many
    pub limit: Option<usize>,
}

impl TransactionQuery {
    pub fn league(league_id: LeagueId) -> Self {
        Self { league_id: Some(league_id), ..Default::default() }
    }

    pub fn driver(mut self, driver_id: DriverId) -> Self {
        self.driver_id = Some(driver_id);
        self
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, transaction: &MarketTransaction) -> bool {
        self.league_id.map_or(true, |id| transaction.league_id == id)
            && self.driver_id.map_or(true, |id| transaction.driver_id == id)
            && self.user_id.map_or(true, |id| transaction.involves(id))
            && self.transaction_type.map_or(true, |kind| transaction.transaction_type == kind)
    }
}

/// Outcome of a committed market operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    /// Log entry, absent for listing changes
    pub transaction: Option<MarketTransaction>,
    /// Acting user's budget after the commit
    pub budget_remaining: Money,
    /// Counterparty's budget after the commit, when one was credited
    pub counterparty_budget: Option<Money>,
    /// Slot the driver landed in on the acting user's roster
    pub slot: Option<RosterSlot>,
    /// Asking price now in effect, for listings
    pub asking_price: Option<Money>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(seller: Option<i64>, buyer: i64, kind: TransactionType) -> MarketTransaction {
        MarketTransaction::new(
            LeagueId(1),
            DriverId(16),
            seller.map(UserId),
            UserId(buyer),
            Money::new(1),
            kind,
            Utc::now(),
        )
    }

    #[test]
    fn test_query_matches_either_side() {
        let query = TransactionQuery::league(LeagueId(1)).user(UserId(2));
        assert!(query.matches(&entry(Some(2), 3, TransactionType::BuyFromUser)));
        assert!(query.matches(&entry(None, 2, TransactionType::BuyFromMarket)));
        assert!(!query.matches(&entry(Some(4), 3, TransactionType::BuyFromUser)));
        let other_league = TransactionQuery::league(LeagueId(9));
        assert!(!other_league.matches(&entry(None, 2, TransactionType::BuyFromMarket)));
    }

    #[test]
    fn test_type_names_round_trip() {
        for kind in [
            TransactionType::BuyFromMarket,
            TransactionType::BuyFromUser,
            TransactionType::SellToMarket,
            TransactionType::BuyoutClause,
            TransactionType::EmergencyAssignment,
        ] {
            assert_eq!(TransactionType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(TransactionType::parse("trade"), None);
    }
}

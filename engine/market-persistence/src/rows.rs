//! Table rows and their mapping to the domain model

use crate::error::{PersistenceError, Result};
use chrono::{DateTime, Utc};
use driver_market::{
    BuyoutRecord, ConstructorId, DriverId, DriverOwnership, LeagueId, Listing, MarketTransaction,
    Money, OwnedDriver, Ownership, TransactionType, UserId, UserTeam,
};
use uuid::Uuid;

pub(crate) fn version_to_db(version: u64) -> Result<i64> {
    i64::try_from(version)
        .map_err(|_| PersistenceError::corruption(format!("version {version} overflows BIGINT")))
}

pub(crate) fn version_from_db(version: i64) -> Result<u64> {
    u64::try_from(version)
        .map_err(|_| PersistenceError::corruption(format!("negative version {version}")))
}

/// `driver_ownerships` row
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub(crate) struct OwnershipRow {
    pub league_id: i64,
    pub driver_id: i32,
    pub owner_id: Option<i64>,
    pub acquisition_price: Option<i64>,
    pub locked_until: Option<DateTime<Utc>>,
    pub is_listed_for_sale: bool,
    pub asking_price: Option<i64>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl OwnershipRow {
    pub fn from_domain(row: &DriverOwnership) -> Result<Self> {
        let mut db = Self {
            league_id: row.league_id.0,
            driver_id: row.driver_id.0,
            owner_id: None,
            acquisition_price: None,
            locked_until: None,
            is_listed_for_sale: false,
            asking_price: None,
            version: version_to_db(row.version)?,
            updated_at: row.updated_at,
        };
        if let Ownership::Owned(owned) = &row.ownership {
            db.owner_id = Some(owned.owner_id.0);
            db.acquisition_price = Some(owned.acquisition_price.units());
            db.locked_until = owned.locked_until;
            db.is_listed_for_sale = owned.listing.is_some();
            db.asking_price = owned.listing.and_then(|l| l.asking_price).map(Money::units);
        }
        Ok(db)
    }
}

impl TryFrom<OwnershipRow> for DriverOwnership {
    type Error = PersistenceError;

    fn try_from(row: OwnershipRow) -> Result<Self> {
        let ownership = match row.owner_id {
            None => Ownership::FreeAgent,
            Some(owner_id) => {
                let acquisition_price = row.acquisition_price.ok_or_else(|| {
                    PersistenceError::corruption(format!(
                        "driver {} in league {} owned without acquisition price",
                        row.driver_id, row.league_id
                    ))
                })?;
                Ownership::Owned(OwnedDriver {
                    owner_id: UserId(owner_id),
                    acquisition_price: Money::new(acquisition_price),
                    locked_until: row.locked_until,
                    listing: row
                        .is_listed_for_sale
                        .then(|| Listing { asking_price: row.asking_price.map(Money::new) }),
                })
            }
        };
        Ok(DriverOwnership {
            driver_id: DriverId(row.driver_id),
            league_id: LeagueId(row.league_id),
            ownership,
            version: version_from_db(row.version)?,
            updated_at: row.updated_at,
        })
    }
}

/// `user_teams` row
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub(crate) struct TeamRow {
    pub league_id: i64,
    pub user_id: i64,
    pub team_name: String,
    pub driver_1_id: Option<i32>,
    pub driver_2_id: Option<i32>,
    pub driver_3_id: Option<i32>,
    pub reserve_driver_id: Option<i32>,
    pub constructor_id: Option<i32>,
    pub budget_remaining: i64,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl TeamRow {
    pub fn from_domain(team: &UserTeam) -> Result<Self> {
        let [first, second, third] = team.lineup;
        Ok(Self {
            league_id: team.league_id.0,
            user_id: team.user_id.0,
            team_name: team.team_name.clone(),
            driver_1_id: first.map(|d| d.0),
            driver_2_id: second.map(|d| d.0),
            driver_3_id: third.map(|d| d.0),
            reserve_driver_id: team.reserve.map(|d| d.0),
            constructor_id: team.constructor_id.map(|c| c.0),
            budget_remaining: team.budget_remaining.units(),
            version: version_to_db(team.version)?,
            updated_at: team.updated_at,
        })
    }
}

impl TryFrom<TeamRow> for UserTeam {
    type Error = PersistenceError;

    fn try_from(row: TeamRow) -> Result<Self> {
        Ok(UserTeam {
            user_id: UserId(row.user_id),
            league_id: LeagueId(row.league_id),
            team_name: row.team_name,
            lineup: [
                row.driver_1_id.map(DriverId),
                row.driver_2_id.map(DriverId),
                row.driver_3_id.map(DriverId),
            ],
            reserve: row.reserve_driver_id.map(DriverId),
            constructor_id: row.constructor_id.map(ConstructorId),
            budget_remaining: Money::new(row.budget_remaining),
            version: version_from_db(row.version)?,
            updated_at: row.updated_at,
        })
    }
}

/// `market_transactions` row
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub(crate) struct TransactionRow {
    pub id: Uuid,
    pub league_id: i64,
    pub driver_id: i32,
    pub seller_id: Option<i64>,
    pub buyer_id: i64,
    pub price: i64,
    pub transaction_type: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for MarketTransaction {
    type Error = PersistenceError;

    fn try_from(row: TransactionRow) -> Result<Self> {
        let transaction_type = TransactionType::parse(&row.transaction_type).ok_or_else(|| {
            PersistenceError::corruption(format!(
                "unknown transaction type {}",
                row.transaction_type
            ))
        })?;
        Ok(MarketTransaction {
            id: row.id,
            driver_id: DriverId(row.driver_id),
            league_id: LeagueId(row.league_id),
            seller_id: row.seller_id.map(UserId),
            buyer_id: UserId(row.buyer_id),
            price: Money::new(row.price),
            transaction_type,
            timestamp: row.created_at,
        })
    }
}

/// Flattened `buyout_history` insert
pub(crate) struct BuyoutRow {
    pub league_id: i64,
    pub buyer_id: i64,
    pub victim_id: i64,
    pub driver_id: i32,
    pub price: i64,
    pub season: i32,
    pub created_at: DateTime<Utc>,
}

impl From<&BuyoutRecord> for BuyoutRow {
    fn from(record: &BuyoutRecord) -> Self {
        Self {
            league_id: record.league_id.0,
            buyer_id: record.buyer_id.0,
            victim_id: record.victim_id.0,
            driver_id: record.driver_id.0,
            price: record.price.units(),
            season: record.season,
            created_at: record.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned_row() -> OwnershipRow {
        OwnershipRow {
            league_id: 1,
            driver_id: 44,
            owner_id: Some(7),
            acquisition_price: Some(10_000_000),
            locked_until: None,
            is_listed_for_sale: true,
            asking_price: None,
            version: 3,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_listing_without_price_survives_mapping() {
        let row = owned_row();
        let domain = DriverOwnership::try_from(row.clone()).expect("valid row");
        assert!(domain.is_listed());
        assert_eq!(domain.owned().and_then(|o| o.listing), Some(Listing { asking_price: None }));
        assert_eq!(OwnershipRow::from_domain(&domain).expect("map back"), row);
    }

    #[test]
    fn test_owned_without_price_is_corruption() {
        let row = OwnershipRow { acquisition_price: None, ..owned_row() };
        assert!(matches!(DriverOwnership::try_from(row), Err(PersistenceError::Corruption(_))));

        let row = OwnershipRow { version: -1, ..owned_row() };
        assert!(DriverOwnership::try_from(row).is_err());
    }

    #[test]
    fn test_free_agent_row_maps_to_free_agent() {
        let row = OwnershipRow {
            owner_id: None,
            acquisition_price: None,
            is_listed_for_sale: false,
            ..owned_row()
        };
        let domain = DriverOwnership::try_from(row).expect("valid row");
        assert!(domain.is_free_agent());
        assert_eq!(domain.version, 3);
    }

    #[test]
    fn test_unknown_transaction_type_is_corruption() {
        let row = TransactionRow {
            id: Uuid::new_v4(),
            league_id: 1,
            driver_id: 1,
            seller_id: None,
            buyer_id: 2,
            price: 0,
            transaction_type: "gift".into(),
            created_at: Utc::now(),
        };
        assert!(MarketTransaction::try_from(row).is_err());
    }
}

//! Postgres-backed `MarketStore`
//!
//! A change set is written inside one SQL transaction. Every update is
//! guarded by `WHERE version = $n`; an update that matches no row means
//! another writer got there first, and dropping the transaction rolls back
//! everything written before it.

use crate::config::DatabaseConfig;
use crate::error::{PersistenceError, Result};
use crate::rows::{BuyoutRow, OwnershipRow, TeamRow, TransactionRow};
use chrono::{DateTime, Utc};
use driver_market::{
    ChangeSet, DriverId, DriverOwnership, LeagueId, MarketStore, MarketTransaction,
    TransactionQuery, UserId, UserTeam,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use tracing::{debug, info, warn};

const OWNERSHIP_COLUMNS: &str = "league_id, driver_id, owner_id, acquisition_price, \
     locked_until, is_listed_for_sale, asking_price, version, updated_at";

const TEAM_COLUMNS: &str = "league_id, user_id, team_name, driver_1_id, driver_2_id, driver_3_id, \
     reserve_driver_id, constructor_id, budget_remaining, version, updated_at";

/// Market store on a Postgres connection pool
#[derive(Debug, Clone)]
pub struct PgMarketStore {
    pool: PgPool,
}

impl PgMarketStore {
    /// Connect and, if configured, run the embedded migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| PersistenceError::config("database url is not set"))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await?;
        info!("Connected to Postgres with up to {} connections", config.max_connections);

        let store = Self::from_pool(pool);
        if config.run_migrations {
            store.migrate().await?;
        }
        Ok(store)
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply embedded migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Market schema migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn seed(
        &self,
        league_id: LeagueId,
        drivers: &[DriverId],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let ids: Vec<i32> = drivers.iter().map(|d| d.0).collect();
        let result = sqlx::query(
            "INSERT INTO driver_ownerships (league_id, driver_id, version, updated_at)
             SELECT $1, driver_id, 1, $3 FROM UNNEST($2::INTEGER[]) AS seed(driver_id)
             ON CONFLICT (league_id, driver_id) DO NOTHING",
        )
        .bind(league_id.0)
        .bind(&ids)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }

    async fn load_ownership(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
    ) -> Result<Option<DriverOwnership>> {
        let sql = format!(
            "SELECT {OWNERSHIP_COLUMNS} FROM driver_ownerships \
             WHERE league_id = $1 AND driver_id = $2"
        );
        let row: Option<OwnershipRow> = sqlx::query_as(&sql)
            .bind(league_id.0)
            .bind(driver_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(DriverOwnership::try_from).transpose()
    }

    async fn load_ownerships(&self, league_id: LeagueId) -> Result<Vec<DriverOwnership>> {
        let sql = format!(
            "SELECT {OWNERSHIP_COLUMNS} FROM driver_ownerships \
             WHERE league_id = $1 ORDER BY driver_id"
        );
        let rows: Vec<OwnershipRow> =
            sqlx::query_as(&sql).bind(league_id.0).fetch_all(&self.pool).await?;
        rows.into_iter().map(DriverOwnership::try_from).collect()
    }

    async fn load_team(&self, league_id: LeagueId, user_id: UserId) -> Result<Option<UserTeam>> {
        let sql =
            format!("SELECT {TEAM_COLUMNS} FROM user_teams WHERE league_id = $1 AND user_id = $2");
        let row: Option<TeamRow> = sqlx::query_as(&sql)
            .bind(league_id.0)
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserTeam::try_from).transpose()
    }

    async fn load_teams(&self, league_id: LeagueId) -> Result<Vec<UserTeam>> {
        let sql =
            format!("SELECT {TEAM_COLUMNS} FROM user_teams WHERE league_id = $1 ORDER BY user_id");
        let rows: Vec<TeamRow> =
            sqlx::query_as(&sql).bind(league_id.0).fetch_all(&self.pool).await?;
        rows.into_iter().map(UserTeam::try_from).collect()
    }

    async fn count_buyouts(
        &self,
        league_id: LeagueId,
        buyer_id: UserId,
        victim_id: UserId,
        season: i32,
    ) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM buyout_history
             WHERE league_id = $1 AND buyer_id = $2 AND victim_id = $3 AND season = $4",
        )
        .bind(league_id.0)
        .bind(buyer_id.0)
        .bind(victim_id.0)
        .bind(season)
        .fetch_one(&self.pool)
        .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn load_transactions(&self, query: &TransactionQuery) -> Result<Vec<MarketTransaction>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, league_id, driver_id, seller_id, buyer_id, price, transaction_type, \
             created_at FROM market_transactions WHERE TRUE",
        );
        if let Some(league_id) = query.league_id {
            builder.push(" AND league_id = ").push_bind(league_id.0);
        }
        if let Some(driver_id) = query.driver_id {
            builder.push(" AND driver_id = ").push_bind(driver_id.0);
        }
        if let Some(user_id) = query.user_id {
            builder
                .push(" AND (buyer_id = ")
                .push_bind(user_id.0)
                .push(" OR seller_id = ")
                .push_bind(user_id.0)
                .push(")");
        }
        if let Some(kind) = query.transaction_type {
            builder.push(" AND transaction_type = ").push_bind(kind.as_str());
        }
        builder.push(" ORDER BY seq DESC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows: Vec<TransactionRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        debug!("Loaded {} transactions", rows.len());
        rows.into_iter().map(MarketTransaction::try_from).collect()
    }

    async fn apply(&self, changes: ChangeSet) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for row in &changes.ownerships {
            update_ownership(&mut tx, row).await?;
        }
        for team in &changes.teams {
            update_team(&mut tx, team).await?;
        }
        for team in &changes.new_teams {
            insert_team(&mut tx, team).await?;
        }
        for entry in &changes.transactions {
            sqlx::query(
                "INSERT INTO market_transactions (id, league_id, driver_id, seller_id,
                     buyer_id, price, transaction_type, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(entry.id)
            .bind(entry.league_id.0)
            .bind(entry.driver_id.0)
            .bind(entry.seller_id.map(|u| u.0))
            .bind(entry.buyer_id.0)
            .bind(entry.price.units())
            .bind(entry.transaction_type.as_str())
            .bind(entry.timestamp)
            .execute(&mut *tx)
            .await?;
        }
        for record in &changes.buyouts {
            let row = BuyoutRow::from(record);
            sqlx::query(
                "INSERT INTO buyout_history
                     (league_id, buyer_id, victim_id, driver_id, price, season, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(row.league_id)
            .bind(row.buyer_id)
            .bind(row.victim_id)
            .bind(row.driver_id)
            .bind(row.price)
            .bind(row.season)
            .bind(row.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn update_ownership(tx: &mut Transaction<'_, Postgres>, row: &DriverOwnership) -> Result<()> {
    let db = OwnershipRow::from_domain(row)?;
    let result = sqlx::query(
        "UPDATE driver_ownerships
         SET owner_id = $3, acquisition_price = $4, locked_until = $5,
             is_listed_for_sale = $6, asking_price = $7, updated_at = $8,
             version = version + 1
         WHERE league_id = $1 AND driver_id = $2 AND version = $9",
    )
    .bind(db.league_id)
    .bind(db.driver_id)
    .bind(db.owner_id)
    .bind(db.acquisition_price)
    .bind(db.locked_until)
    .bind(db.is_listed_for_sale)
    .bind(db.asking_price)
    .bind(db.updated_at)
    .bind(db.version)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        warn!("Stale write on driver {} in league {}", row.driver_id, row.league_id);
        return Err(PersistenceError::conflict(format!(
            "driver {} in league {}",
            row.driver_id, row.league_id
        )));
    }
    Ok(())
}

async fn update_team(tx: &mut Transaction<'_, Postgres>, team: &UserTeam) -> Result<()> {
    let db = TeamRow::from_domain(team)?;
    let result = sqlx::query(
        "UPDATE user_teams
         SET team_name = $3, driver_1_id = $4, driver_2_id = $5, driver_3_id = $6,
             reserve_driver_id = $7, constructor_id = $8, budget_remaining = $9,
             updated_at = $10, version = version + 1
         WHERE league_id = $1 AND user_id = $2 AND version = $11",
    )
    .bind(db.league_id)
    .bind(db.user_id)
    .bind(&db.team_name)
    .bind(db.driver_1_id)
    .bind(db.driver_2_id)
    .bind(db.driver_3_id)
    .bind(db.reserve_driver_id)
    .bind(db.constructor_id)
    .bind(db.budget_remaining)
    .bind(db.updated_at)
    .bind(db.version)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        warn!("Stale write on team of user {} in league {}", team.user_id, team.league_id);
        return Err(PersistenceError::conflict(format!(
            "team of user {} in league {}",
            team.user_id, team.league_id
        )));
    }
    Ok(())
}

async fn insert_team(tx: &mut Transaction<'_, Postgres>, team: &UserTeam) -> Result<()> {
    let db = TeamRow::from_domain(team)?;
    let result = sqlx::query(
        "INSERT INTO user_teams
             (league_id, user_id, team_name, driver_1_id, driver_2_id, driver_3_id,
              reserve_driver_id, constructor_id, budget_remaining, version, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         ON CONFLICT (league_id, user_id) DO NOTHING",
    )
    .bind(db.league_id)
    .bind(db.user_id)
    .bind(&db.team_name)
    .bind(db.driver_1_id)
    .bind(db.driver_2_id)
    .bind(db.driver_3_id)
    .bind(db.reserve_driver_id)
    .bind(db.constructor_id)
    .bind(db.budget_remaining)
    .bind(1_i64)
    .bind(db.updated_at)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(PersistenceError::TeamAlreadyExists {
            user_id: team.user_id,
            league_id: team.league_id,
        });
    }
    Ok(())
}

#[async_trait::async_trait]
impl MarketStore for PgMarketStore {
    async fn seed_league(
        &self,
        league_id: LeagueId,
        drivers: &[DriverId],
        now: DateTime<Utc>,
    ) -> driver_market::Result<usize> {
        Ok(self.seed(league_id, drivers, now).await?)
    }

    async fn ownership(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
    ) -> driver_market::Result<Option<DriverOwnership>> {
        Ok(self.load_ownership(league_id, driver_id).await?)
    }

    async fn ownerships(&self, league_id: LeagueId) -> driver_market::Result<Vec<DriverOwnership>> {
        Ok(self.load_ownerships(league_id).await?)
    }

    async fn team(
        &self,
        league_id: LeagueId,
        user_id: UserId,
    ) -> driver_market::Result<Option<UserTeam>> {
        Ok(self.load_team(league_id, user_id).await?)
    }

    async fn teams(&self, league_id: LeagueId) -> driver_market::Result<Vec<UserTeam>> {
        Ok(self.load_teams(league_id).await?)
    }

    async fn buyout_count(
        &self,
        league_id: LeagueId,
        buyer_id: UserId,
        victim_id: UserId,
        season: i32,
    ) -> driver_market::Result<u32> {
        Ok(self.count_buyouts(league_id, buyer_id, victim_id, season).await?)
    }

    async fn transactions(
        &self,
        query: &TransactionQuery,
    ) -> driver_market::Result<Vec<MarketTransaction>> {
        Ok(self.load_transactions(query).await?)
    }

    async fn commit(&self, changes: ChangeSet) -> driver_market::Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        Ok(self.apply(changes).await?)
    }
}

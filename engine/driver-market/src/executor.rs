//! Transaction executor
//!
//! Every market operation follows the same shape: read the ownership row and
//! the teams involved, check the rules against that snapshot, build a
//! `ChangeSet`, and hand it to the store in one atomic commit. The store's
//! version check turns a lost race into `MarketError::Conflict`, so nothing
//! is written unless the snapshot the rules were checked against still holds.

use crate::action::{determine_driver_action, DriverAction};
use crate::clock::{Clock, SystemClock};
use crate::config::MarketConfig;
use crate::driver::{Driver, DriverRegistry};
use crate::error::{MarketError, Result};
use crate::events::{MarketEvent, MarketEventBus, RosterVacancy};
use crate::ids::{DriverId, LeagueId, UserId};
use crate::money::Money;
use crate::ownership::{DriverOwnership, Listing, MarketState};
use crate::pricing::{
    buyout_price, refund_price, suggested_listing_price, DriverPricing, PricingCalculator,
};
use crate::store::{ChangeSet, MarketStore};
use crate::team::UserTeam;
use crate::transaction::{
    BuyoutRecord, MarketTransaction, TransactionQuery, TransactionResult, TransactionType,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A driver as the presentation layer shows it to one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverView {
    pub driver: Driver,
    pub state: MarketState,
    pub owner_id: Option<UserId>,
    pub pricing: DriverPricing,
    pub action: DriverAction,
}

/// Executes market operations against a `MarketStore`
pub struct TransactionExecutor {
    store: Arc<dyn MarketStore>,
    registry: Arc<DriverRegistry>,
    clock: Arc<dyn Clock>,
    events: Arc<MarketEventBus>,
    pricing: PricingCalculator,
    config: MarketConfig,
}

impl std::fmt::Debug for TransactionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionExecutor")
            .field("drivers", &self.registry.len())
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish()
    }
}

impl TransactionExecutor {
    /// Create a new TransactionExecutor on the system clock
    pub fn new(
        store: Arc<dyn MarketStore>,
        registry: Arc<DriverRegistry>,
        config: MarketConfig,
    ) -> Self {
        Self {
            store,
            registry,
            clock: Arc::new(SystemClock),
            events: Arc::new(MarketEventBus::new()),
            pricing: PricingCalculator::new(config.pricing.clone()),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: Arc<MarketEventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn store(&self) -> &Arc<dyn MarketStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn events(&self) -> &Arc<MarketEventBus> {
        &self.events
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Create free-agent rows for every registered driver in a league
    pub async fn seed_league(&self, league_id: LeagueId) -> Result<usize> {
        let created =
            self.store.seed_league(league_id, &self.registry.ids(), self.clock.now()).await?;
        info!("League {} seeded with {} new free agents", league_id, created);
        Ok(created)
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Buy a free agent at its current market price
    pub async fn buy_from_market(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
        buyer_id: UserId,
    ) -> Result<TransactionResult> {
        let result = self.try_buy_from_market(league_id, driver_id, buyer_id).await;
        self.record(TransactionType::BuyFromMarket.as_str(), driver_id, &result);
        result
    }

    async fn try_buy_from_market(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
        buyer_id: UserId,
    ) -> Result<TransactionResult> {
        let now = self.clock.now();
        let driver = self.driver(league_id, driver_id)?;
        let mut row = self.load_ownership(league_id, driver_id).await?;
        if !row.is_free_agent() {
            return Err(MarketError::NotFreeAgent { driver_id });
        }

        let mut buyer = self.load_team(league_id, buyer_id).await?;
        buyer.ensure_space(self.config.max_drivers_per_user)?;

        let price = driver.market_price;
        if price.is_negative() {
            return Err(MarketError::InvalidPrice { price });
        }
        let budget_remaining = buyer.debit(price)?;
        let slot = buyer.place(driver_id, self.config.max_drivers_per_user)?;
        buyer.touch(now);

        row.transfer(buyer_id, price, Some(now + self.config.lock_duration()), now);
        let transaction = MarketTransaction::new(
            league_id,
            driver_id,
            None,
            buyer_id,
            price,
            TransactionType::BuyFromMarket,
            now,
        );

        self.store
            .commit(
                ChangeSet::new().ownership(row).team(buyer).transaction(transaction.clone()),
            )
            .await?;

        info!(
            "User {} bought driver {} from the market in league {} for {}",
            buyer_id, driver_id, league_id, price
        );
        self.events.publish(MarketEvent::TransactionCommitted(transaction.clone()));

        Ok(TransactionResult {
            transaction: Some(transaction),
            budget_remaining,
            counterparty_budget: None,
            slot: Some(slot),
            asking_price: None,
        })
    }

    /// Buy a listed driver from its owner at the display price
    pub async fn buy_from_user(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
        buyer_id: UserId,
        seller_id: UserId,
    ) -> Result<TransactionResult> {
        let result = self.try_buy_from_user(league_id, driver_id, buyer_id, seller_id).await;
        self.record(TransactionType::BuyFromUser.as_str(), driver_id, &result);
        result
    }

    async fn try_buy_from_user(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
        buyer_id: UserId,
        seller_id: UserId,
    ) -> Result<TransactionResult> {
        if buyer_id == seller_id {
            return Err(MarketError::SelfTrade { user_id: buyer_id });
        }

        let now = self.clock.now();
        let mut row = self.load_ownership(league_id, driver_id).await?;
        let owned = row.owned().ok_or(MarketError::NotForSale { driver_id })?;
        let listing = owned.listing.ok_or(MarketError::NotForSale { driver_id })?;
        if owned.owner_id != seller_id {
            return Err(MarketError::NotOwner { driver_id, user_id: seller_id });
        }
        let price = listing.asking_price.unwrap_or(owned.acquisition_price);

        let mut buyer = self.load_team(league_id, buyer_id).await?;
        buyer.ensure_space(self.config.max_drivers_per_user)?;
        let budget_remaining = buyer.debit(price)?;
        let slot = buyer.place(driver_id, self.config.max_drivers_per_user)?;
        buyer.touch(now);

        let mut seller = self.load_team(league_id, seller_id).await?;
        seller.vacate(driver_id);
        let seller_budget = seller.credit(price);
        seller.touch(now);

        row.transfer(buyer_id, price, Some(now + self.config.lock_duration()), now);
        let transaction = MarketTransaction::new(
            league_id,
            driver_id,
            Some(seller_id),
            buyer_id,
            price,
            TransactionType::BuyFromUser,
            now,
        );

        self.store
            .commit(
                ChangeSet::new()
                    .ownership(row)
                    .team(buyer)
                    .team(seller)
                    .transaction(transaction.clone()),
            )
            .await?;

        info!(
            "User {} bought driver {} from user {} in league {} for {}",
            buyer_id, driver_id, seller_id, league_id, price
        );
        self.events.publish(MarketEvent::TransactionCommitted(transaction.clone()));

        Ok(TransactionResult {
            transaction: Some(transaction),
            budget_remaining,
            counterparty_budget: Some(seller_budget),
            slot: Some(slot),
            asking_price: None,
        })
    }

    /// Quick-sell a driver back to the market for the refund price
    pub async fn sell_to_market(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
        seller_id: UserId,
    ) -> Result<TransactionResult> {
        let result = self.try_sell_to_market(league_id, driver_id, seller_id).await;
        self.record(TransactionType::SellToMarket.as_str(), driver_id, &result);
        result
    }

    async fn try_sell_to_market(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
        seller_id: UserId,
    ) -> Result<TransactionResult> {
        let now = self.clock.now();
        let mut row = self.load_ownership(league_id, driver_id).await?;
        let owned = row
            .owned()
            .filter(|owned| owned.owner_id == seller_id)
            .ok_or(MarketError::NotOwner { driver_id, user_id: seller_id })?;
        let refund = refund_price(owned.acquisition_price, self.pricing.rules());

        let mut seller = self.load_team(league_id, seller_id).await?;
        seller.vacate(driver_id);
        let budget_remaining = seller.credit(refund);
        seller.touch(now);

        row.release(now);
        // Quick-sells are logged with the seller on both sides
        let transaction = MarketTransaction::new(
            league_id,
            driver_id,
            Some(seller_id),
            seller_id,
            refund,
            TransactionType::SellToMarket,
            now,
        );

        self.store
            .commit(
                ChangeSet::new().ownership(row).team(seller).transaction(transaction.clone()),
            )
            .await?;

        info!(
            "User {} sold driver {} to the market in league {} for {}",
            seller_id, driver_id, league_id, refund
        );
        self.events.publish(MarketEvent::TransactionCommitted(transaction.clone()));

        Ok(TransactionResult {
            transaction: Some(transaction),
            budget_remaining,
            counterparty_budget: None,
            slot: None,
            asking_price: None,
        })
    }

    /// List an owned driver for sale, defaulting the asking price to the markup
    pub async fn list_for_sale(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
        owner_id: UserId,
        asking_price: Option<Money>,
    ) -> Result<TransactionResult> {
        let result = self.try_list_for_sale(league_id, driver_id, owner_id, asking_price).await;
        self.record("list_for_sale", driver_id, &result);
        result
    }

    async fn try_list_for_sale(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
        owner_id: UserId,
        asking_price: Option<Money>,
    ) -> Result<TransactionResult> {
        let now = self.clock.now();
        let mut row = self.load_ownership(league_id, driver_id).await?;
        let owned = row
            .owned()
            .filter(|owned| owned.owner_id == owner_id)
            .ok_or(MarketError::NotOwner { driver_id, user_id: owner_id })?;
        if owned.listing.is_some() {
            return Err(MarketError::AlreadyListed { driver_id });
        }
        let price = match asking_price {
            Some(price) if price.is_negative() => return Err(MarketError::InvalidPrice { price }),
            Some(price) => price,
            None => suggested_listing_price(owned.acquisition_price, self.pricing.rules()),
        };

        let team = self.load_team(league_id, owner_id).await?;
        row.set_listing(Some(Listing { asking_price: Some(price) }), now);
        self.store.commit(ChangeSet::new().ownership(row)).await?;

        info!(
            "User {} listed driver {} in league {} for {}",
            owner_id, driver_id, league_id, price
        );
        self.events.publish(MarketEvent::Listed {
            league_id,
            driver_id,
            owner_id,
            asking_price: price,
        });

        Ok(TransactionResult {
            transaction: None,
            budget_remaining: team.budget_remaining,
            counterparty_budget: None,
            slot: team.slot_of(driver_id),
            asking_price: Some(price),
        })
    }

    /// Withdraw a sale listing
    pub async fn unlist(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
        owner_id: UserId,
    ) -> Result<TransactionResult> {
        let result = self.try_unlist(league_id, driver_id, owner_id).await;
        self.record("unlist", driver_id, &result);
        result
    }

    async fn try_unlist(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
        owner_id: UserId,
    ) -> Result<TransactionResult> {
        let now = self.clock.now();
        let mut row = self.load_ownership(league_id, driver_id).await?;
        let owned = row
            .owned()
            .filter(|owned| owned.owner_id == owner_id)
            .ok_or(MarketError::NotOwner { driver_id, user_id: owner_id })?;
        if owned.listing.is_none() {
            return Err(MarketError::NotListed { driver_id });
        }

        let team = self.load_team(league_id, owner_id).await?;
        row.set_listing(None, now);
        self.store.commit(ChangeSet::new().ownership(row)).await?;

        info!("User {} unlisted driver {} in league {}", owner_id, driver_id, league_id);
        self.events.publish(MarketEvent::Unlisted { league_id, driver_id, owner_id });

        Ok(TransactionResult {
            transaction: None,
            budget_remaining: team.budget_remaining,
            counterparty_budget: None,
            slot: team.slot_of(driver_id),
            asking_price: None,
        })
    }

    /// Force-buy an unlocked driver from its owner at the buyout price.
    ///
    /// The victim is credited the full buyout price and a `RosterVacancy`
    /// event is published for the slot the driver left.
    pub async fn buyout_clause(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
        buyer_id: UserId,
        victim_id: UserId,
    ) -> Result<TransactionResult> {
        let result = self.try_buyout_clause(league_id, driver_id, buyer_id, victim_id).await;
        self.record(TransactionType::BuyoutClause.as_str(), driver_id, &result);
        result
    }

    async fn try_buyout_clause(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
        buyer_id: UserId,
        victim_id: UserId,
    ) -> Result<TransactionResult> {
        if buyer_id == victim_id {
            return Err(MarketError::SelfTrade { user_id: buyer_id });
        }

        let now = self.clock.now();
        let mut row = self.load_ownership(league_id, driver_id).await?;
        let owned = row
            .owned()
            .filter(|owned| owned.owner_id == victim_id)
            .ok_or(MarketError::NotOwner { driver_id, user_id: victim_id })?;
        if let Some(locked_until) = owned.locked_until.filter(|_| row.is_locked(now)) {
            return Err(MarketError::IsLocked { driver_id, locked_until });
        }
        let price = buyout_price(owned.acquisition_price, self.pricing.rules());

        let season = self.config.current_season;
        let limit = self.config.max_buyouts_per_pair_per_season;
        let executed = self.store.buyout_count(league_id, buyer_id, victim_id, season).await?;
        if executed >= limit {
            return Err(MarketError::BuyoutLimitReached {
                buyer: buyer_id,
                victim: victim_id,
                season,
                limit,
            });
        }

        let mut buyer = self.load_team(league_id, buyer_id).await?;
        buyer.ensure_space(self.config.max_drivers_per_user)?;
        let budget_remaining = buyer.debit(price)?;
        let slot = buyer.place(driver_id, self.config.max_drivers_per_user)?;
        buyer.touch(now);

        let mut victim = self.load_team(league_id, victim_id).await?;
        let vacated = victim.vacate(driver_id);
        let victim_budget = victim.credit(price);
        victim.touch(now);

        row.transfer(buyer_id, price, Some(now + self.config.lock_duration()), now);
        let transaction = MarketTransaction::new(
            league_id,
            driver_id,
            Some(victim_id),
            buyer_id,
            price,
            TransactionType::BuyoutClause,
            now,
        );
        let record = BuyoutRecord {
            league_id,
            buyer_id,
            victim_id,
            driver_id,
            price,
            season,
            timestamp: now,
        };

        self.store
            .commit(
                ChangeSet::new()
                    .ownership(row)
                    .team(buyer)
                    .team(victim)
                    .transaction(transaction.clone())
                    .buyout(record),
            )
            .await?;

        info!(
            "User {} bought out driver {} from user {} in league {} for {}",
            buyer_id, driver_id, victim_id, league_id, price
        );
        self.events.publish(MarketEvent::TransactionCommitted(transaction.clone()));
        if let Some(slot) = vacated {
            self.events.publish(MarketEvent::RosterVacancy(RosterVacancy {
                league_id,
                user_id: victim_id,
                driver_id,
                slot,
                occurred_at: now,
            }));
        }

        Ok(TransactionResult {
            transaction: Some(transaction),
            budget_remaining,
            counterparty_budget: Some(victim_budget),
            slot: Some(slot),
            asking_price: None,
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Pricing of one driver as seen by `viewer`
    pub async fn driver_pricing(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
        viewer: UserId,
    ) -> Result<DriverPricing> {
        let driver = self.driver(league_id, driver_id)?;
        let row = self.load_ownership(league_id, driver_id).await?;
        Ok(self.pricing.price(&driver, &row, viewer, self.clock.now()))
    }

    /// Action available to `viewer` on one driver
    pub async fn driver_action(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
        viewer: UserId,
    ) -> Result<DriverAction> {
        let pricing = self.driver_pricing(league_id, driver_id, viewer).await?;
        let team = self.load_team(league_id, viewer).await?;
        Ok(determine_driver_action(
            &pricing,
            team.budget_remaining,
            team.driver_count(),
            self.config.max_drivers_per_user,
        ))
    }

    /// Every driver of a league priced and resolved for `viewer`
    pub async fn market_view(
        &self,
        league_id: LeagueId,
        viewer: UserId,
    ) -> Result<Vec<DriverView>> {
        let now = self.clock.now();
        let team = self.load_team(league_id, viewer).await?;
        let rows = self.store.ownerships(league_id).await?;
        debug!("Building market view of {} drivers for user {}", rows.len(), viewer);

        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(driver) = self.registry.get(row.driver_id) else {
                warn!("Driver {} in league {} missing from registry", row.driver_id, league_id);
                continue;
            };
            let pricing = self.pricing.price(&driver, &row, viewer, now);
            let action = determine_driver_action(
                &pricing,
                team.budget_remaining,
                team.driver_count(),
                self.config.max_drivers_per_user,
            );
            views.push(DriverView {
                state: row.market_state(now),
                owner_id: row.owner_id(),
                driver,
                pricing,
                action,
            });
        }
        Ok(views)
    }

    /// Free agents of a league, most expensive first
    pub async fn free_agents(&self, league_id: LeagueId) -> Result<Vec<Driver>> {
        let rows = self.store.ownerships(league_id).await?;
        let mut drivers: Vec<Driver> = rows
            .iter()
            .filter(|row| row.is_free_agent())
            .filter_map(|row| self.registry.get(row.driver_id))
            .collect();
        drivers.sort_by(|a, b| b.market_price.cmp(&a.market_price).then(a.id.cmp(&b.id)));
        Ok(drivers)
    }

    /// Open sale listings of a league
    pub async fn listings(&self, league_id: LeagueId) -> Result<Vec<DriverOwnership>> {
        let rows = self.store.ownerships(league_id).await?;
        Ok(rows.into_iter().filter(DriverOwnership::is_listed).collect())
    }

    /// Ownership rows held by one user
    pub async fn user_drivers(
        &self,
        league_id: LeagueId,
        user_id: UserId,
    ) -> Result<Vec<DriverOwnership>> {
        let rows = self.store.ownerships(league_id).await?;
        Ok(rows.into_iter().filter(|row| row.is_owned_by(user_id)).collect())
    }

    pub async fn team(&self, league_id: LeagueId, user_id: UserId) -> Result<UserTeam> {
        self.load_team(league_id, user_id).await
    }

    /// Transaction history, newest first
    pub async fn history(&self, query: &TransactionQuery) -> Result<Vec<MarketTransaction>> {
        self.store.transactions(query).await
    }

    /// Prices the driver changed hands at, oldest first; quick-sells are not
    /// acquisitions and are left out
    pub async fn acquisition_price_chain(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
    ) -> Result<Vec<Money>> {
        let query = TransactionQuery::league(league_id).driver(driver_id);
        let history = self.store.transactions(&query).await?;
        Ok(history
            .iter()
            .rev()
            .filter(|entry| entry.transaction_type != TransactionType::SellToMarket)
            .map(|entry| entry.price)
            .collect())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn driver(&self, league_id: LeagueId, driver_id: DriverId) -> Result<Driver> {
        self.registry.get(driver_id).ok_or(MarketError::DriverNotFound { driver_id, league_id })
    }

    async fn load_ownership(
        &self,
        league_id: LeagueId,
        driver_id: DriverId,
    ) -> Result<DriverOwnership> {
        self.store
            .ownership(league_id, driver_id)
            .await?
            .ok_or(MarketError::DriverNotFound { driver_id, league_id })
    }

    async fn load_team(&self, league_id: LeagueId, user_id: UserId) -> Result<UserTeam> {
        self.store
            .team(league_id, user_id)
            .await?
            .ok_or(MarketError::TeamNotFound { user_id, league_id })
    }

    fn record<T>(&self, operation: &'static str, driver_id: DriverId, result: &Result<T>) {
        match result {
            Ok(_) => {
                metrics::counter!(
                    "market_transactions_committed_total", 1,
                    "operation" => operation
                );
            }
            Err(MarketError::Conflict { resource }) => {
                warn!(
                    "{} on driver {} lost a concurrent update on {}",
                    operation, driver_id, resource
                );
                metrics::counter!(
                    "market_transactions_rejected_total", 1,
                    "operation" => operation, "reason" => "conflict"
                );
            }
            Err(err) => {
                warn!("{} on driver {} rejected: {}", operation, driver_id, err);
                metrics::counter!(
                    "market_transactions_rejected_total", 1,
                    "operation" => operation, "reason" => err.code()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::driver::test_driver;
    use crate::memory::InMemoryMarketStore;
    use chrono::{Duration, Utc};

    const LEAGUE: LeagueId = LeagueId(1);

    async fn executor() -> (TransactionExecutor, Arc<ManualClock>) {
        let registry = DriverRegistry::from_drivers([
            test_driver(1, 10_000_000, 300),
            test_driver(2, 20_000_000, 200),
            test_driver(3, 5_000_000, 100),
        ]);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let executor = TransactionExecutor::new(
            Arc::new(InMemoryMarketStore::new()),
            Arc::new(registry),
            MarketConfig::default(),
        )
        .with_clock(clock.clone());
        executor.seed_league(LEAGUE).await.expect("seed");
        for user in [1, 2] {
            let team =
                UserTeam::new(UserId(user), LEAGUE, "Team", Money::new(100_000_000), clock.now());
            executor.store().commit(ChangeSet::new().new_team(team)).await.expect("team");
        }
        (executor, clock)
    }

    #[tokio::test]
    async fn test_buy_from_market_debits_and_locks() {
        let (executor, clock) = executor().await;
        let result = executor.buy_from_market(LEAGUE, DriverId(2), UserId(1)).await.expect("buy");

        assert_eq!(result.budget_remaining, Money::new(80_000_000));
        let row = executor.load_ownership(LEAGUE, DriverId(2)).await.expect("row");
        assert_eq!(row.owner_id(), Some(UserId(1)));
        assert_eq!(row.locked_until(), Some(clock.now() + Duration::days(7)));
        assert_eq!(row.market_state(clock.now()), MarketState::OwnedLocked);

        let again = executor.buy_from_market(LEAGUE, DriverId(2), UserId(2)).await;
        assert_eq!(again.unwrap_err(), MarketError::NotFreeAgent { driver_id: DriverId(2) });
    }

    #[tokio::test]
    async fn test_buy_from_user_moves_money_both_ways() {
        let (executor, _clock) = executor().await;
        executor.buy_from_market(LEAGUE, DriverId(1), UserId(1)).await.expect("buy");
        executor.list_for_sale(LEAGUE, DriverId(1), UserId(1), None).await.expect("list");

        let result =
            executor.buy_from_user(LEAGUE, DriverId(1), UserId(2), UserId(1)).await.expect("buy");
        assert_eq!(result.budget_remaining, Money::new(89_000_000));
        assert_eq!(result.counterparty_budget, Some(Money::new(101_000_000)));

        let seller = executor.team(LEAGUE, UserId(1)).await.expect("team");
        assert_eq!(seller.driver_count(), 0);
        let row = executor.load_ownership(LEAGUE, DriverId(1)).await.expect("row");
        assert_eq!(row.owned().map(|o| o.acquisition_price), Some(Money::new(11_000_000)));
        assert!(!row.is_listed());
    }

    #[tokio::test]
    async fn test_buy_from_user_rejections() {
        let (executor, _clock) = executor().await;
        executor.buy_from_market(LEAGUE, DriverId(1), UserId(1)).await.expect("buy");

        let self_trade = executor.buy_from_user(LEAGUE, DriverId(1), UserId(1), UserId(1)).await;
        assert_eq!(self_trade.unwrap_err(), MarketError::SelfTrade { user_id: UserId(1) });

        let unlisted = executor.buy_from_user(LEAGUE, DriverId(1), UserId(2), UserId(1)).await;
        assert_eq!(unlisted.unwrap_err(), MarketError::NotForSale { driver_id: DriverId(1) });

        executor
            .list_for_sale(LEAGUE, DriverId(1), UserId(1), Some(Money::new(1)))
            .await
            .expect("list");
        let wrong_seller = executor.buy_from_user(LEAGUE, DriverId(1), UserId(1), UserId(2)).await;
        assert!(matches!(wrong_seller, Err(MarketError::NotOwner { .. })));
    }

    #[tokio::test]
    async fn test_buyout_respects_lock_and_pair_limit() {
        let (executor, clock) = executor().await;
        executor.buy_from_market(LEAGUE, DriverId(3), UserId(2)).await.expect("buy");

        let locked = executor.buyout_clause(LEAGUE, DriverId(3), UserId(1), UserId(2)).await;
        assert!(matches!(locked, Err(MarketError::IsLocked { .. })));

        clock.advance(Duration::days(8));
        executor.buyout_clause(LEAGUE, DriverId(3), UserId(1), UserId(2)).await.expect("first");
        clock.advance(Duration::days(8));
        // Buy back, then get bought out twice more
        executor.buyout_clause(LEAGUE, DriverId(3), UserId(2), UserId(1)).await.expect("back");
        clock.advance(Duration::days(8));
        executor.buyout_clause(LEAGUE, DriverId(3), UserId(1), UserId(2)).await.expect("second");
        clock.advance(Duration::days(8));
        executor.buyout_clause(LEAGUE, DriverId(3), UserId(2), UserId(1)).await.expect("back");
        clock.advance(Duration::days(8));

        let limited = executor.buyout_clause(LEAGUE, DriverId(3), UserId(1), UserId(2)).await;
        assert!(matches!(
            limited,
            Err(MarketError::BuyoutLimitReached { limit: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_buyout_publishes_vacancy() {
        let (executor, clock) = executor().await;
        let mut rx = executor.events().subscribe();
        executor.buy_from_market(LEAGUE, DriverId(3), UserId(2)).await.expect("buy");
        clock.advance(Duration::days(7) + Duration::seconds(1));
        executor.buyout_clause(LEAGUE, DriverId(3), UserId(1), UserId(2)).await.expect("buyout");

        let mut vacancy = None;
        while let Ok(event) = rx.try_recv() {
            if let MarketEvent::RosterVacancy(v) = event {
                vacancy = Some(v);
            }
        }
        let vacancy = vacancy.expect("vacancy event");
        assert_eq!(vacancy.user_id, UserId(2));
        assert_eq!(vacancy.driver_id, DriverId(3));
        assert_eq!(vacancy.slot, crate::team::RosterSlot::Lineup(0));
    }

    #[tokio::test]
    async fn test_acquisition_price_chain_skips_quick_sells() {
        let (executor, clock) = executor().await;
        executor.buy_from_market(LEAGUE, DriverId(1), UserId(1)).await.expect("buy");
        executor.sell_to_market(LEAGUE, DriverId(1), UserId(1)).await.expect("sell");
        executor.registry().set_market_price(DriverId(1), Money::new(12_000_000)).expect("price");
        executor.buy_from_market(LEAGUE, DriverId(1), UserId(2)).await.expect("buy");
        clock.advance(Duration::days(8));
        executor.buyout_clause(LEAGUE, DriverId(1), UserId(1), UserId(2)).await.expect("buyout");

        let chain = executor.acquisition_price_chain(LEAGUE, DriverId(1)).await.expect("chain");
        assert_eq!(
            chain,
            vec![Money::new(10_000_000), Money::new(12_000_000), Money::new(15_600_000)]
        );
    }

    #[tokio::test]
    async fn test_unknown_team_and_driver() {
        let (executor, _clock) = executor().await;
        let no_team = executor.buy_from_market(LEAGUE, DriverId(1), UserId(9)).await;
        assert!(matches!(no_team, Err(MarketError::TeamNotFound { .. })));
        let no_driver = executor.buy_from_market(LEAGUE, DriverId(99), UserId(1)).await;
        assert!(matches!(no_driver, Err(MarketError::DriverNotFound { .. })));
    }
}

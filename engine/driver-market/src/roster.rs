//! Roster management: vacancy replacement, starter packs and reserve swaps
//!
//! The executor only signals a vacancy when a buyout empties a slot. What
//! happens to that slot is decided here by a pluggable `ReplacementPolicy`
//! and applied as a separate atomic change.

use crate::clock::Clock;
use crate::config::MarketConfig;
use crate::driver::{Driver, DriverRegistry, DriverTier};
use crate::error::{MarketError, Result};
use crate::events::{MarketEvent, MarketEventBus, RosterVacancy};
use crate::executor::TransactionExecutor;
use crate::ids::{ConstructorId, DriverId, LeagueId, UserId};
use crate::money::Money;
use crate::store::{ChangeSet, MarketStore};
use crate::team::{RosterSlot, UserTeam};
use crate::transaction::{MarketTransaction, TransactionType};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Attempts made before a conflicting roster change gives up
const MAX_ATTEMPTS: usize = 3;

/// What to do with a vacated slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "driver_id", rename_all = "snake_case")]
pub enum Replacement {
    PromoteReserve,
    EmergencyAssign(DriverId),
    LeaveEmpty,
}

/// Decides how a vacated roster slot is refilled
pub trait ReplacementPolicy: Send + Sync + std::fmt::Debug {
    /// `free_agents` holds the league's current free agents
    fn choose(
        &self,
        vacancy: &RosterVacancy,
        team: &UserTeam,
        free_agents: &[Driver],
    ) -> Replacement;
}

/// Promote the reserve into a vacated lineup slot, else assign the cheapest
/// affordable free agent at no cost
#[derive(Debug, Clone)]
pub struct ReservePromotionPolicy {
    pub emergency_price_ceiling: Money,
}

impl ReservePromotionPolicy {
    pub fn new(emergency_price_ceiling: Money) -> Self {
        Self { emergency_price_ceiling }
    }
}

impl ReplacementPolicy for ReservePromotionPolicy {
    fn choose(
        &self,
        vacancy: &RosterVacancy,
        team: &UserTeam,
        free_agents: &[Driver],
    ) -> Replacement {
        // A lost reserve is not replaced, nor is a slot already refilled
        if vacancy.slot == RosterSlot::Reserve || team.driver_in(vacancy.slot).is_some() {
            return Replacement::LeaveEmpty;
        }
        if team.reserve.is_some() {
            return Replacement::PromoteReserve;
        }

        let within_ceiling =
            cheapest(free_agents.iter().filter(|d| d.market_price <= self.emergency_price_ceiling));
        match within_ceiling.or_else(|| cheapest(free_agents.iter())) {
            Some(driver_id) => Replacement::EmergencyAssign(driver_id),
            None => Replacement::LeaveEmpty,
        }
    }
}

fn cheapest<'a>(drivers: impl Iterator<Item = &'a Driver>) -> Option<DriverId> {
    drivers.min_by_key(|driver| (driver.market_price, driver.id)).map(|driver| driver.id)
}

/// Never refill a vacated slot
#[derive(Debug, Clone, Copy, Default)]
pub struct LeaveEmptyPolicy;

impl ReplacementPolicy for LeaveEmptyPolicy {
    fn choose(&self, _: &RosterVacancy, _: &UserTeam, _: &[Driver]) -> Replacement {
        Replacement::LeaveEmpty
    }
}

/// Applies roster changes that sit outside the trading operations
pub struct RosterManager {
    store: Arc<dyn MarketStore>,
    registry: Arc<DriverRegistry>,
    clock: Arc<dyn Clock>,
    events: Arc<MarketEventBus>,
    config: MarketConfig,
    policy: Arc<dyn ReplacementPolicy>,
    rng: Mutex<fastrand::Rng>,
}

impl std::fmt::Debug for RosterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RosterManager").field("policy", &self.policy).finish()
    }
}

impl RosterManager {
    /// Create a new RosterManager sharing the executor's store, registry and clock
    pub fn new(executor: &TransactionExecutor, policy: Arc<dyn ReplacementPolicy>) -> Self {
        Self {
            store: executor.store().clone(),
            registry: executor.registry().clone(),
            clock: executor.clock().clone(),
            events: executor.events().clone(),
            config: executor.config().clone(),
            policy,
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    /// Make starter pack draws reproducible
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = fastrand::Rng::with_seed(seed);
        self
    }

    /// Consume vacancy events until the bus is dropped
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<MarketEvent>) {
        info!("Roster manager started with policy {:?}", self.policy);
        while let Some(event) = events.recv().await {
            let MarketEvent::RosterVacancy(vacancy) = event else {
                continue;
            };
            match self.handle_vacancy(&vacancy).await {
                Ok(replacement) => debug!(
                    "Vacancy of user {} in league {} resolved with {:?}",
                    vacancy.user_id, vacancy.league_id, replacement
                ),
                Err(e) => error!(
                    "Failed to handle vacancy of user {} in league {}: {}",
                    vacancy.user_id, vacancy.league_id, e
                ),
            }
        }
        info!("Roster manager stopped");
    }

    /// Apply the replacement policy to one vacancy
    pub async fn handle_vacancy(&self, vacancy: &RosterVacancy) -> Result<Replacement> {
        let mut attempt = 1;
        loop {
            match self.try_handle_vacancy(vacancy).await {
                Err(MarketError::Conflict { resource }) if attempt < MAX_ATTEMPTS => {
                    warn!("Vacancy handling hit a conflict on {}, retrying", resource);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn try_handle_vacancy(&self, vacancy: &RosterVacancy) -> Result<Replacement> {
        let now = self.clock.now();
        let mut team = self.load_team(vacancy.league_id, vacancy.user_id).await?;
        let free_agents = self.free_agents(vacancy.league_id).await?;
        let replacement = self.policy.choose(vacancy, &team, &free_agents);

        match replacement {
            Replacement::LeaveEmpty => {}
            Replacement::PromoteReserve => {
                let Some(reserve) = team.reserve.take() else {
                    return Ok(Replacement::LeaveEmpty);
                };
                team.fill(vacancy.slot, reserve);
                team.touch(now);
                self.store.commit(ChangeSet::new().team(team)).await?;
                info!(
                    "Promoted reserve driver {} for user {} in league {}",
                    reserve, vacancy.user_id, vacancy.league_id
                );
            }
            Replacement::EmergencyAssign(driver_id) => {
                let mut row = self
                    .store
                    .ownership(vacancy.league_id, driver_id)
                    .await?
                    .ok_or(MarketError::DriverNotFound {
                        driver_id,
                        league_id: vacancy.league_id,
                    })?;
                if !row.is_free_agent() {
                    return Err(MarketError::conflict(format!("driver {driver_id}")));
                }

                row.transfer(vacancy.user_id, Money::ZERO, None, now);
                team.fill(vacancy.slot, driver_id);
                team.touch(now);
                let transaction = MarketTransaction::new(
                    vacancy.league_id,
                    driver_id,
                    None,
                    vacancy.user_id,
                    Money::ZERO,
                    TransactionType::EmergencyAssignment,
                    now,
                );
                self.store
                    .commit(
                        ChangeSet::new().ownership(row).team(team).transaction(transaction.clone()),
                    )
                    .await?;

                info!(
                    "Emergency assigned driver {} to user {} in league {}",
                    driver_id, vacancy.user_id, vacancy.league_id
                );
                self.events.publish(MarketEvent::TransactionCommitted(transaction));
            }
        }
        Ok(replacement)
    }

    /// Create a team for a user and hand out the starter pack
    pub async fn join_league(
        &self,
        league_id: LeagueId,
        user_id: UserId,
        team_name: &str,
        constructor_id: Option<ConstructorId>,
    ) -> Result<UserTeam> {
        let mut attempt = 1;
        loop {
            match self.try_join_league(league_id, user_id, team_name, constructor_id).await {
                Err(MarketError::Conflict { resource }) if attempt < MAX_ATTEMPTS => {
                    warn!("Starter pack draw hit a conflict on {}, retrying", resource);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn try_join_league(
        &self,
        league_id: LeagueId,
        user_id: UserId,
        team_name: &str,
        constructor_id: Option<ConstructorId>,
    ) -> Result<UserTeam> {
        if self.store.team(league_id, user_id).await?.is_some() {
            return Err(MarketError::TeamAlreadyExists { user_id, league_id });
        }

        let now = self.clock.now();
        let needed = self.config.starter_pack_size;
        let rows = self.store.ownerships(league_id).await?;
        let free: Vec<DriverId> = rows
            .iter()
            .filter(|row| row.is_free_agent() && self.registry.get(row.driver_id).is_some())
            .map(|row| row.driver_id)
            .collect();
        if free.len() < needed {
            return Err(MarketError::NotEnoughFreeAgents {
                league_id,
                needed,
                available: free.len(),
            });
        }

        let picks = self.draw_starter_pack(&free, needed);
        let mut team =
            UserTeam::new(user_id, league_id, team_name, self.config.initial_budget, now);
        team.constructor_id = constructor_id;

        let mut changes = ChangeSet::new();
        for driver_id in &picks {
            let Some(mut row) = rows.iter().find(|row| row.driver_id == *driver_id).cloned() else {
                continue;
            };
            team.place(*driver_id, self.config.max_drivers_per_user)?;
            row.transfer(user_id, Money::ZERO, None, now);
            changes = changes.ownership(row).transaction(MarketTransaction::new(
                league_id,
                *driver_id,
                None,
                user_id,
                Money::ZERO,
                TransactionType::EmergencyAssignment,
                now,
            ));
        }
        let transactions = changes.transactions.clone();
        self.store.commit(changes.new_team(team)).await?;

        info!("User {} joined league {} with starter drivers {:?}", user_id, league_id, picks);
        for transaction in transactions {
            self.events.publish(MarketEvent::TransactionCommitted(transaction));
        }
        self.load_team(league_id, user_id).await
    }

    /// Random pick from tiers B and C, topped up from the rest when short
    ///
    /// Tiers are measured against the best free driver, not the whole grid.
    fn draw_starter_pack(&self, free: &[DriverId], needed: usize) -> Vec<DriverId> {
        let (mut preferred, mut rest): (Vec<DriverId>, Vec<DriverId>) =
            free.iter().partition(|id| {
                matches!(
                    self.registry.tier_within(**id, free),
                    Some(DriverTier::B | DriverTier::C)
                )
            });

        let mut rng = self.rng.lock();
        rng.shuffle(&mut preferred);
        rng.shuffle(&mut rest);
        preferred.into_iter().chain(rest).take(needed).collect()
    }

    /// Swap a lineup driver with the reserve
    pub async fn swap_reserve(
        &self,
        league_id: LeagueId,
        user_id: UserId,
        driver_id: DriverId,
    ) -> Result<UserTeam> {
        let mut team = self.load_team(league_id, user_id).await?;
        match team.slot_of(driver_id) {
            None => return Err(MarketError::DriverNotOnRoster { driver_id, user_id }),
            Some(RosterSlot::Reserve) => return Err(MarketError::AlreadyReserve { driver_id }),
            Some(RosterSlot::Lineup(index)) => {
                team.lineup[index] = team.reserve.take();
                team.reserve = Some(driver_id);
            }
        }
        team.touch(self.clock.now());
        self.store.commit(ChangeSet::new().team(team)).await?;

        info!("User {} moved driver {} to reserve in league {}", user_id, driver_id, league_id);
        self.load_team(league_id, user_id).await
    }

    async fn free_agents(&self, league_id: LeagueId) -> Result<Vec<Driver>> {
        let rows = self.store.ownerships(league_id).await?;
        Ok(rows
            .iter()
            .filter(|row| row.is_free_agent())
            .filter_map(|row| self.registry.get(row.driver_id))
            .collect())
    }

    async fn load_team(&self, league_id: LeagueId, user_id: UserId) -> Result<UserTeam> {
        self.store
            .team(league_id, user_id)
            .await?
            .ok_or(MarketError::TeamNotFound { user_id, league_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::test_driver;
    use crate::memory::InMemoryMarketStore;
    use crate::transaction::TransactionQuery;
    use chrono::Utc;

    const LEAGUE: LeagueId = LeagueId(3);

    async fn setup(policy: Arc<dyn ReplacementPolicy>) -> (TransactionExecutor, RosterManager) {
        let registry = DriverRegistry::from_drivers([
            test_driver(1, 30_000_000, 400),
            test_driver(2, 25_000_000, 350),
            test_driver(3, 12_000_000, 200),
            test_driver(4, 8_000_000, 150),
            test_driver(5, 6_000_000, 60),
            test_driver(6, 4_000_000, 10),
        ]);
        let executor = TransactionExecutor::new(
            Arc::new(InMemoryMarketStore::new()),
            Arc::new(registry),
            MarketConfig::default(),
        );
        executor.seed_league(LEAGUE).await.expect("seed");
        let roster = RosterManager::new(&executor, policy).with_seed(7);
        (executor, roster)
    }

    fn vacancy(slot: RosterSlot) -> RosterVacancy {
        RosterVacancy {
            league_id: LEAGUE,
            user_id: UserId(1),
            driver_id: DriverId(1),
            slot,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_policy_prefers_reserve_then_cheapest_within_ceiling() {
        let policy = ReservePromotionPolicy::new(Money::new(10_000_000));
        let mut team = UserTeam::new(UserId(1), LEAGUE, "T", Money::ZERO, Utc::now());
        team.reserve = Some(DriverId(9));
        let pool = [test_driver(4, 8_000_000, 0), test_driver(6, 4_000_000, 0)];

        let lineup = vacancy(RosterSlot::Lineup(0));
        assert_eq!(policy.choose(&lineup, &team, &pool), Replacement::PromoteReserve);
        assert_eq!(
            policy.choose(&vacancy(RosterSlot::Reserve), &team, &pool),
            Replacement::LeaveEmpty
        );

        team.reserve = None;
        assert_eq!(policy.choose(&lineup, &team, &pool), Replacement::EmergencyAssign(DriverId(6)));

        let pricey = [test_driver(1, 30_000_000, 0), test_driver(2, 25_000_000, 0)];
        let expensive_pick = policy.choose(&lineup, &team, &pricey);
        assert_eq!(expensive_pick, Replacement::EmergencyAssign(DriverId(2)));
        assert_eq!(policy.choose(&lineup, &team, &[]), Replacement::LeaveEmpty);
    }

    #[tokio::test]
    async fn test_join_league_draws_from_lower_tiers() {
        let (executor, roster) = setup(Arc::new(LeaveEmptyPolicy)).await;
        let team = roster.join_league(LEAGUE, UserId(1), "Rookies", None).await.expect("join");

        assert_eq!(team.driver_count(), 3);
        assert_eq!(team.budget_remaining, Money::new(100_000_000));
        assert!(team.reserve.is_none());
        // Drivers 1 and 2 are tier A against a 400-point leader
        for driver_id in team.drivers() {
            assert!(driver_id.0 >= 3, "tier A driver {driver_id} in starter pack");
            let row =
                executor.store().ownership(LEAGUE, driver_id).await.expect("read").expect("row");
            assert!(row.is_owned_by(UserId(1)));
            assert_eq!(row.locked_until(), None);
        }

        let logged = executor
            .history(&TransactionQuery::league(LEAGUE).user(UserId(1)))
            .await
            .expect("history");
        assert_eq!(logged.len(), 3);
        for entry in &logged {
            assert_eq!(entry.transaction_type, TransactionType::EmergencyAssignment);
            assert_eq!(entry.price, Money::ZERO);
        }

        let again = roster.join_league(LEAGUE, UserId(1), "Rookies", None).await;
        assert!(matches!(again, Err(MarketError::TeamAlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_starter_tiers_follow_best_free_driver() {
        let (_executor, roster) = setup(Arc::new(LeaveEmptyPolicy)).await;
        // With 1 and 2 gone, 3 (200) leads and 4 (150) is tier A next to it
        let free = [DriverId(3), DriverId(4), DriverId(5), DriverId(6)];
        for _ in 0..10 {
            let mut picks = roster.draw_starter_pack(&free, 2);
            picks.sort();
            assert_eq!(picks, vec![DriverId(5), DriverId(6)]);
        }

        let picks = roster.draw_starter_pack(&free, 3);
        assert!(picks[..2].contains(&DriverId(5)) && picks[..2].contains(&DriverId(6)));
        assert!(picks[2] == DriverId(3) || picks[2] == DriverId(4));
    }

    #[tokio::test]
    async fn test_join_league_needs_enough_free_agents() {
        let (_executor, roster) = setup(Arc::new(LeaveEmptyPolicy)).await;
        roster.join_league(LEAGUE, UserId(1), "A", None).await.expect("join");
        roster.join_league(LEAGUE, UserId(2), "B", None).await.expect("join");
        let third = roster.join_league(LEAGUE, UserId(3), "C", None).await;
        assert!(matches!(
            third,
            Err(MarketError::NotEnoughFreeAgents { needed: 3, available: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_emergency_assignment_fills_slot_for_free() {
        let policy = Arc::new(ReservePromotionPolicy::new(Money::new(10_000_000)));
        let (executor, roster) = setup(policy).await;
        let now = Utc::now();
        let team = UserTeam::new(UserId(1), LEAGUE, "Solo", Money::new(100_000_000), now);
        executor.store().commit(ChangeSet::new().new_team(team)).await.expect("team");

        let replacement =
            roster.handle_vacancy(&vacancy(RosterSlot::Lineup(1))).await.expect("handle");
        assert_eq!(replacement, Replacement::EmergencyAssign(DriverId(6)));

        let team = executor.team(LEAGUE, UserId(1)).await.expect("team");
        assert_eq!(team.lineup[1], Some(DriverId(6)));
        assert_eq!(team.budget_remaining, Money::new(100_000_000));
        let row =
            executor.store().ownership(LEAGUE, DriverId(6)).await.expect("read").expect("row");
        assert_eq!(row.owned().map(|o| o.acquisition_price), Some(Money::ZERO));
        assert!(!row.is_locked(Utc::now()));
    }

    #[tokio::test]
    async fn test_swap_reserve() {
        let (executor, roster) = setup(Arc::new(LeaveEmptyPolicy)).await;
        let now = Utc::now();
        let team = UserTeam::new(UserId(1), LEAGUE, "Swap", Money::new(100_000_000), now);
        executor.store().commit(ChangeSet::new().new_team(team)).await.expect("team");
        for id in [3, 4, 5, 6] {
            executor.buy_from_market(LEAGUE, DriverId(id), UserId(1)).await.expect("buy");
        }

        let team = roster.swap_reserve(LEAGUE, UserId(1), DriverId(4)).await.expect("swap");
        assert_eq!(team.lineup, [Some(DriverId(3)), Some(DriverId(6)), Some(DriverId(5))]);
        assert_eq!(team.reserve, Some(DriverId(4)));

        let already = roster.swap_reserve(LEAGUE, UserId(1), DriverId(4)).await;
        assert_eq!(already.unwrap_err(), MarketError::AlreadyReserve { driver_id: DriverId(4) });
        let missing = roster.swap_reserve(LEAGUE, UserId(1), DriverId(1)).await;
        assert!(matches!(missing, Err(MarketError::DriverNotOnRoster { .. })));
    }
}

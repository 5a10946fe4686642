//! # Driver Market
//!
//! Ownership ledger, pricing and transaction execution for F1 fantasy leagues.
//!
//! ## Architecture
//!
//! - **PricingCalculator**: base, acquisition, display, buyout and refund prices
//! - **determine_driver_action**: which market action a user may take on a driver
//! - **DriverOwnership**: per-driver-per-league ledger row, lock expiry derived lazily
//! - **TransactionExecutor**: buy, sell, list, unlist and buyout as atomic change sets
//! - **RosterManager**: vacancy replacement, starter packs and reserve swaps
//! - **MarketStore**: storage seam, with `InMemoryMarketStore` built in
//!
//! ## Usage
//!
//! ```rust
//! use driver_market::{
//!     DriverRegistry, InMemoryMarketStore, LeagueId, MarketConfig, TransactionExecutor,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> driver_market::Result<()> {
//!     let executor = TransactionExecutor::new(
//!         Arc::new(InMemoryMarketStore::new()),
//!         Arc::new(DriverRegistry::new()),
//!         MarketConfig::default(),
//!     );
//!     executor.seed_league(LeagueId(1)).await?;
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod executor;
pub mod ids;
pub mod memory;
pub mod money;
pub mod ownership;
pub mod pricing;
pub mod roster;
pub mod store;
pub mod team;
pub mod transaction;

pub use action::{determine_driver_action, ActionType, DriverAction};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{MarketConfig, PricingRules};
pub use driver::{Driver, DriverRegistry, DriverSeed, DriverTier, SeasonStats};
pub use error::{MarketError, Result};
pub use events::{MarketEvent, MarketEventBus, RosterVacancy};
pub use executor::{DriverView, TransactionExecutor};
pub use ids::{ConstructorId, DriverId, LeagueId, UserId};
pub use memory::InMemoryMarketStore;
pub use money::{Money, Rounding};
pub use ownership::{DriverOwnership, Listing, MarketState, OwnedDriver, Ownership};
pub use pricing::{
    buyout_price, listing_profit, refund_price, suggested_listing_price, DriverPricing,
    PricingCalculator,
};
pub use roster::{
    LeaveEmptyPolicy, Replacement, ReplacementPolicy, ReservePromotionPolicy, RosterManager,
};
pub use store::{ChangeSet, MarketStore};
pub use team::{RosterSlot, UserTeam, LINEUP_SLOTS};
pub use transaction::{
    BuyoutRecord, MarketTransaction, TransactionQuery, TransactionResult, TransactionType,
};

//! Pricing calculator
//!
//! Derives every price shown for a driver from its base market price and its
//! ownership row. Pure: no store access, `now` is passed in.

use crate::config::PricingRules;
use crate::driver::Driver;
use crate::ids::UserId;
use crate::money::{Money, Rounding};
use crate::ownership::{is_locked, DriverOwnership, Ownership};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Prices and ownership flags of a driver as seen by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverPricing {
    /// Current dynamic market price
    pub base_price: Money,
    /// What the current owner paid, or the base price for a free agent
    pub acquisition_price: Money,
    /// Asking price when listed with one, else the acquisition price
    pub display_price: Money,
    pub buyout_price: Money,
    pub refund_price: Money,
    pub is_free_agent: bool,
    pub is_owned_by_me: bool,
    pub is_owned_by_other: bool,
    pub is_locked: bool,
    pub is_for_sale: bool,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Buyout price: acquisition price with the buyout premium, rounded to nearest
pub fn buyout_price(acquisition_price: Money, rules: &PricingRules) -> Money {
    acquisition_price.scale(rules.buyout_multiplier, Rounding::Nearest)
}

/// Quick-sell refund: acquisition price times the refund ratio, floored
pub fn refund_price(acquisition_price: Money, rules: &PricingRules) -> Money {
    acquisition_price.scale(rules.refund_ratio, Rounding::Floor)
}

/// Asking price used when a listing does not name one
pub fn suggested_listing_price(acquisition_price: Money, rules: &PricingRules) -> Money {
    acquisition_price.scale(rules.listing_markup, Rounding::Nearest)
}

/// Profit preview for a listing: absolute difference and percentage of the
/// acquisition price (two decimal places, zero when nothing was paid)
pub fn listing_profit(asking_price: Money, acquisition_price: Money) -> (Money, Decimal) {
    let profit = asking_price - acquisition_price;
    if acquisition_price.is_zero() {
        return (profit, Decimal::ZERO);
    }
    let percentage = Decimal::from(profit.units()) * Decimal::ONE_HUNDRED
        / Decimal::from(acquisition_price.units());
    (profit, percentage.round_dp(2))
}

/// Pricing calculator bound to a set of market rules
#[derive(Debug, Clone, Default)]
pub struct PricingCalculator {
    rules: PricingRules,
}

impl PricingCalculator {
    /// Create a new PricingCalculator
    pub fn new(rules: PricingRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &PricingRules {
        &self.rules
    }

    /// Price a driver for `viewer` at `now`
    pub fn price(
        &self,
        driver: &Driver,
        ownership: &DriverOwnership,
        viewer: UserId,
        now: DateTime<Utc>,
    ) -> DriverPricing {
        let base_price = driver.market_price;

        match &ownership.ownership {
            Ownership::FreeAgent => DriverPricing {
                base_price,
                acquisition_price: base_price,
                display_price: base_price,
                buyout_price: buyout_price(base_price, &self.rules),
                refund_price: refund_price(base_price, &self.rules),
                is_free_agent: true,
                is_owned_by_me: false,
                is_owned_by_other: false,
                is_locked: false,
                is_for_sale: false,
                locked_until: None,
            },
            Ownership::Owned(owned) => {
                let acquisition_price = owned.acquisition_price;
                let display_price = owned
                    .listing
                    .and_then(|listing| listing.asking_price)
                    .unwrap_or(acquisition_price);
                let is_owned_by_me = owned.owner_id == viewer;

                DriverPricing {
                    base_price,
                    acquisition_price,
                    display_price,
                    buyout_price: buyout_price(acquisition_price, &self.rules),
                    refund_price: refund_price(acquisition_price, &self.rules),
                    is_free_agent: false,
                    is_owned_by_me,
                    is_owned_by_other: !is_owned_by_me,
                    is_locked: is_locked(owned.locked_until, now),
                    is_for_sale: owned.listing.is_some(),
                    locked_until: owned.locked_until,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::test_driver;
    use crate::ids::{DriverId, LeagueId};
    use crate::ownership::Listing;
    use chrono::Duration;
    use proptest::prelude::*;

    fn owned_by(owner: UserId, acquisition: i64, locked_for: Option<Duration>) -> DriverOwnership {
        let now = Utc::now();
        let mut row = DriverOwnership::free_agent(LeagueId(1), DriverId(1), now);
        row.transfer(owner, Money::new(acquisition), locked_for.map(|d| now + d), now);
        row
    }

    #[test]
    fn test_free_agent_pricing_uses_base_price() {
        let calculator = PricingCalculator::default();
        let driver = test_driver(1, 10_000_000, 50);
        let row = DriverOwnership::free_agent(LeagueId(1), DriverId(1), Utc::now());

        let pricing = calculator.price(&driver, &row, UserId(1), Utc::now());
        assert!(pricing.is_free_agent);
        assert_eq!(pricing.acquisition_price, Money::new(10_000_000));
        assert_eq!(pricing.display_price, Money::new(10_000_000));
        assert_eq!(pricing.buyout_price, Money::new(13_000_000));
        assert_eq!(pricing.refund_price, Money::new(8_000_000));
        assert!(!pricing.is_locked && !pricing.is_for_sale);
    }

    #[test]
    fn test_owned_pricing_uses_acquisition_price() {
        let calculator = PricingCalculator::default();
        // Market price moved since the owner bought in
        let driver = test_driver(1, 30_000_000, 50);
        let row = owned_by(UserId(2), 20_000_000, None);

        let pricing = calculator.price(&driver, &row, UserId(1), Utc::now());
        assert_eq!(pricing.base_price, Money::new(30_000_000));
        assert_eq!(pricing.acquisition_price, Money::new(20_000_000));
        assert_eq!(pricing.buyout_price, Money::new(26_000_000));
        assert!(pricing.is_owned_by_other);
        assert!(!pricing.is_owned_by_me);
    }

    #[test]
    fn test_display_price_follows_listing() {
        let calculator = PricingCalculator::default();
        let driver = test_driver(1, 10_000_000, 50);
        let now = Utc::now();

        let mut row = owned_by(UserId(2), 10_000_000, None);
        row.set_listing(Some(Listing { asking_price: Some(Money::new(12_345_678)) }), now);
        let pricing = calculator.price(&driver, &row, UserId(2), now);
        assert_eq!(pricing.display_price, Money::new(12_345_678));
        assert!(pricing.is_for_sale && pricing.is_owned_by_me);

        row.set_listing(Some(Listing { asking_price: None }), now);
        let pricing = calculator.price(&driver, &row, UserId(2), now);
        assert_eq!(pricing.display_price, Money::new(10_000_000));
    }

    #[test]
    fn test_lock_flag_is_time_dependent() {
        let calculator = PricingCalculator::default();
        let driver = test_driver(1, 10_000_000, 50);
        let row = owned_by(UserId(2), 10_000_000, Some(Duration::days(7)));

        let now = Utc::now();
        assert!(calculator.price(&driver, &row, UserId(1), now).is_locked);
        assert!(!calculator.price(&driver, &row, UserId(1), now + Duration::days(8)).is_locked);
    }

    #[test]
    fn test_listing_helpers() {
        let rules = PricingRules::default();
        assert_eq!(suggested_listing_price(Money::new(10_000_000), &rules), Money::new(11_000_000));
        assert_eq!(refund_price(Money::new(5_000_000), &rules), Money::new(4_000_000));

        let (profit, pct) = listing_profit(Money::new(11_000_000), Money::new(10_000_000));
        assert_eq!(profit, Money::new(1_000_000));
        assert_eq!(pct, Decimal::new(10, 0));

        let (loss, pct) = listing_profit(Money::new(9_000_000), Money::new(12_000_000));
        assert_eq!(loss, Money::new(-3_000_000));
        assert_eq!(pct, Decimal::new(-25, 0));

        assert_eq!(listing_profit(Money::new(5), Money::ZERO), (Money::new(5), Decimal::ZERO));
    }

    proptest! {
        #[test]
        fn prop_refund_acquisition_buyout_ordering(acquisition in 0i64..=10_000_000_000) {
            let rules = PricingRules::default();
            let acquisition = Money::new(acquisition);
            prop_assert!(refund_price(acquisition, &rules) <= acquisition);
            prop_assert!(acquisition <= buyout_price(acquisition, &rules));
            prop_assert!(acquisition <= suggested_listing_price(acquisition, &rules));
        }
    }
}

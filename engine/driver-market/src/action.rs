//! Action resolver: which market action a user may take on a driver

use crate::money::Money;
use crate::pricing::DriverPricing;
use serde::{Deserialize, Serialize};

/// Market action offered to a user for one driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    BuyFreeAgent,
    LockedByMe,
    Unlist,
    SellOptions,
    BuyListed,
    Buyout,
    LockedByOther,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::BuyFreeAgent => "buy-free-agent",
            ActionType::LockedByMe => "locked-by-me",
            ActionType::Unlist => "unlist",
            ActionType::SellOptions => "sell-options",
            ActionType::BuyListed => "buy-listed",
            ActionType::Buyout => "buyout",
            ActionType::LockedByOther => "locked-by-other",
        }
    }

    /// Whether the action acquires the driver
    pub fn is_acquisition(&self) -> bool {
        matches!(self, ActionType::BuyFreeAgent | ActionType::BuyListed | ActionType::Buyout)
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved action with the affordability details behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverAction {
    pub action_type: ActionType,
    pub can_execute: bool,
    /// Price the budget is checked against, if the action costs anything
    pub price_to_check: Option<Money>,
    pub can_afford: bool,
    pub has_space: bool,
}

/// Resolve the action for a driver given the viewer's budget and roster size.
///
/// Rules are evaluated in a fixed priority order; the first match wins.
pub fn determine_driver_action(
    pricing: &DriverPricing,
    user_budget: Money,
    user_driver_count: usize,
    max_drivers: usize,
) -> DriverAction {
    let has_space = user_driver_count < max_drivers;
    let acquire = |action_type, price: Money| {
        let can_afford = user_budget >= price;
        DriverAction {
            action_type,
            can_execute: can_afford && has_space,
            price_to_check: Some(price),
            can_afford,
            has_space,
        }
    };
    let fixed = |action_type, can_execute| DriverAction {
        action_type,
        can_execute,
        price_to_check: None,
        can_afford: true,
        has_space,
    };

    if pricing.is_free_agent {
        return acquire(ActionType::BuyFreeAgent, pricing.base_price);
    }

    if pricing.is_owned_by_me {
        return if pricing.is_locked {
            fixed(ActionType::LockedByMe, false)
        } else if pricing.is_for_sale {
            fixed(ActionType::Unlist, true)
        } else {
            fixed(ActionType::SellOptions, true)
        };
    }

    if pricing.is_for_sale {
        acquire(ActionType::BuyListed, pricing.display_price)
    } else if !pricing.is_locked {
        acquire(ActionType::Buyout, pricing.buyout_price)
    } else {
        fixed(ActionType::LockedByOther, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pricing() -> DriverPricing {
        DriverPricing {
            base_price: Money::new(10_000_000),
            acquisition_price: Money::new(10_000_000),
            display_price: Money::new(10_000_000),
            buyout_price: Money::new(13_000_000),
            refund_price: Money::new(8_000_000),
            is_free_agent: false,
            is_owned_by_me: false,
            is_owned_by_other: false,
            is_locked: false,
            is_for_sale: false,
            locked_until: None,
        }
    }

    fn free_agent() -> DriverPricing {
        DriverPricing { is_free_agent: true, ..pricing() }
    }

    fn mine(is_locked: bool, is_for_sale: bool) -> DriverPricing {
        DriverPricing { is_owned_by_me: true, is_locked, is_for_sale, ..pricing() }
    }

    fn theirs(is_locked: bool, is_for_sale: bool) -> DriverPricing {
        DriverPricing { is_owned_by_other: true, is_locked, is_for_sale, ..pricing() }
    }

    #[test]
    fn test_free_agent_needs_budget_and_space() {
        let action = determine_driver_action(&free_agent(), Money::new(10_000_000), 3, 4);
        assert_eq!(action.action_type, ActionType::BuyFreeAgent);
        assert!(action.can_execute);
        assert_eq!(action.price_to_check, Some(Money::new(10_000_000)));

        let broke = determine_driver_action(&free_agent(), Money::new(9_999_999), 0, 4);
        assert!(!broke.can_execute && !broke.can_afford);

        let full = determine_driver_action(&free_agent(), Money::new(50_000_000), 4, 4);
        assert!(!full.can_execute && !full.has_space && full.can_afford);
    }

    #[test]
    fn test_own_driver_priority() {
        // Locked wins over listed
        let action = determine_driver_action(&mine(true, true), Money::ZERO, 4, 4);
        assert_eq!(action.action_type, ActionType::LockedByMe);
        assert!(!action.can_execute);

        let action = determine_driver_action(&mine(false, true), Money::ZERO, 4, 4);
        assert_eq!(action.action_type, ActionType::Unlist);
        assert!(action.can_execute);

        let action = determine_driver_action(&mine(false, false), Money::ZERO, 4, 4);
        assert_eq!(action.action_type, ActionType::SellOptions);
        assert!(action.can_execute);
    }

    #[test]
    fn test_other_owner_actions() {
        let listed = DriverPricing { display_price: Money::new(12_000_000), ..theirs(true, true) };
        let action = determine_driver_action(&listed, Money::new(12_000_000), 2, 4);
        assert_eq!(action.action_type, ActionType::BuyListed);
        assert_eq!(action.price_to_check, Some(Money::new(12_000_000)));
        assert!(action.can_execute);

        let action = determine_driver_action(&theirs(false, false), Money::new(12_999_999), 2, 4);
        assert_eq!(action.action_type, ActionType::Buyout);
        assert_eq!(action.price_to_check, Some(Money::new(13_000_000)));
        assert!(!action.can_execute);

        let action = determine_driver_action(&theirs(true, false), Money::new(100_000_000), 0, 4);
        assert_eq!(action.action_type, ActionType::LockedByOther);
        assert!(!action.can_execute);
    }

    #[test]
    fn test_action_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&ActionType::BuyFreeAgent).expect("serialize"),
            "\"buy-free-agent\""
        );
        assert_eq!(ActionType::LockedByOther.to_string(), "locked-by-other");
        assert!(ActionType::Buyout.is_acquisition());
        assert!(!ActionType::SellOptions.is_acquisition());
    }
}

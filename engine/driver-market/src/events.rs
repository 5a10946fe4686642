//! Market events and the in-process bus that fans them out

use crate::ids::{DriverId, LeagueId, UserId};
use crate::money::Money;
use crate::team::RosterSlot;
use crate::transaction::MarketTransaction;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// A roster slot emptied by a forced transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterVacancy {
    pub league_id: LeagueId,
    pub user_id: UserId,
    /// Driver that left the roster
    pub driver_id: DriverId,
    pub slot: RosterSlot,
    pub occurred_at: DateTime<Utc>,
}

/// Events emitted after a change set commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MarketEvent {
    TransactionCommitted(MarketTransaction),
    Listed {
        league_id: LeagueId,
        driver_id: DriverId,
        owner_id: UserId,
        asking_price: Money,
    },
    Unlisted {
        league_id: LeagueId,
        driver_id: DriverId,
        owner_id: UserId,
    },
    RosterVacancy(RosterVacancy),
}

/// Fan-out of market events to any number of subscribers
#[derive(Debug, Default)]
pub struct MarketEventBus {
    subscribers: RwLock<Vec<mpsc::UnboundedSender<MarketEvent>>>,
}

impl MarketEventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; it receives every event published from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<MarketEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Send an event to every live subscriber, dropping closed ones
    pub fn publish(&self, event: MarketEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        debug!("Published market event to {} subscribers", subscribers.len());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_and_prunes_closed() {
        let bus = MarketEventBus::new();
        let mut first = bus.subscribe();
        let second = bus.subscribe();
        drop(second);

        let event = MarketEvent::Unlisted {
            league_id: LeagueId(1),
            driver_id: DriverId(4),
            owner_id: UserId(2),
        };
        bus.publish(event.clone());

        assert_eq!(first.recv().await, Some(event));
        assert_eq!(bus.subscriber_count(), 1);
    }
}

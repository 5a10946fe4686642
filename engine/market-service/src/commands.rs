//! JSON-lines command protocol
//!
//! Each input line is one [`MarketCommand`]; each output line is one
//! [`CommandResponse`]. Rule rejections come back as `ok: false` with the
//! error's stable code, never as a process failure.

use driver_market::{
    listing_profit, suggested_listing_price, ConstructorId, DriverId, LeagueId, MarketError, Money,
    RosterManager, TransactionExecutor, TransactionQuery, TransactionType, UserId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Requests accepted by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum MarketCommand {
    SeedLeague {
        league_id: LeagueId,
    },
    JoinLeague {
        league_id: LeagueId,
        user_id: UserId,
        team_name: String,
        #[serde(default)]
        constructor_id: Option<ConstructorId>,
    },
    BuyFromMarket {
        league_id: LeagueId,
        driver_id: DriverId,
        user_id: UserId,
    },
    BuyFromUser {
        league_id: LeagueId,
        driver_id: DriverId,
        buyer_id: UserId,
        seller_id: UserId,
    },
    SellToMarket {
        league_id: LeagueId,
        driver_id: DriverId,
        user_id: UserId,
    },
    ListForSale {
        league_id: LeagueId,
        driver_id: DriverId,
        user_id: UserId,
        #[serde(default)]
        asking_price: Option<Money>,
    },
    Unlist {
        league_id: LeagueId,
        driver_id: DriverId,
        user_id: UserId,
    },
    Buyout {
        league_id: LeagueId,
        driver_id: DriverId,
        buyer_id: UserId,
        victim_id: UserId,
    },
    SwapReserve {
        league_id: LeagueId,
        user_id: UserId,
        driver_id: DriverId,
    },
    Pricing {
        league_id: LeagueId,
        driver_id: DriverId,
        user_id: UserId,
    },
    Action {
        league_id: LeagueId,
        driver_id: DriverId,
        user_id: UserId,
    },
    /// Profit a listing would make; defaults to the suggested markup price
    ListingPreview {
        league_id: LeagueId,
        driver_id: DriverId,
        user_id: UserId,
        #[serde(default)]
        asking_price: Option<Money>,
    },
    Market {
        league_id: LeagueId,
        user_id: UserId,
    },
    FreeAgents {
        league_id: LeagueId,
    },
    Listings {
        league_id: LeagueId,
    },
    Team {
        league_id: LeagueId,
        user_id: UserId,
    },
    History {
        league_id: LeagueId,
        #[serde(default)]
        driver_id: Option<DriverId>,
        #[serde(default)]
        user_id: Option<UserId>,
        #[serde(default)]
        transaction_type: Option<TransactionType>,
        #[serde(default)]
        limit: Option<usize>,
    },
    PriceChain {
        league_id: LeagueId,
        driver_id: DriverId,
    },
    /// Market price feed from the performance pipeline
    SetMarketPrice {
        driver_id: DriverId,
        price: Money,
    },
}

impl MarketCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SeedLeague { .. } => "seed_league",
            Self::JoinLeague { .. } => "join_league",
            Self::BuyFromMarket { .. } => "buy_from_market",
            Self::BuyFromUser { .. } => "buy_from_user",
            Self::SellToMarket { .. } => "sell_to_market",
            Self::ListForSale { .. } => "list_for_sale",
            Self::Unlist { .. } => "unlist",
            Self::Buyout { .. } => "buyout",
            Self::SwapReserve { .. } => "swap_reserve",
            Self::Pricing { .. } => "pricing",
            Self::Action { .. } => "action",
            Self::ListingPreview { .. } => "listing_preview",
            Self::Market { .. } => "market",
            Self::FreeAgents { .. } => "free_agents",
            Self::Listings { .. } => "listings",
            Self::Team { .. } => "team",
            Self::History { .. } => "history",
            Self::PriceChain { .. } => "price_chain",
            Self::SetMarketPrice { .. } => "set_market_price",
        }
    }
}

/// Error body of a failed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// One response line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl CommandResponse {
    pub fn success(data: Value) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody { code: code.into(), message: message.into() }),
        }
    }

    /// Rendering for the output stream; falls back to a fixed body if encoding fails
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"ok":false,"error":{{"code":"encoding","message":"{e}"}}}}"#)
        })
    }
}

impl From<MarketError> for CommandResponse {
    fn from(err: MarketError) -> Self {
        Self::failure(err.code(), err.to_string())
    }
}

/// Routes commands to the executor and roster manager
#[derive(Debug, Clone)]
pub struct CommandHandler {
    executor: Arc<TransactionExecutor>,
    roster: Arc<RosterManager>,
}

impl CommandHandler {
    pub fn new(executor: Arc<TransactionExecutor>, roster: Arc<RosterManager>) -> Self {
        Self { executor, roster }
    }

    /// Parse and execute one input line
    pub async fn handle_line(&self, line: &str) -> CommandResponse {
        match serde_json::from_str::<MarketCommand>(line) {
            Ok(command) => self.handle(command).await,
            Err(e) => CommandResponse::failure("invalid_command", e.to_string()),
        }
    }

    pub async fn handle(&self, command: MarketCommand) -> CommandResponse {
        debug!("Handling {} command", command.name());
        match self.dispatch(command).await {
            Ok(data) => CommandResponse::success(data),
            Err(CommandError::Market(err)) => err.into(),
            Err(CommandError::Encoding(err)) => {
                CommandResponse::failure("encoding", err.to_string())
            }
        }
    }

    async fn dispatch(&self, command: MarketCommand) -> Result<Value, CommandError> {
        let executor = &self.executor;
        let value = match command {
            MarketCommand::SeedLeague { league_id } => {
                serde_json::json!({ "created": executor.seed_league(league_id).await? })
            }
            MarketCommand::JoinLeague { league_id, user_id, team_name, constructor_id } => {
                let roster = &self.roster;
                to_value(roster.join_league(league_id, user_id, &team_name, constructor_id).await?)?
            }
            MarketCommand::BuyFromMarket { league_id, driver_id, user_id } => {
                to_value(executor.buy_from_market(league_id, driver_id, user_id).await?)?
            }
            MarketCommand::BuyFromUser { league_id, driver_id, buyer_id, seller_id } => {
                to_value(executor.buy_from_user(league_id, driver_id, buyer_id, seller_id).await?)?
            }
            MarketCommand::SellToMarket { league_id, driver_id, user_id } => {
                to_value(executor.sell_to_market(league_id, driver_id, user_id).await?)?
            }
            MarketCommand::ListForSale { league_id, driver_id, user_id, asking_price } => {
                let result =
                    executor.list_for_sale(league_id, driver_id, user_id, asking_price).await?;
                to_value(result)?
            }
            MarketCommand::Unlist { league_id, driver_id, user_id } => {
                to_value(executor.unlist(league_id, driver_id, user_id).await?)?
            }
            MarketCommand::Buyout { league_id, driver_id, buyer_id, victim_id } => {
                to_value(executor.buyout_clause(league_id, driver_id, buyer_id, victim_id).await?)?
            }
            MarketCommand::SwapReserve { league_id, user_id, driver_id } => {
                to_value(self.roster.swap_reserve(league_id, user_id, driver_id).await?)?
            }
            MarketCommand::Pricing { league_id, driver_id, user_id } => {
                to_value(executor.driver_pricing(league_id, driver_id, user_id).await?)?
            }
            MarketCommand::Action { league_id, driver_id, user_id } => {
                to_value(executor.driver_action(league_id, driver_id, user_id).await?)?
            }
            MarketCommand::ListingPreview { league_id, driver_id, user_id, asking_price } => {
                let pricing = executor.driver_pricing(league_id, driver_id, user_id).await?;
                let rules = &executor.config().pricing;
                let asking = asking_price
                    .unwrap_or_else(|| suggested_listing_price(pricing.acquisition_price, rules));
                let (profit, percentage) = listing_profit(asking, pricing.acquisition_price);
                serde_json::json!({
                    "asking_price": asking,
                    "acquisition_price": pricing.acquisition_price,
                    "profit": profit,
                    "profit_percentage": percentage,
                })
            }
            MarketCommand::Market { league_id, user_id } => {
                to_value(executor.market_view(league_id, user_id).await?)?
            }
            MarketCommand::FreeAgents { league_id } => {
                to_value(executor.free_agents(league_id).await?)?
            }
            MarketCommand::Listings { league_id } => to_value(executor.listings(league_id).await?)?,
            MarketCommand::Team { league_id, user_id } => {
                to_value(executor.team(league_id, user_id).await?)?
            }
            MarketCommand::History { league_id, driver_id, user_id, transaction_type, limit } => {
                let query = TransactionQuery {
                    league_id: Some(league_id),
                    driver_id,
                    user_id,
                    transaction_type,
                    limit,
                };
                to_value(executor.history(&query).await?)?
            }
            MarketCommand::PriceChain { league_id, driver_id } => {
                to_value(executor.acquisition_price_chain(league_id, driver_id).await?)?
            }
            MarketCommand::SetMarketPrice { driver_id, price } => {
                executor.registry().set_market_price(driver_id, price)?;
                serde_json::json!({ "driver_id": driver_id, "market_price": price })
            }
        };
        Ok(value)
    }
}

#[derive(Debug, thiserror::Error)]
enum CommandError {
    #[error(transparent)]
    Market(#[from] MarketError),

    #[error(transparent)]
    Encoding(#[from] serde_json::Error),
}

fn to_value<T: Serialize>(value: T) -> Result<Value, serde_json::Error> {
    serde_json::to_value(value)
}

//! # Market Persistence
//!
//! Postgres implementation of the driver market `MarketStore`.
//!
//! - **PgMarketStore**: versioned row updates inside one SQL transaction per change set
//! - **DatabaseConfig**: pool settings, with `DATABASE_URL` support
//! - **migrations/**: embedded schema, applied on connect

pub mod config;
pub mod error;
pub mod postgres;
mod rows;

pub use config::DatabaseConfig;
pub use error::{PersistenceError, Result};
pub use postgres::PgMarketStore;

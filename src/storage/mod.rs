//! Persistence for opportunities and orders.
//!
//! Monetary fields are stored as fixed-point decimal strings rounded to
//! 8 fractional digits (round-half-up); full precision is kept in memory
//! until the persistence boundary.

mod sqlite;

#[cfg(test)]
pub mod memory;

pub use sqlite::{SqliteStorage, SqliteStorageConfig};

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::{ArbOpportunity, ExchangeOrder, OrderStatus};

/// Fractional digits retained at the persistence boundary.
pub const MONEY_SCALE: u32 = 8;

/// Rounds a monetary value for storage: 8 digits, half-up.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Storage persists opportunities and orders; it stores and returns
/// copies but never mints identity.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persists an opportunity, returning the stored copy.
    async fn save_opportunity(&self, opp: &ArbOpportunity)
        -> Result<ArbOpportunity, StorageError>;

    /// Retrieves an opportunity by id.
    async fn opportunity_by_id(&self, id: &str)
        -> Result<Option<ArbOpportunity>, StorageError>;

    /// Persists an order (insert or update by id), returning the stored copy.
    async fn save_order(&self, order: &ExchangeOrder) -> Result<ExchangeOrder, StorageError>;

    /// Retrieves an order by id.
    async fn order_by_id(&self, id: &str) -> Result<Option<ExchangeOrder>, StorageError>;

    /// Retrieves all orders at the given status.
    async fn orders_by_status(&self, status: OrderStatus)
        -> Result<Vec<ExchangeOrder>, StorageError>;

    /// Retrieves the legs linked to an opportunity.
    async fn orders_by_opportunity(&self, id: &str)
        -> Result<Vec<ExchangeOrder>, StorageError>;

    /// Closes the storage connection.
    async fn close(&self) -> Result<(), StorageError>;
}

/// StorageError represents errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

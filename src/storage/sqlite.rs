//! SQLite implementation of Storage.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

use crate::domain::{ArbOpportunity, Currency, ExchangeOrder, OrderStatus};
use crate::storage::{round_money, Storage, StorageError};

/// SqliteStorage persists opportunities and orders in SQLite.
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

/// SqliteStorageConfig holds SQLite storage configuration.
#[derive(Debug, Clone)]
pub struct SqliteStorageConfig {
    /// Path to the SQLite database file.
    pub path: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
}

impl Default for SqliteStorageConfig {
    fn default() -> Self {
        Self {
            path: "crossarb.db".to_string(),
            max_connections: 5,
        }
    }
}

impl SqliteStorage {
    /// Creates a new SQLite storage instance.
    pub async fn new(config: SqliteStorageConfig) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let storage = Self { pool };

        storage.migrate().await?;

        info!(path = %config.path, "SQLite storage initialized");
        Ok(storage)
    }

    /// Runs database migrations to create the schema.
    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS arb_opportunity (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                source_venue TEXT NOT NULL,
                dest_venue TEXT NOT NULL,
                from_currency TEXT NOT NULL,
                to_currency TEXT NOT NULL,
                source_rate TEXT NOT NULL,
                dest_rate TEXT NOT NULL,
                percentage TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS exchange_order (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                status TEXT NOT NULL,
                venue TEXT NOT NULL,
                source_currency TEXT NOT NULL,
                dest_currency TEXT NOT NULL,
                venue_tx_id TEXT,
                arb_opportunity_id TEXT,
                source_amount TEXT,
                dest_amount TEXT,
                rate TEXT,
                fees TEXT,
                fees_currency TEXT,
                achieved_source_amount TEXT,
                achieved_dest_amount TEXT,
                achieved_rate TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_exchange_order_status ON exchange_order(status)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_exchange_order_opportunity ON exchange_order(arb_opportunity_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_order_rows(&self, rows: Vec<SqliteRow>) -> Result<Vec<ExchangeOrder>, StorageError> {
        rows.iter().map(parse_order_row).collect()
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_opportunity(
        &self,
        opp: &ArbOpportunity,
    ) -> Result<ArbOpportunity, StorageError> {
        sqlx::query(
            r#"
            INSERT INTO arb_opportunity (
                id, created_at, source_venue, dest_venue,
                from_currency, to_currency, source_rate, dest_rate, percentage
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                source_rate = excluded.source_rate,
                dest_rate = excluded.dest_rate,
                percentage = excluded.percentage
            "#,
        )
        .bind(&opp.id)
        .bind(opp.created_at.to_rfc3339())
        .bind(&opp.source_venue)
        .bind(&opp.dest_venue)
        .bind(opp.from_currency.to_string())
        .bind(opp.to_currency.to_string())
        .bind(round_money(opp.source_rate).to_string())
        .bind(round_money(opp.dest_rate).to_string())
        .bind(round_money(opp.percentage).to_string())
        .execute(&self.pool)
        .await?;

        debug!(id = %opp.id, "opportunity saved");

        self.opportunity_by_id(&opp.id).await?.ok_or_else(|| {
            StorageError::InvalidData(format!("opportunity {} vanished after save", opp.id))
        })
    }

    async fn opportunity_by_id(
        &self,
        id: &str,
    ) -> Result<Option<ArbOpportunity>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT id, created_at, source_venue, dest_venue, from_currency,
                to_currency, source_rate, dest_rate, percentage
            FROM arb_opportunity WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(parse_opportunity_row).transpose()
    }

    async fn save_order(&self, order: &ExchangeOrder) -> Result<ExchangeOrder, StorageError> {
        sqlx::query(
            r#"
            INSERT INTO exchange_order (
                id, created_at, status, venue, source_currency, dest_currency,
                venue_tx_id, arb_opportunity_id, source_amount, dest_amount,
                rate, fees, fees_currency, achieved_source_amount,
                achieved_dest_amount, achieved_rate
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                venue_tx_id = excluded.venue_tx_id,
                arb_opportunity_id = excluded.arb_opportunity_id,
                source_amount = excluded.source_amount,
                dest_amount = excluded.dest_amount,
                rate = excluded.rate,
                fees = excluded.fees,
                fees_currency = excluded.fees_currency,
                achieved_source_amount = excluded.achieved_source_amount,
                achieved_dest_amount = excluded.achieved_dest_amount,
                achieved_rate = excluded.achieved_rate
            "#,
        )
        .bind(&order.id)
        .bind(order.created_at.to_rfc3339())
        .bind(order.status.to_string())
        .bind(&order.venue)
        .bind(order.source_currency.to_string())
        .bind(order.dest_currency.to_string())
        .bind(&order.venue_tx_id)
        .bind(&order.arb_opportunity_id)
        .bind(order.source_amount.map(|d| round_money(d).to_string()))
        .bind(order.dest_amount.map(|d| round_money(d).to_string()))
        .bind(order.rate.map(|d| round_money(d).to_string()))
        .bind(order.fees.map(|d| round_money(d).to_string()))
        .bind(order.fees_currency.map(|c| c.to_string()))
        .bind(order.achieved_source_amount.map(|d| round_money(d).to_string()))
        .bind(order.achieved_dest_amount.map(|d| round_money(d).to_string()))
        .bind(order.achieved_rate.map(|d| round_money(d).to_string()))
        .execute(&self.pool)
        .await?;

        debug!(id = %order.id, status = %order.status, "order saved");

        self.order_by_id(&order.id).await?.ok_or_else(|| {
            StorageError::InvalidData(format!("order {} vanished after save", order.id))
        })
    }

    async fn order_by_id(&self, id: &str) -> Result<Option<ExchangeOrder>, StorageError> {
        let row = sqlx::query("SELECT * FROM exchange_order WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(parse_order_row).transpose()
    }

    async fn orders_by_status(
        &self,
        status: OrderStatus,
    ) -> Result<Vec<ExchangeOrder>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM exchange_order WHERE status = ? ORDER BY created_at",
        )
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await?;

        self.load_order_rows(rows).await
    }

    async fn orders_by_opportunity(
        &self,
        id: &str,
    ) -> Result<Vec<ExchangeOrder>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM exchange_order WHERE arb_opportunity_id = ? ORDER BY created_at",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        self.load_order_rows(rows).await
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

fn parse_datetime(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, StorageError> {
    let s: String = row.try_get(column)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e)))
}

fn parse_decimal(row: &SqliteRow, column: &str) -> Result<Decimal, StorageError> {
    let s: String = row.try_get(column)?;
    Decimal::from_str(&s)
        .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e)))
}

fn parse_opt_decimal(row: &SqliteRow, column: &str) -> Result<Option<Decimal>, StorageError> {
    let s: Option<String> = row.try_get(column)?;
    s.map(|s| {
        Decimal::from_str(&s)
            .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e)))
    })
    .transpose()
}

fn parse_currency(row: &SqliteRow, column: &str) -> Result<Currency, StorageError> {
    let s: String = row.try_get(column)?;
    Currency::from_str(&s).map_err(StorageError::InvalidData)
}

/// Parses an opportunity from a database row.
fn parse_opportunity_row(row: &SqliteRow) -> Result<ArbOpportunity, StorageError> {
    Ok(ArbOpportunity {
        id: row.try_get("id")?,
        created_at: parse_datetime(row, "created_at")?,
        source_venue: row.try_get("source_venue")?,
        dest_venue: row.try_get("dest_venue")?,
        from_currency: parse_currency(row, "from_currency")?,
        to_currency: parse_currency(row, "to_currency")?,
        source_rate: parse_decimal(row, "source_rate")?,
        dest_rate: parse_decimal(row, "dest_rate")?,
        percentage: parse_decimal(row, "percentage")?,
    })
}

/// Parses an order from a database row.
fn parse_order_row(row: &SqliteRow) -> Result<ExchangeOrder, StorageError> {
    let status_str: String = row.try_get("status")?;
    let status = OrderStatus::from_str(&status_str).map_err(StorageError::InvalidData)?;

    let fees_currency: Option<String> = row.try_get("fees_currency")?;
    let fees_currency = fees_currency
        .map(|s| Currency::from_str(&s).map_err(StorageError::InvalidData))
        .transpose()?;

    Ok(ExchangeOrder {
        id: row.try_get("id")?,
        created_at: parse_datetime(row, "created_at")?,
        status,
        venue: row.try_get("venue")?,
        source_currency: parse_currency(row, "source_currency")?,
        dest_currency: parse_currency(row, "dest_currency")?,
        venue_tx_id: row.try_get("venue_tx_id")?,
        arb_opportunity_id: row.try_get("arb_opportunity_id")?,
        source_amount: parse_opt_decimal(row, "source_amount")?,
        dest_amount: parse_opt_decimal(row, "dest_amount")?,
        rate: parse_opt_decimal(row, "rate")?,
        fees: parse_opt_decimal(row, "fees")?,
        fees_currency,
        achieved_source_amount: parse_opt_decimal(row, "achieved_source_amount")?,
        achieved_dest_amount: parse_opt_decimal(row, "achieved_dest_amount")?,
        achieved_rate: parse_opt_decimal(row, "achieved_rate")?,
    })
}

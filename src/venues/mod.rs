//! Venue connector abstraction and per-venue implementations.

mod coinbase;
mod kraken;

#[cfg(test)]
pub mod mock;

pub use coinbase::CoinbaseVenue;
pub use kraken::KrakenVenue;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::domain::{Currency, ExchangeOrder, ExchangeRate, TradePair};

/// Venue errors.
#[derive(Debug, Error)]
pub enum VenueError {
    /// Trading pair is not supported by this venue.
    #[error("pair {0} is not supported")]
    PairNotSupported(String),

    /// Currency is unknown to this venue.
    #[error("currency {0} is not supported")]
    CurrencyNotSupported(Currency),

    /// Venue rejected an order or withdrawal.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Venue reported an order status this code does not recognize.
    #[error("unrecognized order status: {0}")]
    UnknownStatus(String),

    /// External call exceeded its bound.
    #[error("venue call timed out after {0:?}")]
    Timeout(Duration),

    /// No connector is registered under this id.
    #[error("unknown venue: {0}")]
    UnknownVenue(String),

    /// Transport-level failure.
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Malformed response body.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success API response.
    #[error("API error: {0}")]
    Api(String),
}

/// Result type for venue operations.
pub type Result<T> = std::result::Result<T, VenueError>;

/// VenueConnector abstracts one exchange: quoting, balances, order
/// placement and status, withdrawal.
#[async_trait]
pub trait VenueConnector: Send + Sync {
    /// Unique venue id (e.g. "kraken").
    fn name(&self) -> &str;

    /// Fetches the top-of-book quote for a trade direction. The returned
    /// reverse rate is quoted by the venue, never derived by inversion.
    async fn rate(&self, pair: TradePair) -> Result<ExchangeRate>;

    /// Trade directions this venue can execute.
    fn supported_directions(&self) -> Vec<TradePair>;

    /// Deposit address for inbound transfers of a currency.
    fn deposit_address(&self, currency: Currency) -> Result<String>;

    /// Symbolic withdrawal key for venues that withdraw by named key
    /// rather than address. None means withdrawal uses the address.
    fn withdrawal_key(&self, _counterparty: &str, _currency: Currency) -> Option<String> {
        None
    }

    /// Available balance for every currency the venue reports.
    async fn balances(&self) -> Result<HashMap<Currency, Decimal>>;

    /// Available balance of one currency; fails if the venue does not
    /// know the currency.
    async fn balance(&self, currency: Currency) -> Result<Decimal>;

    /// Places a market order spending `quantity` of `pair.from`.
    /// Returns a PLACED order carrying the venue transaction id.
    async fn place_order(
        &self,
        pair: TradePair,
        quantity: Decimal,
        rate: Decimal,
    ) -> Result<ExchangeOrder>;

    /// Polls the venue for the current state of a placed order and
    /// returns an updated copy (status, fees, achieved amounts). An
    /// unrecognized venue-reported status is a hard error.
    async fn order_status(&self, order: &ExchangeOrder) -> Result<ExchangeOrder>;

    /// Withdraws `quantity` of `currency` to `destination`.
    async fn transfer(&self, currency: Currency, quantity: Decimal, destination: &str)
        -> Result<()>;
}

/// Builds connectors for every enabled venue in the config.
///
/// Venue ids are matched explicitly; an unknown id is a hard error.
pub fn from_config(config: &Config) -> Result<HashMap<String, Arc<dyn VenueConnector>>> {
    let mut venues: HashMap<String, Arc<dyn VenueConnector>> = HashMap::new();

    for name in config.enabled_venues() {
        let venue_config = config.venues[&name].clone();
        let venue: Arc<dyn VenueConnector> = match name.as_str() {
            kraken::VENUE_ID => Arc::new(KrakenVenue::new(venue_config)),
            coinbase::VENUE_ID => Arc::new(CoinbaseVenue::new(venue_config)),
            _ => return Err(VenueError::UnknownVenue(name)),
        };
        info!(venue = %name, "venue connector registered");
        venues.insert(name, venue);
    }

    Ok(venues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ArbitrageConfig, VenueConfig};

    fn config_with_venues(names: &[&str]) -> Config {
        Config {
            app: AppConfig {
                name: "test".to_string(),
                env: "development".to_string(),
                log_level: None,
            },
            venues: names
                .iter()
                .map(|n| {
                    (
                        n.to_string(),
                        VenueConfig {
                            enabled: true,
                            ..VenueConfig::default()
                        },
                    )
                })
                .collect(),
            pairs: vec!["ETH/BTC".to_string()],
            arbitrage: ArbitrageConfig {
                min_execution_percentage: Decimal::ONE,
                scan_interval: Duration::ZERO,
                reconcile_interval: Duration::ZERO,
                request_timeout: Duration::ZERO,
                minimum_balances: HashMap::new(),
                max_trade_sizes: HashMap::new(),
            },
            storage: None,
        }
    }

    #[test]
    fn test_from_config_registers_known_venues() {
        let venues = from_config(&config_with_venues(&["kraken", "coinbase"])).unwrap();
        assert_eq!(venues.len(), 2);
        assert_eq!(venues["kraken"].name(), "kraken");
        assert_eq!(venues["coinbase"].name(), "coinbase");
    }

    #[test]
    fn test_from_config_rejects_unknown_venue_id() {
        let result = from_config(&config_with_venues(&["kraken", "mtgox"]));
        assert!(matches!(result, Err(VenueError::UnknownVenue(name)) if name == "mtgox"));
    }
}

//! Coinbase venue connector (GDAX API).

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client as HttpClient;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::{debug, error};

use crate::config::VenueConfig;
use crate::domain::{Currency, ExchangeOrder, ExchangeRate, OrderStatus, TradePair};
use crate::venues::{Result, VenueConnector, VenueError};

pub const VENUE_ID: &str = "coinbase";

const BASE_URL: &str = "https://api.gdax.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Products this connector trades, as BASE-QUOTE ids.
const PRODUCTS: [&str; 4] = ["BTC-USD", "ETH-USD", "ETH-BTC", "LTC-BTC"];

#[derive(Debug, Deserialize)]
struct Ticker {
    bid: String,
    ask: String,
    volume: String,
}

#[derive(Debug, Deserialize)]
struct Account {
    currency: String,
    available: String,
}

#[derive(Debug, Deserialize)]
struct PlacedOrder {
    id: String,
}

#[derive(Debug, Deserialize)]
struct OrderInfo {
    status: String,
    product_id: String,
    fill_fees: String,
    filled_size: String,
    executed_value: String,
    specified_funds: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Coinbase venue connector.
pub struct CoinbaseVenue {
    config: VenueConfig,
    http: HttpClient,
}

impl CoinbaseVenue {
    pub fn new(config: VenueConfig) -> Self {
        let http = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build http client");

        Self { config, http }
    }

    fn product_for_pair(pair: TradePair) -> Result<&'static str> {
        PRODUCTS
            .iter()
            .find(|p| {
                **p == format!("{}-{}", pair.from, pair.to)
                    || **p == format!("{}-{}", pair.to, pair.from)
            })
            .copied()
            .ok_or_else(|| VenueError::PairNotSupported(pair.to_string()))
    }

    /// True when the pair spends the product's base asset, i.e. the
    /// order is a sell on that product.
    fn same_direction_as_product(pair: TradePair) -> Result<bool> {
        for product in PRODUCTS {
            if product == format!("{}-{}", pair.from, pair.to) {
                return Ok(true);
            }
            if product == format!("{}-{}", pair.to, pair.from) {
                return Ok(false);
            }
        }
        Err(VenueError::PairNotSupported(pair.to_string()))
    }

    fn pair_for_product(product: &str) -> Result<TradePair> {
        let (base, quote) = product
            .split_once('-')
            .ok_or_else(|| VenueError::Api(format!("malformed product id: {}", product)))?;
        let from = Currency::from_str(base).map_err(VenueError::Api)?;
        let to = Currency::from_str(quote).map_err(VenueError::Api)?;
        Ok(TradePair::new(from, to))
    }

    /// CB-ACCESS-SIGN = HMAC-SHA256(base64-decoded secret,
    ///     timestamp + method + path + body).
    fn sign(&self, timestamp: i64, method: &str, path: &str, body: &str) -> Result<String> {
        let secret = base64::engine::general_purpose::STANDARD
            .decode(&self.config.api_secret)
            .map_err(|e| VenueError::Api(format!("invalid api secret: {}", e)))?;

        let mut mac = Hmac::<Sha256>::new_from_slice(&secret)
            .map_err(|e| VenueError::Api(format!("invalid hmac key: {}", e)))?;
        mac.update(format!("{}{}{}{}", timestamp, method, path, body).as_bytes());

        Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }

    async fn public_request<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{}", BASE_URL, path))
            .header("User-Agent", "crossarb")
            .send()
            .await?;
        Self::parse_response(path, response).await
    }

    async fn private_request<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let body_text = match body {
            Some(ref value) => value.to_string(),
            None => String::new(),
        };
        let timestamp = Utc::now().timestamp();
        let signature = self.sign(timestamp, method.as_str(), path, &body_text)?;

        debug!(path = %path, "coinbase private request");

        let mut request = self
            .http
            .request(method, format!("{}{}", BASE_URL, path))
            .header("User-Agent", "crossarb")
            .header("CB-ACCESS-KEY", &self.config.api_key)
            .header("CB-ACCESS-SIGN", signature)
            .header("CB-ACCESS-TIMESTAMP", timestamp.to_string())
            .header(
                "CB-ACCESS-PASSPHRASE",
                self.config.passphrase.as_deref().unwrap_or_default(),
            );
        if !body_text.is_empty() {
            request = request
                .header("Content-Type", "application/json")
                .body(body_text);
        }

        let response = request.send().await?;
        Self::parse_response(path, response).await
    }

    async fn parse_response<T: for<'de> Deserialize<'de>>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ApiError>(&body)
                .map(|e| e.message)
                .unwrap_or_else(|_| format!("coinbase returned {}", status));
            error!(status = %status, path = %path, message = %message, "coinbase request failed");
            return Err(VenueError::Rejected(message));
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

/// Formats an amount for the wire: 8 fractional digits, rounded down.
fn format_amount(amount: Decimal) -> String {
    amount
        .round_dp_with_strategy(8, RoundingStrategy::ToZero)
        .to_string()
}

fn parse_decimal(s: &str, field: &str) -> Result<Decimal> {
    Decimal::from_str(s).map_err(|e| VenueError::Api(format!("invalid {}: {}", field, e)))
}

/// A zero bid means a dead market; inverting it would divide by zero.
fn invert_bid(bid: Decimal, product: &str) -> Result<Decimal> {
    Decimal::ONE
        .checked_div(bid)
        .ok_or_else(|| VenueError::Api(format!("zero bid for {}", product)))
}

#[async_trait]
impl VenueConnector for CoinbaseVenue {
    fn name(&self) -> &str {
        VENUE_ID
    }

    async fn rate(&self, pair: TradePair) -> Result<ExchangeRate> {
        let product = Self::product_for_pair(pair)?;
        let ticker: Ticker = self
            .public_request(&format!("/products/{}/ticker", product))
            .await?;

        let ask = parse_decimal(&ticker.ask, "ask")?;
        let bid = parse_decimal(&ticker.bid, "bid")?;
        let volume = parse_decimal(&ticker.volume, "volume")?;
        let inverse_bid = invert_bid(bid, product)?;

        let (rate, reverse_rate) = if Self::same_direction_as_product(pair)? {
            (inverse_bid, ask)
        } else {
            (ask, inverse_bid)
        };

        Ok(ExchangeRate {
            timestamp: Utc::now(),
            venue: VENUE_ID.to_string(),
            pair,
            rate,
            reverse_rate,
            volume,
        })
    }

    fn supported_directions(&self) -> Vec<TradePair> {
        vec![TradePair::new(Currency::ETH, Currency::BTC)]
    }

    fn deposit_address(&self, currency: Currency) -> Result<String> {
        self.config
            .deposit_addresses
            .get(&currency)
            .cloned()
            .ok_or(VenueError::CurrencyNotSupported(currency))
    }

    async fn balances(&self) -> Result<HashMap<Currency, Decimal>> {
        let accounts: Vec<Account> = self
            .private_request(reqwest::Method::GET, "/accounts", None)
            .await?;

        let mut balances = HashMap::new();
        for account in accounts {
            let Ok(currency) = Currency::from_str(&account.currency) else {
                continue;
            };
            balances.insert(currency, parse_decimal(&account.available, "available")?);
        }
        Ok(balances)
    }

    async fn balance(&self, currency: Currency) -> Result<Decimal> {
        let balances = self.balances().await?;
        balances
            .get(&currency)
            .copied()
            .ok_or(VenueError::CurrencyNotSupported(currency))
    }

    async fn place_order(
        &self,
        pair: TradePair,
        quantity: Decimal,
        _rate: Decimal,
    ) -> Result<ExchangeOrder> {
        let product = Self::product_for_pair(pair)?;
        let selling = Self::same_direction_as_product(pair)?;

        // A sell spends the base asset, sized by `size`; a buy spends the
        // quote asset, sized by `funds`.
        let body = if selling {
            json!({
                "type": "market",
                "product_id": product,
                "side": "sell",
                "size": format_amount(quantity),
            })
        } else {
            json!({
                "type": "market",
                "product_id": product,
                "side": "buy",
                "funds": format_amount(quantity),
            })
        };

        let placed: PlacedOrder = self
            .private_request(reqwest::Method::POST, "/orders", Some(body))
            .await?;

        let mut order = ExchangeOrder::create(VENUE_ID, pair);
        order
            .transition_to(OrderStatus::Placed)
            .map_err(VenueError::Api)?;
        order.venue_tx_id = Some(placed.id);
        Ok(order)
    }

    async fn order_status(&self, order: &ExchangeOrder) -> Result<ExchangeOrder> {
        let txid = order
            .venue_tx_id
            .clone()
            .ok_or_else(|| VenueError::Api("order has no venue transaction id".to_string()))?;

        let info: OrderInfo = self
            .private_request(reqwest::Method::GET, &format!("/orders/{}", txid), None)
            .await?;

        let mut updated = order.clone();
        match info.status.as_str() {
            "open" | "pending" | "active" => {}
            "done" => {
                updated
                    .transition_to(OrderStatus::Filled)
                    .map_err(VenueError::Api)?;
                updated.fees = Some(parse_decimal(&info.fill_fees, "fill_fees")?);
                // Fees settle in the product's quote currency.
                updated.fees_currency = Some(Self::pair_for_product(&info.product_id)?.to);

                let (achieved_source, achieved_dest) = if let Some(ref funds) =
                    info.specified_funds
                {
                    // Buy sized by funds: quote spent, base received.
                    (
                        parse_decimal(funds, "specified_funds")?,
                        parse_decimal(&info.filled_size, "filled_size")?,
                    )
                } else if info.size.is_some() {
                    // Sell sized by size: base spent, quote received.
                    (
                        parse_decimal(&info.filled_size, "filled_size")?,
                        parse_decimal(&info.executed_value, "executed_value")?,
                    )
                } else {
                    return Err(VenueError::Api(
                        "order reports neither funds nor size".to_string(),
                    ));
                };
                updated.achieved_source_amount = Some(achieved_source);
                updated.achieved_dest_amount = Some(achieved_dest);
                updated.achieved_rate = achieved_source.checked_div(achieved_dest);
            }
            other => {
                error!(status = %other, "unrecognized coinbase order status");
                return Err(VenueError::UnknownStatus(other.to_string()));
            }
        }

        Ok(updated)
    }

    async fn transfer(
        &self,
        currency: Currency,
        quantity: Decimal,
        destination: &str,
    ) -> Result<()> {
        let body = json!({
            "amount": format_amount(quantity),
            "currency": currency.to_string(),
            "crypto_address": destination,
        });
        let _: serde_json::Value = self
            .private_request(reqwest::Method::POST, "/withdrawals/crypto", Some(body))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_lookup_handles_both_orientations() {
        let pair = TradePair::new(Currency::ETH, Currency::BTC);
        assert_eq!(CoinbaseVenue::product_for_pair(pair).unwrap(), "ETH-BTC");
        assert_eq!(
            CoinbaseVenue::product_for_pair(pair.reverse()).unwrap(),
            "ETH-BTC"
        );

        assert!(CoinbaseVenue::same_direction_as_product(pair).unwrap());
        assert!(!CoinbaseVenue::same_direction_as_product(pair.reverse()).unwrap());
    }

    #[test]
    fn test_unsupported_pair_is_rejected() {
        let pair = TradePair::new(Currency::USD, Currency::LTC);
        assert!(matches!(
            CoinbaseVenue::product_for_pair(pair),
            Err(VenueError::PairNotSupported(_))
        ));
    }

    #[test]
    fn test_pair_for_product_parses_base_and_quote() {
        let pair = CoinbaseVenue::pair_for_product("ETH-BTC").unwrap();
        assert_eq!(pair, TradePair::new(Currency::ETH, Currency::BTC));
        assert!(CoinbaseVenue::pair_for_product("ETHBTC").is_err());
    }

    #[test]
    fn test_zero_bid_is_rejected_instead_of_inverted() {
        assert!(matches!(
            invert_bid(Decimal::ZERO, "ETH-BTC"),
            Err(VenueError::Api(_))
        ));
        assert_eq!(
            invert_bid(Decimal::from(4), "ETH-BTC").unwrap(),
            Decimal::from_str("0.25").unwrap()
        );
    }

    #[test]
    fn test_no_withdrawal_key() {
        let venue = CoinbaseVenue::new(VenueConfig::default());
        assert_eq!(venue.withdrawal_key("kraken", Currency::BTC), None);
    }
}

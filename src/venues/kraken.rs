//! Kraken venue connector.

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
use sha2::{Digest, Sha256, Sha512};
use tracing::{debug, error, warn};

use crate::config::VenueConfig;
use crate::domain::{Currency, ExchangeOrder, ExchangeRate, OrderStatus, TradePair};
use crate::venues::{Result, VenueConnector, VenueError};

pub const VENUE_ID: &str = "kraken";

const BASE_URL: &str = "https://api.kraken.com";

/// HTTP request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Products this connector trades, in Kraken's asset-sign notation.
const PRODUCTS: [&str; 5] = ["XETHXXBT", "XETHZUSD", "XXBTZUSD", "XLTCXXBT", "XLTCZUSD"];

/// Kraken envelope: every response carries an error array and a result.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    error: Vec<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Ticker {
    /// Ask price and lot volume.
    a: Vec<String>,
    /// Bid price and lot volume.
    b: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PlacedOrder {
    txid: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OrderInfo {
    status: String,
    vol_exec: String,
    cost: String,
    fee: String,
}

/// Kraken venue connector.
pub struct KrakenVenue {
    config: VenueConfig,
    http: HttpClient,
}

impl KrakenVenue {
    pub fn new(config: VenueConfig) -> Self {
        let http = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build http client");

        Self { config, http }
    }

    fn currency_sign(currency: Currency) -> &'static str {
        match currency {
            Currency::BTC => "XXBT",
            Currency::ETH => "XETH",
            Currency::USD => "ZUSD",
            Currency::LTC => "XLTC",
        }
    }

    fn currency_from_sign(sign: &str) -> Option<Currency> {
        match sign {
            "XXBT" => Some(Currency::BTC),
            "XETH" => Some(Currency::ETH),
            "ZUSD" => Some(Currency::USD),
            "XLTC" => Some(Currency::LTC),
            _ => None,
        }
    }

    fn product_for_pair(pair: TradePair) -> Result<&'static str> {
        let from = Self::currency_sign(pair.from);
        let to = Self::currency_sign(pair.to);
        PRODUCTS
            .iter()
            .find(|p| **p == format!("{}{}", from, to) || **p == format!("{}{}", to, from))
            .copied()
            .ok_or_else(|| VenueError::PairNotSupported(pair.to_string()))
    }

    /// True when the pair runs in the same direction as the product
    /// symbol, i.e. the order sells the product's base asset.
    fn same_direction_as_product(pair: TradePair) -> Result<bool> {
        let from = Self::currency_sign(pair.from);
        let to = Self::currency_sign(pair.to);
        for product in PRODUCTS {
            if product == format!("{}{}", from, to) {
                return Ok(true);
            }
            if product == format!("{}{}", to, from) {
                return Ok(false);
            }
        }
        Err(VenueError::PairNotSupported(pair.to_string()))
    }

    /// Signs a private API request.
    ///
    /// API-Sign = HMAC-SHA512(base64-decoded secret,
    ///     path + SHA256(nonce + postdata)).
    fn sign(&self, path: &str, nonce: i64, postdata: &str) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}{}", nonce, postdata).as_bytes());
        let digest = hasher.finalize();

        let secret = base64::engine::general_purpose::STANDARD
            .decode(&self.config.api_secret)
            .map_err(|e| VenueError::Api(format!("invalid api secret: {}", e)))?;

        let mut mac = Hmac::<Sha512>::new_from_slice(&secret)
            .map_err(|e| VenueError::Api(format!("invalid hmac key: {}", e)))?;
        mac.update(path.as_bytes());
        mac.update(&digest);

        Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }

    async fn public_request<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{}", BASE_URL, path))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            error!(status = %status, "kraken request failed");
            return Err(VenueError::Api(format!("kraken returned {}", status)));
        }

        parse_envelope(&body)
    }

    async fn private_request<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        mut params: Vec<(String, String)>,
    ) -> Result<T> {
        let path = format!("/0/private/{}", method);
        let nonce = Utc::now().timestamp_millis();

        let mut form = vec![("nonce".to_string(), nonce.to_string())];
        if let Some(ref otp) = self.config.otp {
            form.push(("otp".to_string(), otp.clone()));
        }
        form.append(&mut params);

        let postdata = form
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let signature = self.sign(&path, nonce, &postdata)?;

        debug!(method = %method, "kraken private request");

        let response = self
            .http
            .post(format!("{}{}", BASE_URL, path))
            .header("API-Key", &self.config.api_key)
            .header("API-Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(postdata)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            error!(status = %status, method = %method, "kraken request failed");
            return Err(VenueError::Api(format!("kraken returned {}", status)));
        }

        parse_envelope(&body)
    }
}

/// Parses the Kraken response envelope, turning a non-empty error array
/// into a rejection.
fn parse_envelope<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_slice(body)?;
    if let Some(message) = envelope.error.into_iter().next() {
        error!(message = %message, "kraken error response");
        return Err(VenueError::Rejected(message));
    }
    envelope
        .result
        .ok_or_else(|| VenueError::Api("kraken response missing result".to_string()))
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

/// Pulls bid, ask and volume out of a ticker. Short price arrays mean a
/// malformed response.
fn parse_ticker(product: &str, ticker: &Ticker) -> Result<(Decimal, Decimal, Decimal)> {
    let malformed = || VenueError::Api(format!("malformed ticker for {}", product));
    let ask = ticker.a.first().ok_or_else(malformed)?;
    let bid = ticker.b.first().ok_or_else(malformed)?;
    let volume = ticker.b.get(1).ok_or_else(malformed)?;
    Ok((
        parse_decimal(bid, "bid")?,
        parse_decimal(ask, "ask")?,
        parse_decimal(volume, "volume")?,
    ))
}

/// A zero bid means a dead market; inverting it would divide by zero.
fn invert_bid(bid: Decimal, product: &str) -> Result<Decimal> {
    Decimal::ONE
        .checked_div(bid)
        .ok_or_else(|| VenueError::Api(format!("zero bid for {}", product)))
}

#[async_trait]
impl VenueConnector for KrakenVenue {
    fn name(&self) -> &str {
        VENUE_ID
    }

    async fn rate(&self, pair: TradePair) -> Result<ExchangeRate> {
        let product = Self::product_for_pair(pair)?;
        let tickers: HashMap<String, Ticker> = self
            .public_request("/0/public/Ticker", &[("pair", product)])
            .await?;

        let ticker = tickers
            .get(product)
            .ok_or_else(|| VenueError::Api(format!("no ticker for {}", product)))?;

        let (bid, ask, volume) = parse_ticker(product, ticker)?;
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
        vec![TradePair::new(Currency::BTC, Currency::ETH)]
    }

    fn deposit_address(&self, currency: Currency) -> Result<String> {
        self.config
            .deposit_addresses
            .get(&currency)
            .cloned()
            .ok_or(VenueError::CurrencyNotSupported(currency))
    }

    /// Kraken withdraws by named key, not by address; keys are set up in
    /// the account as "{counterparty}-{currency}".
    fn withdrawal_key(&self, counterparty: &str, currency: Currency) -> Option<String> {
        Some(format!("{}-{}", counterparty, currency))
    }

    async fn balances(&self) -> Result<HashMap<Currency, Decimal>> {
        let raw: HashMap<String, String> = self.private_request("Balance", Vec::new()).await?;

        let mut balances = HashMap::new();
        for (sign, amount) in raw {
            let Some(currency) = Self::currency_from_sign(&sign) else {
                continue;
            };
            balances.insert(currency, parse_decimal(&amount, "balance")?);
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

        // A sell spends the product's base asset directly; a buy spends
        // the quote asset, so the volume is given in quote currency
        // (viqc) and fees settle in the base currency (fcib).
        let oflags = if selling { "fciq" } else { "fcib,viqc" };

        let params = vec![
            ("ordertype".to_string(), "market".to_string()),
            ("pair".to_string(), product.to_string()),
            (
                "type".to_string(),
                if selling { "sell" } else { "buy" }.to_string(),
            ),
            ("volume".to_string(), format_amount(quantity)),
            ("oflags".to_string(), oflags.to_string()),
        ];

        let placed: PlacedOrder = self.private_request("AddOrder", params).await?;

        let txids = placed
            .txid
            .ok_or_else(|| VenueError::Rejected("no txid in AddOrder response".to_string()))?;
        if txids.len() > 1 {
            warn!(count = txids.len(), "kraken returned multiple transaction ids");
        }
        let txid = txids
            .into_iter()
            .next()
            .ok_or_else(|| VenueError::Rejected("empty txid list".to_string()))?;

        let mut order = ExchangeOrder::create(VENUE_ID, pair);
        order
            .transition_to(OrderStatus::Placed)
            .map_err(VenueError::Api)?;
        order.venue_tx_id = Some(txid);
        Ok(order)
    }

    async fn order_status(&self, order: &ExchangeOrder) -> Result<ExchangeOrder> {
        let txid = order
            .venue_tx_id
            .clone()
            .ok_or_else(|| VenueError::Api("order has no venue transaction id".to_string()))?;

        let params = vec![
            ("trades".to_string(), "true".to_string()),
            ("txid".to_string(), txid.clone()),
        ];
        let infos: HashMap<String, OrderInfo> =
            self.private_request("QueryOrders", params).await?;

        let info = infos
            .get(&txid)
            .ok_or_else(|| VenueError::Api(format!("no order info for {}", txid)))?;

        let mut updated = order.clone();
        match info.status.as_str() {
            "pending" | "open" => {}
            "closed" => {
                updated
                    .transition_to(OrderStatus::Filled)
                    .map_err(VenueError::Api)?;
                updated.fees = Some(parse_decimal(&info.fee, "fee")?);
                updated.fees_currency = Some(order.dest_currency);
                let achieved_source = parse_decimal(&info.vol_exec, "vol_exec")?;
                let achieved_dest = parse_decimal(&info.cost, "cost")?;
                updated.achieved_source_amount = Some(achieved_source);
                updated.achieved_dest_amount = Some(achieved_dest);
                updated.achieved_rate = achieved_source.checked_div(achieved_dest);
            }
            "canceled" => {
                updated
                    .transition_to(OrderStatus::Cancelled)
                    .map_err(VenueError::Api)?;
            }
            "expired" => {
                updated
                    .transition_to(OrderStatus::Failed)
                    .map_err(VenueError::Api)?;
            }
            other => {
                error!(status = %other, "unrecognized kraken order status");
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
        let params = vec![
            ("asset".to_string(), Self::currency_sign(currency).to_string()),
            ("key".to_string(), destination.to_string()),
            ("amount".to_string(), format_amount(quantity)),
        ];
        let _: serde_json::Value = self.private_request("Withdraw", params).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_lookup_handles_both_orientations() {
        let pair = TradePair::new(Currency::ETH, Currency::BTC);
        assert_eq!(KrakenVenue::product_for_pair(pair).unwrap(), "XETHXXBT");
        assert_eq!(
            KrakenVenue::product_for_pair(pair.reverse()).unwrap(),
            "XETHXXBT"
        );

        assert!(KrakenVenue::same_direction_as_product(pair).unwrap());
        assert!(!KrakenVenue::same_direction_as_product(pair.reverse()).unwrap());
    }

    #[test]
    fn test_unsupported_pair_is_rejected() {
        let pair = TradePair::new(Currency::USD, Currency::LTC);
        assert!(matches!(
            KrakenVenue::product_for_pair(pair),
            Err(VenueError::PairNotSupported(_))
        ));
    }

    #[test]
    fn test_withdrawal_key_names_counterparty_and_currency() {
        let venue = KrakenVenue::new(VenueConfig::default());
        assert_eq!(
            venue.withdrawal_key("coinbase", Currency::BTC),
            Some("coinbase-BTC".to_string())
        );
    }

    #[test]
    fn test_format_amount_rounds_down_to_eight_digits() {
        let amount = Decimal::from_str("0.123456789999").unwrap();
        assert_eq!(format_amount(amount), "0.12345678");
    }

    #[test]
    fn test_short_ticker_arrays_are_rejected() {
        let empty = Ticker {
            a: vec![],
            b: vec![],
        };
        assert!(matches!(
            parse_ticker("XETHXXBT", &empty),
            Err(VenueError::Api(_))
        ));

        // Bid present but volume missing.
        let short = Ticker {
            a: vec!["0.041".to_string()],
            b: vec!["0.040".to_string()],
        };
        assert!(matches!(
            parse_ticker("XETHXXBT", &short),
            Err(VenueError::Api(_))
        ));
    }

    #[test]
    fn test_zero_bid_is_rejected_instead_of_inverted() {
        assert!(matches!(
            invert_bid(Decimal::ZERO, "XETHXXBT"),
            Err(VenueError::Api(_))
        ));
        assert_eq!(
            invert_bid(Decimal::from(4), "XETHXXBT").unwrap(),
            Decimal::from_str("0.25").unwrap()
        );
    }

    #[test]
    fn test_envelope_error_becomes_rejection() {
        let body = br#"{"error":["EGeneral:Invalid arguments"]}"#;
        let result: Result<serde_json::Value> = parse_envelope(body);
        assert!(matches!(result, Err(VenueError::Rejected(m)) if m.contains("Invalid arguments")));
    }
}

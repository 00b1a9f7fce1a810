//! Configurable mock venue for coordinator and engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::domain::{Currency, ExchangeOrder, ExchangeRate, OrderStatus, TradePair};
use crate::venues::{Result, VenueConnector, VenueError};

/// One recorded `place_order` call.
#[derive(Debug, Clone)]
pub struct PlacedCall {
    pub pair: TradePair,
    pub quantity: Decimal,
    pub rate: Decimal,
}

/// One recorded `transfer` call.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferCall {
    pub currency: Currency,
    pub quantity: Decimal,
    pub destination: String,
}

/// MockVenue is driven entirely by test setup: quotes, balances and
/// canned order statuses are set explicitly, and every order or
/// withdrawal it receives is recorded.
pub struct MockVenue {
    name: String,
    directions: Mutex<Vec<TradePair>>,
    rates: Mutex<HashMap<TradePair, (Decimal, Decimal)>>,
    balances: Mutex<HashMap<Currency, Decimal>>,
    deposit_addresses: Mutex<HashMap<Currency, String>>,
    use_withdrawal_keys: Mutex<bool>,
    status_results: Mutex<HashMap<String, ExchangeOrder>>,
    placed: Mutex<Vec<PlacedCall>>,
    transfers: Mutex<Vec<TransferCall>>,
    fail_rates: Mutex<bool>,
    fail_place_order: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
    tx_counter: AtomicUsize,
}

impl MockVenue {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            directions: Mutex::new(Vec::new()),
            rates: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            deposit_addresses: Mutex::new(HashMap::new()),
            use_withdrawal_keys: Mutex::new(false),
            status_results: Mutex::new(HashMap::new()),
            placed: Mutex::new(Vec::new()),
            transfers: Mutex::new(Vec::new()),
            fail_rates: Mutex::new(false),
            fail_place_order: Mutex::new(false),
            delay: Mutex::new(None),
            tx_counter: AtomicUsize::new(0),
        }
    }

    pub fn add_direction(&self, pair: TradePair) {
        self.directions.lock().unwrap().push(pair);
    }

    pub fn set_rate(&self, pair: TradePair, rate: Decimal, reverse_rate: Decimal) {
        self.rates.lock().unwrap().insert(pair, (rate, reverse_rate));
    }

    pub fn set_balance(&self, currency: Currency, amount: Decimal) {
        self.balances.lock().unwrap().insert(currency, amount);
    }

    pub fn set_deposit_address(&self, currency: Currency, address: &str) {
        self.deposit_addresses
            .lock()
            .unwrap()
            .insert(currency, address.to_string());
    }

    /// Makes this venue withdraw by named key like Kraken does.
    pub fn enable_withdrawal_keys(&self) {
        *self.use_withdrawal_keys.lock().unwrap() = true;
    }

    /// Cans the order `order_status` will return for a transaction id.
    pub fn set_status_result(&self, venue_tx_id: &str, order: ExchangeOrder) {
        self.status_results
            .lock()
            .unwrap()
            .insert(venue_tx_id.to_string(), order);
    }

    pub fn fail_rates(&self) {
        *self.fail_rates.lock().unwrap() = true;
    }

    pub fn fail_place_order(&self) {
        *self.fail_place_order.lock().unwrap() = true;
    }

    /// Delays every async call, for exercising timeout bounds.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn placed_orders(&self) -> Vec<PlacedCall> {
        self.placed.lock().unwrap().clone()
    }

    pub fn recorded_transfers(&self) -> Vec<TransferCall> {
        self.transfers.lock().unwrap().clone()
    }

    async fn maybe_delay(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl VenueConnector for MockVenue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn rate(&self, pair: TradePair) -> Result<ExchangeRate> {
        self.maybe_delay().await;
        if *self.fail_rates.lock().unwrap() {
            return Err(VenueError::Api("mock rate failure".to_string()));
        }
        let rates = self.rates.lock().unwrap();
        let (rate, reverse_rate) = rates
            .get(&pair)
            .copied()
            .ok_or_else(|| VenueError::PairNotSupported(pair.to_string()))?;
        Ok(ExchangeRate {
            timestamp: Utc::now(),
            venue: self.name.clone(),
            pair,
            rate,
            reverse_rate,
            volume: Decimal::from(1000),
        })
    }

    fn supported_directions(&self) -> Vec<TradePair> {
        self.directions.lock().unwrap().clone()
    }

    fn deposit_address(&self, currency: Currency) -> Result<String> {
        self.deposit_addresses
            .lock()
            .unwrap()
            .get(&currency)
            .cloned()
            .ok_or(VenueError::CurrencyNotSupported(currency))
    }

    fn withdrawal_key(&self, counterparty: &str, currency: Currency) -> Option<String> {
        if *self.use_withdrawal_keys.lock().unwrap() {
            Some(format!("{}-{}", counterparty, currency))
        } else {
            None
        }
    }

    async fn balances(&self) -> Result<HashMap<Currency, Decimal>> {
        self.maybe_delay().await;
        Ok(self.balances.lock().unwrap().clone())
    }

    async fn balance(&self, currency: Currency) -> Result<Decimal> {
        self.maybe_delay().await;
        self.balances
            .lock()
            .unwrap()
            .get(&currency)
            .copied()
            .ok_or(VenueError::CurrencyNotSupported(currency))
    }

    async fn place_order(
        &self,
        pair: TradePair,
        quantity: Decimal,
        rate: Decimal,
    ) -> Result<ExchangeOrder> {
        self.maybe_delay().await;
        if *self.fail_place_order.lock().unwrap() {
            return Err(VenueError::Rejected("mock order rejection".to_string()));
        }
        self.placed.lock().unwrap().push(PlacedCall {
            pair,
            quantity,
            rate,
        });

        let seq = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        let mut order = ExchangeOrder::create(&self.name, pair);
        order
            .transition_to(OrderStatus::Placed)
            .map_err(VenueError::Api)?;
        order.venue_tx_id = Some(format!("{}-tx-{}", self.name, seq));
        Ok(order)
    }

    async fn order_status(&self, order: &ExchangeOrder) -> Result<ExchangeOrder> {
        self.maybe_delay().await;
        let txid = order
            .venue_tx_id
            .clone()
            .ok_or_else(|| VenueError::Api("order has no venue transaction id".to_string()))?;
        match self.status_results.lock().unwrap().get(&txid) {
            Some(canned) => Ok(canned.clone()),
            None => Ok(order.clone()),
        }
    }

    async fn transfer(
        &self,
        currency: Currency,
        quantity: Decimal,
        destination: &str,
    ) -> Result<()> {
        self.maybe_delay().await;
        self.transfers.lock().unwrap().push(TransferCall {
            currency,
            quantity,
            destination: destination.to_string(),
        });
        Ok(())
    }
}

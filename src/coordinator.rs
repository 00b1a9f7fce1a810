//! ExchangeCoordinator routes every venue interaction: quoting, order
//! placement, reconciliation of open orders, and withdrawals.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{Currency, ExchangeOrder, ExchangeRate, OrderStatus, TradePair};
use crate::events::{Event, EventBus};
use crate::storage::{Storage, StorageError};
use crate::venues::{VenueConnector, VenueError};

/// Coordinator errors.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("unknown venue: {0}")]
    UnknownVenue(String),

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct ExchangeCoordinator {
    venues: HashMap<String, Arc<dyn VenueConnector>>,
    storage: Arc<dyn Storage>,
    bus: Arc<EventBus>,
    pairs: Vec<TradePair>,
    request_timeout: Duration,
}

impl ExchangeCoordinator {
    pub fn new(
        venues: HashMap<String, Arc<dyn VenueConnector>>,
        storage: Arc<dyn Storage>,
        bus: Arc<EventBus>,
        pairs: Vec<TradePair>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            venues,
            storage,
            bus,
            pairs,
            request_timeout,
        }
    }

    pub fn venue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.venues.keys().cloned().collect();
        names.sort();
        names
    }

    fn venue(&self, name: &str) -> Result<&Arc<dyn VenueConnector>, CoordinatorError> {
        self.venues
            .get(name)
            .ok_or_else(|| CoordinatorError::UnknownVenue(name.to_string()))
    }

    /// Bounds an external call; a connector that hangs is reported as a
    /// timeout instead of stalling the cycle.
    async fn bounded<T, F>(&self, call: F) -> Result<T, VenueError>
    where
        F: Future<Output = Result<T, VenueError>>,
    {
        tokio::time::timeout(self.request_timeout, call)
            .await
            .map_err(|_| VenueError::Timeout(self.request_timeout))?
    }

    /// Fetches a quote for every configured pair on every venue. Each
    /// quote materializes two table entries: the quoted direction, and
    /// its reverse carrying the connector-supplied reverse rate.
    ///
    /// Any single connector failure aborts the whole aggregation; a scan
    /// cycle never runs on a partial rate table.
    pub async fn aggregate_rates(
        &self,
    ) -> Result<HashMap<String, HashMap<TradePair, ExchangeRate>>, CoordinatorError> {
        let mut rates: HashMap<String, HashMap<TradePair, ExchangeRate>> = HashMap::new();

        for (name, venue) in &self.venues {
            let mut venue_rates = HashMap::new();
            let mut reversed = Vec::new();
            for pair in &self.pairs {
                let quote = self.bounded(venue.rate(*pair)).await?;
                debug!(venue = %name, pair = %pair, rate = %quote.rate, "quote");
                reversed.push(ExchangeRate {
                    timestamp: quote.timestamp,
                    venue: quote.venue.clone(),
                    pair: pair.reverse(),
                    rate: quote.reverse_rate,
                    reverse_rate: quote.rate,
                    volume: quote.volume,
                });
                venue_rates.insert(*pair, quote);
            }
            // A directly quoted entry wins over one derived from a
            // reverse quote.
            for quote in reversed {
                venue_rates.entry(quote.pair).or_insert(quote);
            }
            rates.insert(name.clone(), venue_rates);
        }

        Ok(rates)
    }

    pub fn supported_directions(&self, venue: &str) -> Result<Vec<TradePair>, CoordinatorError> {
        Ok(self.venue(venue)?.supported_directions())
    }

    pub async fn balance(
        &self,
        venue: &str,
        currency: Currency,
    ) -> Result<Decimal, CoordinatorError> {
        let connector = self.venue(venue)?;
        Ok(self.bounded(connector.balance(currency)).await?)
    }

    pub fn deposit_address(
        &self,
        venue: &str,
        currency: Currency,
    ) -> Result<String, CoordinatorError> {
        Ok(self.venue(venue)?.deposit_address(currency)?)
    }

    pub fn withdrawal_key(
        &self,
        venue: &str,
        counterparty: &str,
        currency: Currency,
    ) -> Result<Option<String>, CoordinatorError> {
        Ok(self.venue(venue)?.withdrawal_key(counterparty, currency))
    }

    /// Places a market order on a venue and persists it at PLACED.
    /// Returns the stored copy.
    pub async fn place_order(
        &self,
        venue: &str,
        pair: TradePair,
        quantity: Decimal,
        rate: Decimal,
    ) -> Result<ExchangeOrder, CoordinatorError> {
        let connector = self.venue(venue)?;
        let order = self.bounded(connector.place_order(pair, quantity, rate)).await?;
        info!(
            venue = %venue,
            pair = %pair,
            quantity = %quantity,
            order_id = %order.id,
            "order placed"
        );
        Ok(self.storage.save_order(&order).await?)
    }

    /// Withdraws funds from a venue to a destination address or key.
    pub async fn transfer(
        &self,
        venue: &str,
        currency: Currency,
        quantity: Decimal,
        destination: &str,
    ) -> Result<(), CoordinatorError> {
        let connector = self.venue(venue)?;
        self.bounded(connector.transfer(currency, quantity, destination))
            .await?;
        info!(
            venue = %venue,
            currency = %currency,
            quantity = %quantity,
            destination = %destination,
            "transfer initiated"
        );
        Ok(())
    }

    /// Polls every PLACED order against its venue and persists status
    /// changes. A failure on one order keeps it PLACED and moves on to
    /// the next; an order that reaches FILLED publishes `OrderFilled`
    /// exactly once, on the poll that observed the transition.
    pub async fn reconcile_open_orders(&self) -> Result<(), CoordinatorError> {
        let open = self.storage.orders_by_status(OrderStatus::Placed).await?;
        debug!(count = open.len(), "reconciling open orders");

        for order in open {
            if let Err(e) = self.reconcile_order(&order).await {
                warn!(order_id = %order.id, error = %e, "order reconciliation failed");
            }
        }

        Ok(())
    }

    async fn reconcile_order(&self, order: &ExchangeOrder) -> Result<(), CoordinatorError> {
        let connector = self.venue(&order.venue)?;
        let updated = self.bounded(connector.order_status(order)).await?;

        if updated.status == order.status {
            return Ok(());
        }
        if !order.status.can_transition_to(updated.status) {
            return Err(CoordinatorError::Venue(VenueError::Api(format!(
                "illegal order status transition {} -> {}",
                order.status, updated.status
            ))));
        }

        let stored = self.storage.save_order(&updated).await?;
        info!(
            order_id = %stored.id,
            venue = %stored.venue,
            status = %stored.status,
            "order status changed"
        );

        if stored.status == OrderStatus::Filled {
            self.bus.publish(Event::OrderFilled(stored)).await;
        }
        Ok(())
    }
}

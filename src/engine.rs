//! ArbitrageEngine: scans venue quotes for profitable round trips,
//! executes both legs, and settles filled legs by moving funds back to
//! the paired venue.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ArbitrageConfig;
use crate::coordinator::{CoordinatorError, ExchangeCoordinator};
use crate::domain::{ArbOpportunity, Currency, ExchangeOrder, ExchangeRate, OrderStatus, TradePair};
use crate::events::{Event, EventBus};
use crate::ids;
use crate::storage::{Storage, StorageError};

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct ArbitrageEngine {
    coordinator: Arc<ExchangeCoordinator>,
    storage: Arc<dyn Storage>,
    bus: Arc<EventBus>,
    config: ArbitrageConfig,
    /// Serializes the place-both-legs critical section within this
    /// process. The persisted PLACED guard below is kept as well; it is
    /// what survives a restart.
    execution_lock: Mutex<()>,
}

impl ArbitrageEngine {
    pub fn new(
        coordinator: Arc<ExchangeCoordinator>,
        storage: Arc<dyn Storage>,
        bus: Arc<EventBus>,
        config: ArbitrageConfig,
    ) -> Self {
        Self {
            coordinator,
            storage,
            bus,
            config,
            execution_lock: Mutex::new(()),
        }
    }

    /// One scan cycle: aggregate quotes, detect profitable round trips,
    /// persist and announce each.
    pub async fn scan(&self) -> Result<(), EngineError> {
        let rates = self.coordinator.aggregate_rates().await?;
        let opportunities = self.find_opportunities(&rates)?;

        for opportunity in opportunities {
            let stored = self.storage.save_opportunity(&opportunity).await?;
            self.bus.publish(Event::OpportunityDetected(stored)).await;
        }
        Ok(())
    }

    /// Detects round trips whose spread meets the execution threshold.
    ///
    /// Venue pairs are enumerated unordered (each {A, B} once); for each
    /// pair, a direction is a candidate when the source venue supports it
    /// and the dest venue supports its reverse. Every candidate is
    /// logged; only those at or above the threshold are returned.
    pub fn find_opportunities(
        &self,
        rates: &HashMap<String, HashMap<TradePair, ExchangeRate>>,
    ) -> Result<Vec<ArbOpportunity>, EngineError> {
        let mut opportunities = Vec::new();

        let names = self.coordinator.venue_names();
        for (i, source_venue) in names.iter().enumerate() {
            for dest_venue in names.iter().skip(i + 1) {
                let source_directions = self.coordinator.supported_directions(source_venue)?;
                let dest_directions = self.coordinator.supported_directions(dest_venue)?;

                for direction in &source_directions {
                    if !dest_directions.contains(&direction.reverse()) {
                        continue;
                    }

                    let Some(source_quote) = rate_for(rates, source_venue, *direction) else {
                        debug!(venue = %source_venue, pair = %direction, "no quote, skipping");
                        continue;
                    };
                    let Some(dest_quote) = rate_for(rates, dest_venue, direction.reverse())
                    else {
                        debug!(venue = %dest_venue, pair = %direction.reverse(), "no quote, skipping");
                        continue;
                    };

                    // A zero quote (dead market) cannot be inverted and
                    // carries no opportunity.
                    let Some(source_rate) = Decimal::ONE
                        .checked_div(source_quote)
                        .filter(|rate| !rate.is_zero())
                    else {
                        warn!(venue = %source_venue, pair = %direction, "degenerate quote, skipping");
                        continue;
                    };
                    let dest_rate = dest_quote;
                    let percentage = ArbOpportunity::percentage(source_rate, dest_rate);

                    info!(
                        source = %format!("{}({}->{})", source_venue, direction.from, direction.to),
                        dest = %format!("{}({}->{})", dest_venue, direction.to, direction.from),
                        percentage = %percentage.round_dp(2),
                        "arbitrage rate"
                    );

                    if percentage < self.config.min_execution_percentage {
                        continue;
                    }

                    opportunities.push(ArbOpportunity {
                        id: ids::generate(),
                        created_at: chrono::Utc::now(),
                        source_venue: source_venue.clone(),
                        dest_venue: dest_venue.clone(),
                        from_currency: direction.from,
                        to_currency: direction.to,
                        source_rate,
                        dest_rate,
                        percentage,
                    });
                }
            }
        }

        Ok(opportunities)
    }

    /// Executes both legs of an opportunity.
    ///
    /// Skipped (not failed) when any order is still PLACED or a balance
    /// is under its floor. Both legs are sized from the source venue's
    /// balance. A leg placement failure propagates as-is; the other leg
    /// is not unwound.
    pub async fn process(&self, opportunity: &ArbOpportunity) -> Result<(), EngineError> {
        let _guard = self.execution_lock.lock().await;

        let open = self.storage.orders_by_status(OrderStatus::Placed).await?;
        if !open.is_empty() {
            warn!(
                open = open.len(),
                "exchange orders open, cannot process opportunity"
            );
            return Ok(());
        }

        let (source_balance, dest_balance) = tokio::try_join!(
            self.coordinator
                .balance(&opportunity.source_venue, opportunity.from_currency),
            self.coordinator
                .balance(&opportunity.dest_venue, opportunity.to_currency),
        )?;

        info!(
            source_venue = %opportunity.source_venue,
            source_balance = %source_balance,
            from = %opportunity.from_currency,
            dest_venue = %opportunity.dest_venue,
            dest_balance = %dest_balance,
            to = %opportunity.to_currency,
            "processing opportunity"
        );

        let source_min = self.minimum_balance(opportunity.from_currency)?;
        let dest_min = self.minimum_balance(opportunity.to_currency)?;
        if source_balance < source_min || dest_balance < dest_min {
            warn!("insufficient balance");
            return Ok(());
        }

        let source_max = self.max_trade_size(opportunity.from_currency)?;
        let dest_max = self.max_trade_size(opportunity.to_currency)?;
        // Both legs are sized from the source venue's balance.
        let source_quantity = source_balance.min(source_max);
        let dest_quantity = source_balance.min(dest_max);

        let direction = TradePair::new(opportunity.from_currency, opportunity.to_currency);
        let (mut source_order, mut dest_order) = tokio::try_join!(
            self.coordinator.place_order(
                &opportunity.source_venue,
                direction,
                source_quantity,
                opportunity.source_rate,
            ),
            self.coordinator.place_order(
                &opportunity.dest_venue,
                direction.reverse(),
                dest_quantity,
                opportunity.dest_rate,
            ),
        )?;

        source_order.rate = Some(opportunity.source_rate);
        source_order.source_amount = Some(source_quantity);
        source_order.dest_amount = Some(source_quantity * opportunity.source_rate);

        dest_order.rate = Some(opportunity.dest_rate);
        dest_order.source_amount = Some(dest_quantity);
        dest_order.dest_amount = Some(dest_quantity * opportunity.dest_rate);

        for order in [&mut source_order, &mut dest_order] {
            order.arb_opportunity_id = Some(opportunity.id.clone());
            let stored = self.storage.save_order(order).await?;
            info!(venue = %stored.venue, order_id = %stored.id, "exchange order created");
        }

        Ok(())
    }

    /// Settles a filled leg: withdraws the leg's acquired currency from
    /// its venue to the paired venue of the round trip.
    ///
    /// The transferred amount is the venue's live balance, not the
    /// order's achieved amount; venue fees hidden inside the fill would
    /// otherwise make the withdrawal bounce.
    pub async fn make_transfer(&self, order: &ExchangeOrder) -> Result<(), EngineError> {
        let opportunity_id = order.arb_opportunity_id.as_deref().ok_or_else(|| {
            EngineError::Validation(format!("order {} has no opportunity id", order.id))
        })?;
        let opportunity = self
            .storage
            .opportunity_by_id(opportunity_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("opportunity {}", opportunity_id)))?;

        if order.achieved_dest_amount.is_none() {
            return Err(EngineError::Validation(format!(
                "order {} has no achieved dest amount",
                order.id
            )));
        }

        let paired_venue = if order.venue == opportunity.source_venue {
            &opportunity.dest_venue
        } else {
            &opportunity.source_venue
        };

        let mut destination = self
            .coordinator
            .deposit_address(paired_venue, order.dest_currency)?;
        if let Some(key) =
            self.coordinator
                .withdrawal_key(&order.venue, paired_venue, order.dest_currency)?
        {
            destination = key;
        }

        let balance = self
            .coordinator
            .balance(&order.venue, order.dest_currency)
            .await?;

        info!(
            amount = %balance,
            currency = %order.dest_currency,
            from = %order.venue,
            to = %paired_venue,
            "transferring"
        );
        self.coordinator
            .transfer(&order.venue, order.dest_currency, balance, &destination)
            .await?;
        Ok(())
    }

    fn minimum_balance(&self, currency: Currency) -> Result<Decimal, EngineError> {
        self.config
            .minimum_balances
            .get(&currency)
            .copied()
            .ok_or_else(|| {
                EngineError::Validation(format!("no minimum balance configured for {}", currency))
            })
    }

    fn max_trade_size(&self, currency: Currency) -> Result<Decimal, EngineError> {
        self.config
            .max_trade_sizes
            .get(&currency)
            .copied()
            .ok_or_else(|| {
                EngineError::Validation(format!("no max trade size configured for {}", currency))
            })
    }
}

/// Looks up a venue's quote for a trade direction. The aggregated rate
/// table carries both directions of every quoted pair.
fn rate_for(
    rates: &HashMap<String, HashMap<TradePair, ExchangeRate>>,
    venue: &str,
    direction: TradePair,
) -> Option<Decimal> {
    rates.get(venue)?.get(&direction).map(|quote| quote.rate)
}

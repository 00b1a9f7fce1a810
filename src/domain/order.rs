//! Exchange order entity and its status machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Currency, TradePair};
use crate::ids;

/// OrderStatus is the lifecycle state of an order.
///
/// Transitions only move forward along `NEW -> PLACED -> {FILLED,
/// CANCELLED, FAILED}`; terminal states accept no further transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Placed,
    Filled,
    Cancelled,
    Failed,
}

impl OrderStatus {
    /// Returns true if `next` is a legal forward transition from this state.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::New, OrderStatus::Placed)
                | (OrderStatus::Placed, OrderStatus::Filled)
                | (OrderStatus::Placed, OrderStatus::Cancelled)
                | (OrderStatus::Placed, OrderStatus::Failed)
        )
    }

    /// Returns true if no further transition is accepted.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Failed
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::New => "NEW",
            OrderStatus::Placed => "PLACED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PLACED" => Ok(OrderStatus::Placed),
            "FILLED" => Ok(OrderStatus::Filled),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "FAILED" => Ok(OrderStatus::Failed),
            _ => Err(format!("Unknown order status: {}", s)),
        }
    }
}

/// ExchangeOrder is one leg of a round-trip trade on a single venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeOrder {
    /// Identifier minted by this process, not by the venue.
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    /// Venue id the order was placed on.
    pub venue: String,
    /// Currency spent by the order.
    pub source_currency: Currency,
    /// Currency acquired by the order.
    pub dest_currency: Currency,
    /// Transaction id assigned by the venue on placement.
    pub venue_tx_id: Option<String>,
    /// Back-reference to the opportunity this leg executes.
    pub arb_opportunity_id: Option<String>,
    /// Requested amount of source currency.
    pub source_amount: Option<Decimal>,
    /// Expected amount of dest currency at the requested rate.
    pub dest_amount: Option<Decimal>,
    /// Requested rate.
    pub rate: Option<Decimal>,
    pub fees: Option<Decimal>,
    pub fees_currency: Option<Currency>,
    /// Source amount actually consumed, reported by the venue on fill.
    pub achieved_source_amount: Option<Decimal>,
    /// Dest amount actually received, reported by the venue on fill.
    pub achieved_dest_amount: Option<Decimal>,
    /// Realized rate, `achieved_source / achieved_dest`.
    pub achieved_rate: Option<Decimal>,
}

impl ExchangeOrder {
    /// Creates a NEW order with a freshly minted id.
    pub fn create(venue: &str, pair: TradePair) -> Self {
        Self {
            id: ids::generate(),
            created_at: Utc::now(),
            status: OrderStatus::New,
            venue: venue.to_string(),
            source_currency: pair.from,
            dest_currency: pair.to,
            venue_tx_id: None,
            arb_opportunity_id: None,
            source_amount: None,
            dest_amount: None,
            rate: None,
            fees: None,
            fees_currency: None,
            achieved_source_amount: None,
            achieved_dest_amount: None,
            achieved_rate: None,
        }
    }

    /// Moves the order to `next`, rejecting any backward or
    /// terminal-state transition.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), String> {
        if !self.status.can_transition_to(next) {
            return Err(format!(
                "illegal order status transition {} -> {}",
                self.status, next
            ));
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;

    fn new_order() -> ExchangeOrder {
        ExchangeOrder::create(
            "kraken",
            TradePair::new(Currency::ETH, Currency::BTC),
        )
    }

    #[test]
    fn test_create_mints_id_and_starts_new() {
        let order = new_order();
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.id.len(), 15);
        assert_eq!(order.source_currency, Currency::ETH);
        assert_eq!(order.dest_currency, Currency::BTC);
        assert_ne!(order.id, new_order().id);
    }

    #[test]
    fn test_forward_transitions_are_accepted() {
        let mut order = new_order();
        order.transition_to(OrderStatus::Placed).unwrap();
        order.transition_to(OrderStatus::Filled).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);

        let mut order = new_order();
        order.transition_to(OrderStatus::Placed).unwrap();
        order.transition_to(OrderStatus::Cancelled).unwrap();

        let mut order = new_order();
        order.transition_to(OrderStatus::Placed).unwrap();
        order.transition_to(OrderStatus::Failed).unwrap();
    }

    #[test]
    fn test_backward_and_skipping_transitions_are_rejected() {
        let mut order = new_order();
        assert!(order.transition_to(OrderStatus::Filled).is_err());
        assert!(order.transition_to(OrderStatus::New).is_err());

        order.transition_to(OrderStatus::Placed).unwrap();
        assert!(order.transition_to(OrderStatus::New).is_err());
        assert!(order.transition_to(OrderStatus::Placed).is_err());
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for terminal in [
            OrderStatus::Filled,
            OrderStatus::Cancelled,
            OrderStatus::Failed,
        ] {
            let mut order = new_order();
            order.transition_to(OrderStatus::Placed).unwrap();
            order.transition_to(terminal).unwrap();
            assert!(terminal.is_terminal());
            for next in [
                OrderStatus::New,
                OrderStatus::Placed,
                OrderStatus::Filled,
                OrderStatus::Cancelled,
                OrderStatus::Failed,
            ] {
                assert!(order.clone().transition_to(next).is_err());
            }
        }
    }
}

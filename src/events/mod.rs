//! In-process publish/subscribe bus decoupling pipeline phases.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::domain::{ArbOpportunity, ExchangeOrder};

/// EventKind keys handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    OpportunityDetected,
    OrderFilled,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::OpportunityDetected => write!(f, "opportunity_detected"),
            EventKind::OrderFilled => write!(f, "order_filled"),
        }
    }
}

/// Event is a bus message with its payload.
#[derive(Debug, Clone)]
pub enum Event {
    OpportunityDetected(ArbOpportunity),
    OrderFilled(ExchangeOrder),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::OpportunityDetected(_) => EventKind::OpportunityDetected,
            Event::OrderFilled(_) => EventKind::OrderFilled,
        }
    }
}

/// Error type produced by event handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Handler is an async callback invoked for each published event of its kind.
pub type Handler =
    Arc<dyn Fn(Event) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// EventBus delivers published events to registered handlers.
///
/// Delivery is at-most-once and best-effort: handlers registered after a
/// publish never see that event, and nothing is persisted or replayed.
pub struct EventBus {
    subscribers: RwLock<HashMap<EventKind, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a handler for one event kind.
    pub async fn subscribe(&self, kind: EventKind, handler: Handler) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.entry(kind).or_default().push(handler);
        debug!(kind = %kind, "handler subscribed");
    }

    /// Delivers `event` to every handler registered for its kind, in
    /// registration order. A handler failure is logged here and never
    /// reaches the publisher or disables the handler.
    pub async fn publish(&self, event: Event) {
        let kind = event.kind();
        let handlers = {
            let subscribers = self.subscribers.read().await;
            match subscribers.get(&kind) {
                Some(handlers) => handlers.clone(),
                None => return,
            }
        };

        info!(kind = %kind, handlers = handlers.len(), "publishing event");

        for handler in handlers {
            if let Err(e) = handler(event.clone()).await {
                error!(kind = %kind, error = %e, "event handler failed");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

//! Domain models for cross-venue arbitrage.

mod currency;
mod opportunity;
mod order;
mod pair;
mod rate;

pub use currency::Currency;
pub use opportunity::ArbOpportunity;
pub use order::{ExchangeOrder, OrderStatus};
pub use pair::TradePair;
pub use rate::ExchangeRate;

//! Top-of-book rate quote for one venue and pair.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TradePair;

/// ExchangeRate is a snapshot of the price for a trade direction on one venue.
///
/// `reverse_rate` is quoted independently by the venue, not derived by
/// inverting `rate`: bid/ask spread differs by direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// When the quote was taken.
    pub timestamp: DateTime<Utc>,
    /// Venue id that produced the quote.
    pub venue: String,
    /// Trade direction the quote is for.
    pub pair: TradePair,
    /// Price to acquire `pair.to` per unit of `pair.from`.
    pub rate: Decimal,
    /// Price for the opposite direction.
    pub reverse_rate: Decimal,
    /// 24h volume reported by the venue.
    pub volume: Decimal,
}

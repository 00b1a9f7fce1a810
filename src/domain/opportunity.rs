//! Arbitrage opportunity domain model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Currency;

/// ArbOpportunity is a detected cross-venue round trip.
///
/// The round trip buys `from -> to` on the source venue and `to -> from`
/// on the dest venue; `percentage` is the signed spread of the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbOpportunity {
    /// Unique identifier for this opportunity.
    pub id: String,
    /// When the opportunity was detected.
    pub created_at: DateTime<Utc>,
    /// Venue the first leg executes on.
    pub source_venue: String,
    /// Venue the second leg executes on.
    pub dest_venue: String,
    pub from_currency: Currency,
    pub to_currency: Currency,
    /// Price achievable when closing the loop on the source venue.
    pub source_rate: Decimal,
    /// Rate for the reverse direction on the dest venue.
    pub dest_rate: Decimal,
    /// Signed spread percentage; positive means profitable.
    pub percentage: Decimal,
}

impl ArbOpportunity {
    /// Computes the spread percentage `(dest - source) / source * 100`.
    pub fn percentage(source_rate: Decimal, dest_rate: Decimal) -> Decimal {
        (dest_rate - source_rate) / source_rate * Decimal::from(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_percentage_of_equal_rates_is_zero() {
        for r in ["0.03", "1", "33.333333", "12345.6789"] {
            let rate = Decimal::from_str(r).unwrap();
            assert_eq!(ArbOpportunity::percentage(rate, rate), Decimal::ZERO);
        }
    }

    #[test]
    fn test_percentage_matches_formula() {
        let source = Decimal::from_str("2").unwrap();
        let dest = Decimal::from_str("3").unwrap();
        assert_eq!(
            ArbOpportunity::percentage(source, dest),
            Decimal::from_str("50").unwrap()
        );
    }

    #[test]
    fn test_percentage_is_signed() {
        let source = Decimal::from_str("3").unwrap();
        let dest = Decimal::from_str("2").unwrap();
        let pct = ArbOpportunity::percentage(source, dest);
        assert!(pct.is_sign_negative());
        assert_eq!(
            pct.round_dp(8),
            Decimal::from_str("-33.33333333").unwrap()
        );
    }
}

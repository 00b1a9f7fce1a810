//! Ordered currency pair describing a trade direction.

use serde::{Deserialize, Serialize};

use super::Currency;

/// TradePair is an ordered (from, to) currency pair.
///
/// The order matters: `(ETH, BTC)` is the direction that spends ETH to
/// acquire BTC, and `reverse()` gives the opposite direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradePair {
    pub from: Currency,
    pub to: Currency,
}

impl TradePair {
    pub fn new(from: Currency, to: Currency) -> Self {
        Self { from, to }
    }

    /// Returns the opposite trade direction.
    pub fn reverse(&self) -> TradePair {
        TradePair::new(self.to, self.from)
    }
}

impl std::fmt::Display for TradePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.from, self.to)
    }
}

impl std::str::FromStr for TradePair {
    type Err = String;

    /// Parses "ETH/BTC" into a TradePair.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (from, to) = s
            .split_once('/')
            .ok_or_else(|| format!("Invalid pair (expected FROM/TO): {}", s))?;
        Ok(TradePair::new(from.parse()?, to.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_reverse_swaps_direction() {
        let pair = TradePair::new(Currency::ETH, Currency::BTC);
        let reversed = pair.reverse();
        assert_eq!(reversed.from, Currency::BTC);
        assert_eq!(reversed.to, Currency::ETH);
        assert_eq!(reversed.reverse(), pair);
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(
            TradePair::new(Currency::ETH, Currency::BTC),
            TradePair::new(Currency::ETH, Currency::BTC)
        );
        assert_ne!(
            TradePair::new(Currency::ETH, Currency::BTC),
            TradePair::new(Currency::BTC, Currency::ETH)
        );
    }

    #[test]
    fn test_display_concatenates_symbols() {
        let pair = TradePair::new(Currency::ETH, Currency::BTC);
        assert_eq!(pair.to_string(), "ETHBTC");
    }

    #[test]
    fn test_from_str_parses_slash_form() {
        let pair = TradePair::from_str("ETH/BTC").unwrap();
        assert_eq!(pair, TradePair::new(Currency::ETH, Currency::BTC));
        assert!(TradePair::from_str("ETHBTC").is_err());
        assert!(TradePair::from_str("ETH/XYZ").is_err());
    }
}

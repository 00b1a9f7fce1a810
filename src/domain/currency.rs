//! Currency symbols traded across venues.

use serde::{Deserialize, Serialize};

/// Currency identifies one of the tradeable symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    BTC,
    ETH,
    USD,
    LTC,
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Currency::BTC => write!(f, "BTC"),
            Currency::ETH => write!(f, "ETH"),
            Currency::USD => write!(f, "USD"),
            Currency::LTC => write!(f, "LTC"),
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BTC" => Ok(Currency::BTC),
            "ETH" => Ok(Currency::ETH),
            "USD" => Ok(Currency::USD),
            "LTC" => Ok(Currency::LTC),
            _ => Err(format!("Unknown currency: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_display_round_trips_through_from_str() {
        for c in [Currency::BTC, Currency::ETH, Currency::USD, Currency::LTC] {
            assert_eq!(Currency::from_str(&c.to_string()).unwrap(), c);
        }
    }

    #[test]
    fn test_unknown_symbol_is_rejected() {
        assert!(Currency::from_str("DOGE").is_err());
        assert!(Currency::from_str("btc").is_err());
    }
}

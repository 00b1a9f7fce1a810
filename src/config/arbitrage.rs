//! Arbitrage engine configuration.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use super::duration;
use crate::domain::Currency;

/// Default interval between opportunity scans.
const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(3);

/// Default interval between order reconciliation passes.
const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on any single venue call.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Arbitrage decision settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ArbitrageConfig {
    /// Minimum spread percentage at which an opportunity executes
    /// (boundary inclusive).
    pub min_execution_percentage: Decimal,
    /// Interval between opportunity scans (default: 3s).
    #[serde(default, with = "duration")]
    pub scan_interval: Duration,
    /// Interval between order reconciliation passes (default: 5s).
    #[serde(default, with = "duration")]
    pub reconcile_interval: Duration,
    /// Timeout applied to every venue call (default: 10s).
    #[serde(default, with = "duration")]
    pub request_timeout: Duration,
    /// Balance floor per currency; trading aborts below it.
    #[serde(default)]
    pub minimum_balances: HashMap<Currency, Decimal>,
    /// Cap on the traded amount per currency.
    #[serde(default)]
    pub max_trade_sizes: HashMap<Currency, Decimal>,
}

impl ArbitrageConfig {
    pub fn scan_interval(&self) -> Duration {
        or_default(self.scan_interval, DEFAULT_SCAN_INTERVAL)
    }

    pub fn reconcile_interval(&self) -> Duration {
        or_default(self.reconcile_interval, DEFAULT_RECONCILE_INTERVAL)
    }

    pub fn request_timeout(&self) -> Duration {
        or_default(self.request_timeout, DEFAULT_REQUEST_TIMEOUT)
    }
}

fn or_default(value: Duration, default: Duration) -> Duration {
    if value.is_zero() { default } else { value }
}

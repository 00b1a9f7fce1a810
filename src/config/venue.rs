//! Venue configuration.

use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::Currency;

/// Settings for a single venue.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VenueConfig {
    /// Whether this venue should be used.
    #[serde(default)]
    pub enabled: bool,
    /// API key (loaded from environment variable).
    #[serde(skip)]
    pub api_key: String,
    /// API secret (loaded from environment variable).
    #[serde(skip)]
    pub api_secret: String,
    /// One-time password for venues that require it (environment variable).
    #[serde(skip)]
    pub otp: Option<String>,
    /// API passphrase for venues that require it (environment variable).
    #[serde(skip)]
    pub passphrase: Option<String>,
    /// Deposit address per currency for inbound transfers.
    #[serde(default)]
    pub deposit_addresses: HashMap<Currency, String>,
}

//! Configuration loading and validation.
//!
//! Uses serde_yaml to load YAML configuration files with credentials
//! supplied through environment variables.

mod app;
mod arbitrage;
mod duration;
mod error;
mod storage;
mod venue;

pub use app::AppConfig;
pub use arbitrage::ArbitrageConfig;
pub use error::ConfigError;
pub use storage::StorageConfig;
pub use venue::VenueConfig;

use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::{env, fs};

use crate::domain::TradePair;

/// Root configuration.
///
/// Required sections: app, venues, pairs, arbitrage.
/// Optional sections: storage.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    /// Maps venue ids to their configurations.
    pub venues: HashMap<String, VenueConfig>,
    /// Tradeable currency pairs to scan (e.g. "ETH/BTC").
    pub pairs: Vec<String>,
    /// Arbitrage decision settings.
    pub arbitrage: ArbitrageConfig,
    /// Opportunity and order persistence (optional).
    pub storage: Option<StorageConfig>,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// First loads environment variables from `.env` (if present), then
    /// loads the YAML config and credentials from environment variables:
    /// `{VENUE}_API_KEY`, `{VENUE}_API_SECRET`, `{VENUE}_OTP`,
    /// `{VENUE}_PASSPHRASE`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;

        config.load_credentials_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load credentials from environment variables.
    fn load_credentials_from_env(&mut self) {
        for (name, venue) in self.venues.iter_mut() {
            if !venue.enabled {
                continue;
            }

            let prefix = name.to_uppercase();
            venue.api_key = env::var(format!("{}_API_KEY", prefix)).unwrap_or_default();
            venue.api_secret = env::var(format!("{}_API_SECRET", prefix)).unwrap_or_default();
            venue.otp = env::var(format!("{}_OTP", prefix)).ok();
            venue.passphrase = env::var(format!("{}_PASSPHRASE", prefix)).ok();
        }
    }

    /// Returns the ids of enabled venues, sorted for deterministic iteration.
    pub fn enabled_venues(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .venues
            .iter()
            .filter(|(_, v)| v.enabled)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Parses the configured pair strings into trade pairs.
    pub fn trade_pairs(&self) -> Result<Vec<TradePair>, ConfigError> {
        self.pairs
            .iter()
            .map(|s| TradePair::from_str(s).map_err(ConfigError::Validation))
            .collect()
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        if self.pairs.is_empty() {
            return Err(ConfigError::Validation(
                "at least one trading pair is required".into(),
            ));
        }
        self.trade_pairs()?;

        let enabled = self.enabled_venues();
        if enabled.len() < 2 {
            return Err(ConfigError::Validation(
                "at least two venues must be enabled".into(),
            ));
        }

        // Only require credentials outside development.
        if self.app.env != "development" {
            for name in &enabled {
                let venue = &self.venues[name];
                if venue.api_key.is_empty() || venue.api_secret.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "venue {}: API credentials not found (set {}_API_KEY and {}_API_SECRET env vars)",
                        name,
                        name.to_uppercase(),
                        name.to_uppercase()
                    )));
                }
            }
        }

        Ok(())
    }
}

//! Tollgate configuration structures to map the tollgate.toml configuration.

#![deny(missing_docs)]

mod health;
mod limits;
mod loader;
mod persistence;
mod rules;
mod server;

use std::{collections::BTreeMap, path::Path};

pub use health::HealthConfig;
pub use limits::{LimitsConfig, RefillPolicy};
pub use persistence::PersistenceConfig;
pub use rules::{LimitRule, ServiceConfig};
use serde::Deserialize;
pub use server::ServerConfig;

/// Main configuration structure for the Tollgate application.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Engine-wide bucket defaults used when a bucket is created on first access.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Snapshot persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Services that can be metered, keyed by service id.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
    /// Provisioning rules for services and buckets.
    #[serde(default)]
    pub rules: Vec<LimitRule>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates the configuration, returning non-fatal warnings.
    pub fn validate(&self) -> anyhow::Result<Vec<String>> {
        loader::validate(self)
    }

    /// Returns the usage price of every configured service, including services
    /// introduced only through rules.
    pub fn service_prices(&self) -> BTreeMap<&str, u64> {
        let mut prices: BTreeMap<&str, u64> = self
            .services
            .iter()
            .map(|(id, service)| (id.as_str(), service.usage_price))
            .collect();

        for rule in &self.rules {
            prices.entry(rule.service_id.as_str()).or_insert(rule.usage_price);
        }

        prices
    }
}

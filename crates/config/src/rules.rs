//! Service and provisioning rule configuration.

use serde::Deserialize;

/// A metered service.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Tokens charged per consumed usage unit.
    pub usage_price: u64,
}

/// A provisioning rule.
///
/// Every rule registers its service in the catalog. A rule naming a `user_id`
/// pre-provisions the bucket of that exact user at startup. A rule without one
/// is a template: every user of the client gets a bucket with these parameters
/// the first time they access the service.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitRule {
    /// Unique identifier of the rule.
    pub id: String,
    /// Service the rule applies to.
    pub service_id: String,
    /// Client the rule applies to.
    pub client_id: String,
    /// Optional user, turning the rule into an eagerly created bucket.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Tokens charged per consumed usage unit of the service.
    pub usage_price: u64,
    /// Tokens regenerated per elapsed second.
    pub refill_rate_per_second: u64,
    /// Starting balance. Defaults to `max_tokens`.
    #[serde(default)]
    pub initial_tokens: Option<u64>,
    /// Bucket capacity. Must be greater than zero.
    pub max_tokens: u64,
}

impl LimitRule {
    /// Starting balance of buckets created from this rule.
    pub fn initial_tokens(&self) -> u64 {
        self.initial_tokens.unwrap_or(self.max_tokens)
    }
}

//! Engine-wide bucket defaults.

use serde::Deserialize;

/// Parameters applied to buckets created on first access when no rule
/// matches the request's service and client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Tokens a new bucket starts with. Clamped to `max_tokens`.
    pub initial_tokens: u64,
    /// Bucket capacity. Must be greater than zero.
    pub max_tokens: u64,
    /// Tokens regenerated per elapsed second.
    pub refill_rate_per_second: u64,
    /// How sub-second time between refills is accounted for.
    pub refill_policy: RefillPolicy,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            initial_tokens: 100,
            max_tokens: 100,
            refill_rate_per_second: 1,
            refill_policy: RefillPolicy::default(),
        }
    }
}

/// Refill accounting policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefillPolicy {
    /// Every refill moves the refill mark to the current time, so time shorter
    /// than a whole second between two requests never produces tokens.
    #[default]
    DiscardRemainder,
    /// The refill mark only advances by the whole seconds that were credited;
    /// the sub-second remainder counts towards the next refill.
    CarryRemainder,
}

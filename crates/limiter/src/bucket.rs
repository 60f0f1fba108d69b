//! Bucket state and the refill/consume algorithm.

use config::{LimitRule, LimitsConfig, RefillPolicy};
use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

/// State of one token bucket.
///
/// This is also the persisted snapshot format, so field names must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Key of the bucket.
    #[serde(alias = "key")]
    pub id: String,
    /// Current balance, never above `max_tokens`.
    pub tokens: u64,
    /// Tokens regenerated per elapsed second.
    pub refill_rate_per_second: u64,
    /// Capacity of the bucket.
    pub max_tokens: u64,
    /// When the bucket was first created.
    pub created_at: Timestamp,
    /// Time up to which refill has been credited.
    pub last_refill: Timestamp,
}

/// Parameters used to create a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketParams {
    /// Starting balance, clamped to `max_tokens`.
    pub initial_tokens: u64,
    /// Tokens regenerated per elapsed second.
    pub refill_rate_per_second: u64,
    /// Capacity, must be greater than zero.
    pub max_tokens: u64,
}

impl From<&LimitsConfig> for BucketParams {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            initial_tokens: limits.initial_tokens,
            refill_rate_per_second: limits.refill_rate_per_second,
            max_tokens: limits.max_tokens,
        }
    }
}

impl From<&LimitRule> for BucketParams {
    fn from(rule: &LimitRule) -> Self {
        Self {
            initial_tokens: rule.initial_tokens(),
            refill_rate_per_second: rule.refill_rate_per_second,
            max_tokens: rule.max_tokens,
        }
    }
}

/// Estimated wait before a denied request could succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAfter {
    /// Wait this many seconds, assuming nobody else consumes meanwhile.
    Seconds(u64),
    /// Waiting will not help, or the wait cannot be computed: the bucket
    /// never refills, or the cost exceeds the bucket's capacity.
    Unknown,
}

/// Outcome of a consumption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    /// Whether the usage was allowed and its cost deducted.
    pub is_allowed: bool,
    /// Wait estimate; `Seconds(0)` when allowed.
    pub retry_after: RetryAfter,
}

impl AccessDecision {
    pub(crate) fn allowed() -> Self {
        Self {
            is_allowed: true,
            retry_after: RetryAfter::Seconds(0),
        }
    }

    pub(crate) fn denied(retry_after: RetryAfter) -> Self {
        Self {
            is_allowed: false,
            retry_after,
        }
    }

    /// The retry-after estimate in seconds, `None` when unknown.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self.retry_after {
            RetryAfter::Seconds(secs) => Some(secs),
            RetryAfter::Unknown => None,
        }
    }
}

impl Bucket {
    /// Creates a bucket whose balance starts at `min(initial_tokens, max_tokens)`.
    pub fn new(id: impl Into<String>, params: BucketParams, now: Timestamp) -> Self {
        Self {
            id: id.into(),
            tokens: params.initial_tokens.min(params.max_tokens),
            refill_rate_per_second: params.refill_rate_per_second,
            max_tokens: params.max_tokens,
            created_at: now,
            last_refill: now,
        }
    }

    /// Credits tokens for the whole seconds elapsed since the last refill and
    /// returns the number of tokens added.
    ///
    /// A `now` earlier than the last refill credits nothing and leaves the
    /// refill mark untouched.
    pub(crate) fn refill(&mut self, now: Timestamp, policy: RefillPolicy) -> u64 {
        if now < self.last_refill {
            return 0;
        }

        let elapsed_secs = now.duration_since(self.last_refill).as_secs();
        let gained = u64::try_from(elapsed_secs)
            .unwrap_or_default()
            .saturating_mul(self.refill_rate_per_second);

        let before = self.tokens;
        self.tokens = self.tokens.saturating_add(gained).min(self.max_tokens);

        self.last_refill = match policy {
            RefillPolicy::DiscardRemainder => now,
            RefillPolicy::CarryRemainder if self.tokens == self.max_tokens => now,
            RefillPolicy::CarryRemainder => self
                .last_refill
                .checked_add(SignedDuration::from_secs(elapsed_secs))
                .unwrap_or(now),
        };

        self.tokens - before
    }

    /// Deducts `cost` if the balance covers it. A denial leaves the balance untouched.
    pub(crate) fn consume(&mut self, cost: u64) -> AccessDecision {
        if self.tokens < cost {
            return AccessDecision::denied(self.retry_after(cost));
        }

        self.tokens -= cost;
        AccessDecision::allowed()
    }

    fn retry_after(&self, cost: u64) -> RetryAfter {
        if self.refill_rate_per_second == 0 || cost > self.max_tokens {
            return RetryAfter::Unknown;
        }

        let missing = cost - self.tokens;
        RetryAfter::Seconds(missing.div_ceil(self.refill_rate_per_second))
    }
}

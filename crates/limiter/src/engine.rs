//! Token bucket engine.

use std::sync::Arc;

use config::RefillPolicy;

use crate::{
    AccessDecision, AccessRequest, Bucket, BucketParams, Clock, LimiterError, ServiceCatalog,
    storage::{BucketStore, InMemoryStore},
};

/// Owns every bucket and applies refill and consumption to them.
///
/// Each bucket has its own lock; refill and consumption of one request happen
/// in a single critical section, and requests for different buckets never wait
/// for each other.
pub struct TokenBucketEngine<S = InMemoryStore> {
    store: S,
    catalog: Arc<dyn ServiceCatalog>,
    clock: Arc<dyn Clock>,
    refill_policy: RefillPolicy,
}

impl TokenBucketEngine {
    /// Create an engine backed by in-memory storage.
    pub fn new(catalog: Arc<dyn ServiceCatalog>, clock: Arc<dyn Clock>) -> Self {
        Self::with_store(InMemoryStore::new(), catalog, clock)
    }
}

impl<S: BucketStore> TokenBucketEngine<S> {
    /// Create an engine on top of the given storage backend.
    pub fn with_store(store: S, catalog: Arc<dyn ServiceCatalog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            catalog,
            clock,
            refill_policy: RefillPolicy::default(),
        }
    }

    /// Sets how sub-second time between refills is accounted for.
    pub fn with_refill_policy(mut self, refill_policy: RefillPolicy) -> Self {
        self.refill_policy = refill_policy;
        self
    }

    /// Creates a bucket with a full refill mark at the current time.
    ///
    /// The starting balance is `min(initial_tokens, max_tokens)`.
    pub fn create_bucket(&self, key: &str, params: BucketParams) -> Result<(), LimiterError> {
        if params.max_tokens == 0 {
            return Err(LimiterError::InvalidCapacity { key: key.to_string() });
        }

        log::debug!(
            "Creating bucket '{key}': initial_tokens={}, refill_rate_per_second={}, max_tokens={}",
            params.initial_tokens,
            params.refill_rate_per_second,
            params.max_tokens
        );

        let bucket = Bucket::new(key, params, self.clock.now());
        self.store.insert_if_absent(bucket)?;

        log::debug!("Bucket '{key}' created");

        Ok(())
    }

    /// Inserts a bucket read from a snapshot, keeping its timestamps.
    pub fn restore_bucket(&self, mut snapshot: Bucket) -> Result<(), LimiterError> {
        if snapshot.max_tokens == 0 {
            return Err(LimiterError::InvalidCapacity { key: snapshot.id });
        }

        if snapshot.tokens > snapshot.max_tokens {
            log::warn!(
                "Snapshot of bucket '{}' holds {} tokens above its capacity of {}, clamping",
                snapshot.id,
                snapshot.tokens,
                snapshot.max_tokens
            );

            snapshot.tokens = snapshot.max_tokens;
        }

        if snapshot.last_refill < snapshot.created_at {
            snapshot.last_refill = snapshot.created_at;
        }

        let key = snapshot.id.clone();

        self.store
            .insert_if_absent(snapshot)
            .inspect_err(|err| log::warn!("Failed to restore bucket '{key}': {err}"))?;

        log::debug!("Bucket '{key}' restored");

        Ok(())
    }

    /// Returns a copy of the bucket stored under `key`.
    pub fn get_bucket(&self, key: &str) -> Result<Bucket, LimiterError> {
        self.store.with_lock(key, |bucket| bucket.clone())
    }

    /// Returns a copy of every bucket.
    pub fn all_buckets(&self) -> Vec<Bucket> {
        self.store.snapshot_all()
    }

    /// Whether a bucket exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.store.contains(key)
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the engine holds no bucket.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Refills the request's bucket, then charges the request's cost to it.
    ///
    /// The bucket must already exist; this never creates one.
    pub fn consume_service(&self, request: &AccessRequest) -> Result<AccessDecision, LimiterError> {
        let service = self.catalog.get_service(&request.service_id)?;
        let key = request.bucket_key();
        let cost = service.usage_price_in_tokens.saturating_mul(request.usage_amount);

        let (decision, tokens_left) = self.store.with_lock(key.as_str(), |bucket| {
            let gained = bucket.refill(self.clock.now(), self.refill_policy);

            if gained > 0 {
                log::debug!("Bucket '{key}' refilled with {gained} tokens, now at {}", bucket.tokens);
            }

            (bucket.consume(cost), bucket.tokens)
        })?;

        if decision.is_allowed {
            log::debug!("Bucket '{key}' charged {cost} tokens, {tokens_left} left");
        } else {
            log::debug!(
                "Bucket '{key}' denied {cost} tokens with {tokens_left} available, retry after {:?}",
                decision.retry_after
            );
        }

        Ok(decision)
    }
}

//! Access manager: the single entry point deciding whether a request may proceed.

use std::{collections::HashMap, sync::Arc};

use config::Config;

use crate::{
    AccessDecision, AccessRequest, BucketKey, BucketParams, LimiterError, ServiceCatalog, TokenBucketEngine,
    storage::{BucketStore, InMemoryStore},
};

/// Manager composing catalog lookup, lazy bucket creation and consumption.
pub struct AccessManager<S = InMemoryStore> {
    /// Bucket engine.
    engine: Arc<TokenBucketEngine<S>>,
    /// Catalog used to reject unknown services before touching any bucket.
    catalog: Arc<dyn ServiceCatalog>,
    /// Parameters of buckets created on first access.
    defaults: BucketParams,
    /// Per service and client overrides of `defaults`.
    templates: HashMap<(String, String), BucketParams>,
}

impl<S: BucketStore> AccessManager<S> {
    /// Create a manager creating missing buckets with `defaults`.
    pub fn new(engine: Arc<TokenBucketEngine<S>>, catalog: Arc<dyn ServiceCatalog>, defaults: BucketParams) -> Self {
        Self {
            engine,
            catalog,
            defaults,
            templates: HashMap::new(),
        }
    }

    /// Create a manager from configuration.
    ///
    /// Rules naming a user get their bucket created now. A bucket that already
    /// exists, because it was restored from a snapshot, keeps its restored state.
    /// Rules without a user become templates for their service and client.
    pub fn from_config(
        engine: Arc<TokenBucketEngine<S>>,
        catalog: Arc<dyn ServiceCatalog>,
        config: &Config,
    ) -> Result<Self, LimiterError> {
        let mut manager = Self::new(engine, catalog, BucketParams::from(&config.limits));

        for rule in &config.rules {
            let params = BucketParams::from(rule);

            let Some(user_id) = &rule.user_id else {
                log::debug!(
                    "Rule '{}' applies to every user of client '{}' on service '{}'",
                    rule.id,
                    rule.client_id,
                    rule.service_id
                );

                manager = manager.with_template(&rule.service_id, &rule.client_id, params);
                continue;
            };

            let key = BucketKey::derive(&rule.service_id, &rule.client_id, user_id);

            if manager.provision(key.as_str(), params)? {
                log::info!("Rule '{}' provisioned bucket '{key}'", rule.id);
            } else {
                log::info!("Bucket '{key}' of rule '{}' was restored from a snapshot, keeping its state", rule.id);
            }
        }

        Ok(manager)
    }

    /// Use `params` for buckets created for any user of `client_id` on `service_id`.
    pub fn with_template(mut self, service_id: &str, client_id: &str, params: BucketParams) -> Self {
        self.templates
            .insert((service_id.to_string(), client_id.to_string()), params);

        self
    }

    /// Creates a bucket unless one exists. Returns whether a bucket was created.
    pub fn provision(&self, key: &str, params: BucketParams) -> Result<bool, LimiterError> {
        match self.engine.create_bucket(key, params) {
            Ok(()) => Ok(true),
            Err(LimiterError::DuplicateKey { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// The bucket engine.
    pub fn engine(&self) -> &Arc<TokenBucketEngine<S>> {
        &self.engine
    }

    /// Decides whether the request may proceed, charging its cost if so.
    ///
    /// A request for a known service whose bucket does not exist yet creates
    /// the bucket first. Two first requests racing for the same new key both
    /// end up consuming from the one bucket that won the insertion.
    pub fn get_access_status(&self, request: &AccessRequest) -> Result<AccessDecision, LimiterError> {
        log::debug!(
            "Checking access for service '{}', client '{}', user '{}', usage {}",
            request.service_id,
            request.client_id,
            request.user_id,
            request.usage_amount
        );

        self.catalog.get_service(&request.service_id)?;

        let key = request.bucket_key();

        if !self.engine.contains(key.as_str()) {
            let params = self.params_for(&request.service_id, &request.client_id);

            if self.provision(key.as_str(), params)? {
                log::debug!("Created bucket '{key}' on first access");
            }
        }

        let decision = self.engine.consume_service(request)?;

        log::debug!(
            "Access for bucket '{key}': allowed={}, retry_after={:?}",
            decision.is_allowed,
            decision.retry_after
        );

        Ok(decision)
    }

    fn params_for(&self, service_id: &str, client_id: &str) -> BucketParams {
        self.templates
            .get(&(service_id.to_string(), client_id.to_string()))
            .copied()
            .unwrap_or(self.defaults)
    }
}

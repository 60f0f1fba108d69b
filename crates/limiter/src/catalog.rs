//! Service catalog: the token price of every metered service.

use config::Config;
use dashmap::{DashMap, mapref::entry::Entry};

use crate::LimiterError;

/// A metered service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    /// Identifier of the service.
    pub id: String,
    /// Tokens charged per consumed usage unit.
    pub usage_price_in_tokens: u64,
}

/// Read access to the service catalog.
pub trait ServiceCatalog: Send + Sync {
    /// Looks up a service by id.
    fn get_service(&self, id: &str) -> Result<Service, LimiterError>;
}

/// Concurrent, in-memory service catalog.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: DashMap<String, Service>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every service declared in the configuration,
    /// either in the services table or through a rule.
    pub fn from_config(config: &Config) -> Self {
        let registry = Self::new();

        for (id, price) in config.service_prices() {
            log::debug!("Registering service '{id}' at {price} tokens per unit");

            registry.services.insert(
                id.to_string(),
                Service {
                    id: id.to_string(),
                    usage_price_in_tokens: price,
                },
            );
        }

        registry
    }

    /// Registers a new service. Fails if the id is already taken.
    pub fn create_service(&self, id: impl Into<String>, usage_price_in_tokens: u64) -> Result<Service, LimiterError> {
        match self.services.entry(id.into()) {
            Entry::Occupied(entry) => Err(LimiterError::DuplicateService {
                service_id: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                let service = Service {
                    id: entry.key().clone(),
                    usage_price_in_tokens,
                };

                log::info!("Service '{}' created at {usage_price_in_tokens} tokens per unit", service.id);

                Ok(entry.insert(service).value().clone())
            }
        }
    }

    /// Changes the price of an existing service. Unknown ids are not created.
    pub fn update_service(&self, id: &str, usage_price_in_tokens: u64) -> Result<Service, LimiterError> {
        let mut service = self
            .services
            .get_mut(id)
            .ok_or_else(|| LimiterError::ServiceNotFound { service_id: id.to_string() })?;

        service.usage_price_in_tokens = usage_price_in_tokens;
        log::info!("Service '{id}' updated to {usage_price_in_tokens} tokens per unit");

        Ok(service.clone())
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether no service is registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl ServiceCatalog for ServiceRegistry {
    fn get_service(&self, id: &str) -> Result<Service, LimiterError> {
        self.services
            .get(id)
            .map(|service| service.value().clone())
            .ok_or_else(|| LimiterError::ServiceNotFound { service_id: id.to_string() })
    }
}

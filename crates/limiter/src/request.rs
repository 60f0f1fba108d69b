//! Access requests.

use crate::BucketKey;

/// A request to use a metered service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    /// Service being used.
    pub service_id: String,
    /// Client the caller belongs to.
    pub client_id: String,
    /// User within the client.
    pub user_id: String,
    /// Units of usage; the cost is this times the service price.
    pub usage_amount: u64,
}

impl AccessRequest {
    /// Create a new builder for an access request.
    pub fn builder() -> AccessRequestBuilder {
        AccessRequestBuilder::default()
    }

    /// Key of the bucket this request draws from.
    pub fn bucket_key(&self) -> BucketKey {
        BucketKey::derive(&self.service_id, &self.client_id, &self.user_id)
    }
}

/// Builder for creating access requests.
#[derive(Debug)]
pub struct AccessRequestBuilder {
    service_id: String,
    client_id: String,
    user_id: String,
    usage_amount: u64,
}

impl Default for AccessRequestBuilder {
    fn default() -> Self {
        Self {
            service_id: String::new(),
            client_id: String::new(),
            user_id: String::new(),
            usage_amount: 1,
        }
    }
}

impl AccessRequestBuilder {
    /// Set the service id.
    pub fn service(mut self, id: impl Into<String>) -> Self {
        self.service_id = id.into();
        self
    }

    /// Set the client id.
    pub fn client(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    /// Set the user id.
    pub fn user(mut self, id: impl Into<String>) -> Self {
        self.user_id = id.into();
        self
    }

    /// Set the usage amount. Defaults to one unit.
    pub fn usage(mut self, amount: u64) -> Self {
        self.usage_amount = amount;
        self
    }

    /// Build the access request.
    pub fn build(self) -> AccessRequest {
        AccessRequest {
            service_id: self.service_id,
            client_id: self.client_id,
            user_id: self.user_id,
            usage_amount: self.usage_amount,
        }
    }
}

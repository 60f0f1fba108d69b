//! Error types for access control.

/// Errors that can occur while resolving services or operating on buckets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimiterError {
    /// The requested service is not in the catalog.
    #[error("Service '{service_id}' not found")]
    ServiceNotFound {
        /// Identifier that was looked up.
        service_id: String,
    },

    /// No bucket exists under the given key.
    #[error("Bucket '{key}' not found")]
    BucketNotFound {
        /// Key that was looked up.
        key: String,
    },

    /// A bucket with the same key already exists.
    #[error("A bucket already exists with key '{key}'")]
    DuplicateKey {
        /// Key that collided.
        key: String,
    },

    /// A service with the same identifier already exists.
    #[error("Service '{service_id}' already exists")]
    DuplicateService {
        /// Identifier that collided.
        service_id: String,
    },

    /// A bucket was created or restored with a capacity of zero.
    #[error("Bucket '{key}' must have max_tokens greater than zero")]
    InvalidCapacity {
        /// Key of the rejected bucket.
        key: String,
    },
}

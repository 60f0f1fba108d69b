//! Token-bucket access control for metered services.
//!
//! This crate provides:
//! - A per-bucket locked token-bucket engine with lazy, time-based refill
//! - Composite bucket keys isolating budgets per service, client and user
//! - A service catalog holding the token price of every metered service
//! - An access manager deciding, per request, whether usage is allowed
//!
//! Time is read through the [`Clock`] trait so refills can be simulated
//! deterministically in tests.

#![deny(missing_docs)]

mod bucket;
mod catalog;
mod clock;
mod engine;
mod error;
mod key;
mod manager;
mod request;
mod storage;

pub use bucket::{AccessDecision, Bucket, BucketParams, RetryAfter};
pub use catalog::{Service, ServiceCatalog, ServiceRegistry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RefillPolicy;
pub use engine::TokenBucketEngine;
pub use error::LimiterError;
pub use key::BucketKey;
pub use manager::AccessManager;
pub use request::{AccessRequest, AccessRequestBuilder};
pub use storage::{BucketStore, InMemoryStore};

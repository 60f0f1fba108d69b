//! Storage backends for bucket state.

use crate::{Bucket, LimiterError};

pub mod memory;

pub use memory::InMemoryStore;

/// Trait for bucket storage backends.
///
/// Implementations own one lock per bucket. Operations on different keys must
/// never wait for each other.
pub trait BucketStore: Send + Sync {
    /// Inserts the bucket unless its key is taken, as one atomic step.
    ///
    /// The bucket is locked before it becomes visible to other callers.
    fn insert_if_absent(&self, bucket: Bucket) -> Result<(), LimiterError>;

    /// Runs `f` with exclusive access to the bucket stored under `key`.
    fn with_lock<R>(&self, key: &str, f: impl FnOnce(&mut Bucket) -> R) -> Result<R, LimiterError>;

    /// Copies every bucket. Each copy is consistent on its own; the set as a
    /// whole is not an atomic snapshot.
    fn snapshot_all(&self) -> Vec<Bucket>;

    /// Whether a bucket is stored under `key`.
    fn contains(&self, key: &str) -> bool;

    /// Number of stored buckets.
    fn len(&self) -> usize;

    /// Whether no bucket is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! In-memory bucket storage.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::{DashMap, mapref::entry::Entry};

use super::BucketStore;
use crate::{Bucket, LimiterError};

type SharedBucket = Arc<Mutex<Bucket>>;

/// In-memory bucket storage.
///
/// The key map is a sharded concurrent map; every value carries its own mutex.
/// Map guards are released before a bucket lock is taken, so a slow bucket
/// never blocks lookups of other keys.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    buckets: DashMap<String, SharedBucket>,
}

impl InMemoryStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn shared(&self, key: &str) -> Option<SharedBucket> {
        self.buckets.get(key).map(|entry| Arc::clone(entry.value()))
    }
}

// Bucket fields are plain values that are never left half-updated, so a lock
// poisoned by a panicking holder still guards consistent data.
fn lock(bucket: &Mutex<Bucket>) -> MutexGuard<'_, Bucket> {
    bucket.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BucketStore for InMemoryStore {
    fn insert_if_absent(&self, bucket: Bucket) -> Result<(), LimiterError> {
        let key = bucket.id.clone();
        let shared = Arc::new(Mutex::new(bucket));
        let _guard = lock(&shared);

        match self.buckets.entry(key) {
            Entry::Occupied(entry) => Err(LimiterError::DuplicateKey {
                key: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&shared));
                Ok(())
            }
        }
    }

    fn with_lock<R>(&self, key: &str, f: impl FnOnce(&mut Bucket) -> R) -> Result<R, LimiterError> {
        let shared = self.shared(key).ok_or_else(|| LimiterError::BucketNotFound { key: key.to_string() })?;
        let mut bucket = lock(&shared);

        Ok(f(&mut bucket))
    }

    fn snapshot_all(&self) -> Vec<Bucket> {
        let shared: Vec<SharedBucket> = self.buckets.iter().map(|entry| Arc::clone(entry.value())).collect();

        shared.iter().map(|bucket| lock(bucket).clone()).collect()
    }

    fn contains(&self, key: &str) -> bool {
        self.buckets.contains_key(key)
    }

    fn len(&self) -> usize {
        self.buckets.len()
    }
}

//! Bucket snapshot persistence.
//!
//! Every bucket is written to its own JSON file in a snapshot directory on a
//! fixed interval, and the directory is read back at startup to restore the
//! buckets before any request is served.

#![deny(missing_docs)]

mod autosave;
mod error;
mod snapshot;

pub use autosave::spawn_autosave;
pub use error::PersistenceError;
pub use snapshot::{LoadReport, SaveReport, SnapshotStore};

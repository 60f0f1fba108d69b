use std::{io, path::PathBuf};

use limiter::LimiterError;

/// Failures while writing or reading bucket snapshots.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Filesystem access failed.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// A snapshot file does not hold a valid bucket.
    #[error("Snapshot '{}' could not be decoded: {source}", path.display())]
    Decode {
        /// Snapshot file.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
    /// A bucket could not be serialized.
    #[error("Bucket '{key}' could not be encoded: {source}")]
    Encode {
        /// Key of the bucket.
        key: String,
        /// Underlying error.
        source: serde_json::Error,
    },
    /// The engine refused a decoded snapshot.
    #[error("Snapshot '{}' could not be restored: {source}", path.display())]
    Restore {
        /// Snapshot file.
        path: PathBuf,
        /// Why the engine refused it.
        source: LimiterError,
    },
}

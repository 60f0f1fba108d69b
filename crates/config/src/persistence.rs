//! Snapshot persistence configuration.

use std::{path::PathBuf, time::Duration};

use duration_str::deserialize_duration;
use serde::Deserialize;

/// Where and how often bucket snapshots are written.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PersistenceConfig {
    /// Whether snapshots are loaded at startup and saved periodically.
    pub enabled: bool,
    /// Directory holding one snapshot file per bucket.
    pub directory: PathBuf,
    /// Time between two save cycles.
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("./data/buckets"),
            interval: Duration::from_secs(10),
        }
    }
}

//! Snapshot files: one pretty-printed JSON document per bucket.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use limiter::{Bucket, BucketStore, TokenBucketEngine};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::PersistenceError;

const EXTENSION: &str = ".json";

/// Longest file name built from the encoded key. Longer keys are named by digest.
const MAX_ENCODED_NAME_LEN: usize = 200;

/// Prefix of digest names. Encoded names never contain a raw `~`.
const DIGEST_PREFIX: &str = "~sha256-";

/// Bytes kept verbatim in snapshot file names: lowercase letters, digits, `.`,
/// `_` and `-`. Uppercase letters are escaped too, so names stay distinct on
/// case-insensitive filesystems.
const FILE_NAME_ESCAPES: &AsciiSet = &escape_uppercase(NON_ALPHANUMERIC.remove(b'.').remove(b'_').remove(b'-'));

const fn escape_uppercase(set: AsciiSet) -> AsciiSet {
    let mut set = set;
    let mut byte = b'A';

    while byte <= b'Z' {
        set = set.add(byte);
        byte += 1;
    }

    set
}

/// Outcome of a save cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Buckets written.
    pub saved: usize,
    /// Buckets that could not be written.
    pub failed: usize,
}

/// Outcome of a load cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Snapshots restored into the engine.
    pub restored: usize,
    /// Snapshot files that were skipped.
    pub skipped: usize,
}

/// A directory of bucket snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    directory: PathBuf,
}

impl SnapshotStore {
    /// Create a store writing to `directory`. Nothing is touched on disk until [`prepare`](Self::prepare).
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// The snapshot directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Creates the snapshot directory and its parents if missing.
    pub fn prepare(&self) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.directory).map_err(|source| PersistenceError::Io {
            path: self.directory.clone(),
            source,
        })
    }

    /// Path of the snapshot file for `key`.
    ///
    /// Short keys are percent-encoded, long ones are replaced by their SHA-256
    /// digest. Either way two keys never share a file, whatever the case
    /// sensitivity of the filesystem.
    pub fn snapshot_path(&self, key: &str) -> PathBuf {
        self.directory.join(snapshot_file_name(key))
    }

    /// Writes one bucket, replacing its previous snapshot atomically.
    pub fn save_bucket(&self, bucket: &Bucket) -> Result<PathBuf, PersistenceError> {
        let path = self.snapshot_path(&bucket.id);

        let json = serde_json::to_vec_pretty(bucket).map_err(|source| PersistenceError::Encode {
            key: bucket.id.clone(),
            source,
        })?;

        let io_error = |source: std::io::Error| PersistenceError::Io {
            path: path.clone(),
            source,
        };

        let mut file = NamedTempFile::new_in(&self.directory).map_err(io_error)?;
        file.write_all(&json).map_err(io_error)?;
        file.as_file().sync_all().map_err(io_error)?;
        file.persist(&path).map_err(|err| io_error(err.error))?;

        Ok(path)
    }

    /// Writes a snapshot of every bucket of the engine.
    ///
    /// A bucket that fails to save is logged and counted; the cycle goes on.
    pub fn save_all<S: BucketStore>(&self, engine: &TokenBucketEngine<S>) -> SaveReport {
        let mut report = SaveReport::default();

        for bucket in engine.all_buckets() {
            match self.save_bucket(&bucket) {
                Ok(path) => {
                    log::trace!("Saved bucket '{}' to '{}'", bucket.id, path.display());
                    report.saved += 1;
                }
                Err(err) => {
                    log::error!("Failed to save bucket '{}': {err}", bucket.id);
                    report.failed += 1;
                }
            }
        }

        log::debug!(
            "Saved {} buckets to '{}', {} failed",
            report.saved,
            self.directory.display(),
            report.failed
        );

        report
    }

    /// Reads one snapshot file.
    pub fn load_file(&self, path: &Path) -> Result<Bucket, PersistenceError> {
        let content = fs::read(path).map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_slice(&content).map_err(|source| PersistenceError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Restores every snapshot found under the directory, descending into
    /// subdirectories.
    ///
    /// Files that cannot be read, decoded or restored are logged and skipped.
    /// Only a missing or unreadable snapshot directory fails the whole load.
    pub fn load_all<S: BucketStore>(&self, engine: &TokenBucketEngine<S>) -> Result<LoadReport, PersistenceError> {
        fs::read_dir(&self.directory).map_err(|source| PersistenceError::Io {
            path: self.directory.clone(),
            source,
        })?;

        let mut report = LoadReport::default();

        for entry in WalkDir::new(&self.directory).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Skipping unreadable entry in '{}': {err}", self.directory.display());
                    report.skipped += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() || !is_snapshot(entry.path()) {
                continue;
            }

            match self.restore_file(entry.path(), engine) {
                Ok(key) => {
                    log::debug!("Restored bucket '{key}' from '{}'", entry.path().display());
                    report.restored += 1;
                }
                Err(err) => {
                    log::warn!("Skipping snapshot: {err}");
                    report.skipped += 1;
                }
            }
        }

        log::info!(
            "Restored {} buckets from '{}', skipped {}",
            report.restored,
            self.directory.display(),
            report.skipped
        );

        Ok(report)
    }

    fn restore_file<S: BucketStore>(
        &self,
        path: &Path,
        engine: &TokenBucketEngine<S>,
    ) -> Result<String, PersistenceError> {
        let bucket = self.load_file(path)?;
        let key = bucket.id.clone();

        engine.restore_bucket(bucket).map_err(|source| PersistenceError::Restore {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(key)
    }
}

fn snapshot_file_name(key: &str) -> String {
    let encoded = format!("{}{EXTENSION}", utf8_percent_encode(key, FILE_NAME_ESCAPES));

    if encoded.len() <= MAX_ENCODED_NAME_LEN {
        return encoded;
    }

    format!("{DIGEST_PREFIX}{:x}{EXTENSION}", Sha256::digest(key.as_bytes()))
}

fn is_snapshot(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(EXTENSION))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use indoc::indoc;
    use jiff::Timestamp;
    use limiter::{BucketKey, BucketParams, LimiterError, ManualClock, ServiceRegistry};

    use super::*;

    const PARAMS: BucketParams = BucketParams {
        initial_tokens: 40,
        refill_rate_per_second: 2,
        max_tokens: 50,
    };

    fn engine() -> TokenBucketEngine {
        let clock = ManualClock::new("2024-01-01T00:00:00Z".parse::<Timestamp>().unwrap());
        TokenBucketEngine::new(Arc::new(ServiceRegistry::new()), Arc::new(clock))
    }

    fn store() -> (tempfile::TempDir, SnapshotStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("buckets"));
        store.prepare().unwrap();

        (dir, store)
    }

    fn snapshot_json(key: &str, tokens: u64) -> String {
        serde_json::json!({
            "id": key,
            "tokens": tokens,
            "refill_rate_per_second": 1,
            "max_tokens": 100,
            "created_at": "2024-01-01T00:00:00Z",
            "last_refill": "2024-01-01T00:00:10Z",
        })
        .to_string()
    }

    #[test]
    fn file_names_escape_separators() {
        assert_eq!(snapshot_file_name("search:acme:bob"), "search%3Aacme%3Abob.json");
        assert_eq!(snapshot_file_name("a/b"), "a%2Fb.json");
        assert_eq!(snapshot_file_name("v1.2_x-y"), "v1.2_x-y.json");
    }

    #[test]
    fn keys_differing_only_in_case_get_distinct_files() {
        let upper = snapshot_file_name("Search:acme:bob");
        let lower = snapshot_file_name("search:acme:bob");

        assert_eq!(upper, "%53earch%3Aacme%3Abob.json");
        assert_ne!(upper.to_lowercase(), lower.to_lowercase());
    }

    #[test]
    fn long_keys_are_named_by_digest() {
        let key = BucketKey::derive("search", "acme", &"user@example.com/".repeat(20));
        let name = snapshot_file_name(key.as_str());

        assert!(key.as_str().len() >= 300);
        assert!(name.starts_with(DIGEST_PREFIX), "{name}");
        assert_eq!(name.len(), DIGEST_PREFIX.len() + 64 + EXTENSION.len());
        assert_ne!(name, snapshot_file_name(&format!("{}x", key.as_str())));
    }

    #[test]
    fn long_keys_survive_a_save_and_restore() {
        let (_dir, store) = store();

        let key = BucketKey::derive("search", "acme", &"user@example.com/".repeat(20));

        let source = engine();
        source.create_bucket(key.as_str(), PARAMS).unwrap();

        assert_eq!(store.save_all(&source), SaveReport { saved: 1, failed: 0 });

        let names: Vec<_> = fs::read_dir(store.directory())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();

        assert_eq!(names.len(), 1);
        assert!(names[0].len() <= MAX_ENCODED_NAME_LEN, "{}", names[0]);

        let target = engine();

        assert_eq!(store.load_all(&target).unwrap(), LoadReport { restored: 1, skipped: 0 });
        assert_eq!(
            target.get_bucket(key.as_str()).unwrap(),
            source.get_bucket(key.as_str()).unwrap()
        );
    }

    #[test]
    fn colliding_triples_get_distinct_files() {
        let first = BucketKey::derive("a_b", "c", "d");
        let second = BucketKey::derive("a", "b_c", "d");
        let third = BucketKey::derive("a:b", "c", "d");
        let fourth = BucketKey::derive("a", "b:c", "d");

        let mut names = vec![
            snapshot_file_name(first.as_str()),
            snapshot_file_name(second.as_str()),
            snapshot_file_name(third.as_str()),
            snapshot_file_name(fourth.as_str()),
        ];

        names.sort();
        names.dedup();

        assert_eq!(names.len(), 4);
    }

    #[test]
    fn prepare_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("a").join("b"));

        store.prepare().unwrap();
        store.prepare().unwrap();

        assert!(store.directory().is_dir());
    }

    #[test]
    fn saved_buckets_are_restored_with_their_state() {
        let (_dir, store) = store();

        let source = engine();
        source.create_bucket("search:acme:bob", PARAMS).unwrap();
        source.create_bucket("search:acme:alice", PARAMS).unwrap();

        assert_eq!(store.save_all(&source), SaveReport { saved: 2, failed: 0 });

        let target = engine();
        let report = store.load_all(&target).unwrap();

        assert_eq!(report, LoadReport { restored: 2, skipped: 0 });
        assert_eq!(
            target.get_bucket("search:acme:bob").unwrap(),
            source.get_bucket("search:acme:bob").unwrap()
        );
    }

    #[test]
    fn saving_again_overwrites_the_snapshot() {
        let (_dir, store) = store();

        let engine = engine();
        engine.create_bucket("k", PARAMS).unwrap();
        let path = store.save_bucket(&engine.get_bucket("k").unwrap()).unwrap();

        let mut bucket = engine.get_bucket("k").unwrap();
        bucket.tokens = 3;
        store.save_bucket(&bucket).unwrap();

        assert_eq!(store.load_file(&path).unwrap().tokens, 3);
        assert_eq!(fs::read_dir(store.directory()).unwrap().count(), 1);
    }

    #[test]
    fn snapshots_are_pretty_json() {
        let (_dir, store) = store();

        let engine = engine();
        engine.create_bucket("k", PARAMS).unwrap();
        let path = store.save_bucket(&engine.get_bucket("k").unwrap()).unwrap();

        let content = fs::read_to_string(path).unwrap();

        assert_eq!(
            content,
            indoc! {r#"
                {
                  "id": "k",
                  "tokens": 40,
                  "refill_rate_per_second": 2,
                  "max_tokens": 50,
                  "created_at": "2024-01-01T00:00:00Z",
                  "last_refill": "2024-01-01T00:00:00Z"
                }"#}
        );
    }

    #[test]
    fn duplicate_keys_restore_only_once() {
        let (_dir, store) = store();

        fs::write(store.directory().join("one.json"), snapshot_json("search:acme:bob", 5)).unwrap();
        fs::write(store.directory().join("two.json"), snapshot_json("search:acme:bob", 9)).unwrap();

        let engine = engine();
        let report = store.load_all(&engine).unwrap();

        assert_eq!(report, LoadReport { restored: 1, skipped: 1 });
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.get_bucket("search:acme:bob").unwrap().tokens, 5);
    }

    #[test]
    fn corrupt_and_foreign_files_are_skipped() {
        let (_dir, store) = store();

        fs::write(store.directory().join("good.json"), snapshot_json("good", 5)).unwrap();
        fs::write(store.directory().join("broken.json"), "{ not json").unwrap();
        fs::write(store.directory().join("notes.txt"), "ignored").unwrap();

        let engine = engine();
        let report = store.load_all(&engine).unwrap();

        assert_eq!(report, LoadReport { restored: 1, skipped: 1 });
        assert!(engine.contains("good"));
    }

    #[test]
    fn subdirectories_are_searched() {
        let (_dir, store) = store();

        let nested = store.directory().join("2024").join("01");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("deep.json"), snapshot_json("deep", 5)).unwrap();
        fs::write(store.directory().join("top.json"), snapshot_json("top", 5)).unwrap();

        let engine = engine();
        let report = store.load_all(&engine).unwrap();

        assert_eq!(report.restored, 2);
        assert!(engine.contains("deep"));
        assert!(engine.contains("top"));
    }

    #[test]
    fn zero_capacity_snapshots_are_skipped() {
        let (_dir, store) = store();

        let json = snapshot_json("empty", 0).replace("\"max_tokens\":100", "\"max_tokens\":0");
        fs::write(store.directory().join("empty.json"), json).unwrap();

        let path = store.directory().join("empty.json");
        let engine = engine();
        let error = store.restore_file(&path, &engine).unwrap_err();

        assert!(matches!(
            error,
            PersistenceError::Restore {
                source: LimiterError::InvalidCapacity { .. },
                ..
            }
        ));
        assert!(engine.is_empty());
    }

    #[test]
    fn loading_a_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("missing"));

        let error = store.load_all(&engine()).unwrap_err();

        assert!(matches!(error, PersistenceError::Io { .. }));
    }

    #[test]
    fn unwritable_directory_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("never-created"));

        let engine = engine();
        engine.create_bucket("k", PARAMS).unwrap();

        assert_eq!(store.save_all(&engine), SaveReport { saved: 0, failed: 1 });
    }
}

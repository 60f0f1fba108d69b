//! Background task saving bucket snapshots on a fixed interval.

use std::{sync::Arc, time::Duration};

use limiter::{BucketStore, TokenBucketEngine};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{SaveReport, SnapshotStore};

/// Saves every bucket each `interval` until `shutdown` is cancelled, then
/// saves one last time and returns.
///
/// The first save happens one interval after the call. Disk writes run on
/// the blocking thread pool.
pub fn spawn_autosave<S>(
    store: SnapshotStore,
    engine: Arc<TokenBucketEngine<S>>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    S: BucketStore + Send + Sync + 'static,
{
    tokio::spawn(async move {
        log::debug!(
            "Saving buckets to '{}' every {interval:?}",
            store.directory().display()
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    save(&store, &engine).await;
                }
                _ = shutdown.cancelled() => {
                    break;
                }
            }
        }

        let report = save(&store, &engine).await;
        log::info!("Final save wrote {} buckets, {} failed", report.saved, report.failed);
    })
}

async fn save<S>(store: &SnapshotStore, engine: &Arc<TokenBucketEngine<S>>) -> SaveReport
where
    S: BucketStore + Send + Sync + 'static,
{
    let store = store.clone();
    let engine = engine.clone();

    match tokio::task::spawn_blocking(move || store.save_all(&engine)).await {
        Ok(report) => report,
        Err(err) => {
            log::error!("Save cycle did not complete: {err}");
            SaveReport::default()
        }
    }
}

//! Tollgate server library.
//!
//! Provides a reusable server function to serve Tollgate either for the binary, or for the integration tests.

#![deny(missing_docs)]

mod access;
mod health;

use std::{net::SocketAddr, sync::Arc};

use anyhow::anyhow;
use axum::{
    Router,
    routing::{get, post},
};
use config::Config;
use limiter::{AccessManager, ServiceRegistry, SystemClock, TokenBucketEngine};
use persistence::{SnapshotStore, spawn_autosave};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Path of the access check endpoint.
pub const ACCESS_PATH: &str = "/access";

/// Configuration for serving Tollgate.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to
    pub listen_address: SocketAddr,
    /// The deserialized Tollgate TOML configuration.
    pub config: Config,
    /// Cancelling this token stops the server after a final snapshot save.
    pub shutdown: CancellationToken,
}

/// Starts and runs the Tollgate server with the provided configuration.
///
/// Snapshots are restored and rule buckets provisioned before the listener
/// is bound, so no request sees a partially restored state.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        shutdown,
    }: ServeConfig,
) -> anyhow::Result<()> {
    let registry = Arc::new(ServiceRegistry::from_config(&config));
    log::debug!("Registered {} services", registry.len());

    let engine = Arc::new(
        TokenBucketEngine::new(registry.clone(), Arc::new(SystemClock))
            .with_refill_policy(config.limits.refill_policy),
    );

    let snapshots = if config.persistence.enabled {
        let store = SnapshotStore::new(&config.persistence.directory);

        store
            .prepare()
            .map_err(|e| anyhow!("Failed to prepare the snapshot directory: {e}"))?;

        store
            .load_all(&engine)
            .map_err(|e| anyhow!("Failed to restore bucket snapshots: {e}"))?;

        Some(store)
    } else {
        log::debug!("Persistence disabled - buckets live in memory only");
        None
    };

    let manager = AccessManager::from_config(engine.clone(), registry, &config)
        .map_err(|e| anyhow!("Failed to provision rule buckets: {e}"))?;

    let autosave = snapshots.map(|store| {
        spawn_autosave(
            store,
            engine.clone(),
            config.persistence.interval,
            shutdown.child_token(),
        )
    });

    let mut app = Router::new()
        .route(ACCESS_PATH, post(access::access))
        .with_state(Arc::new(manager));

    if config.server.health.enabled {
        app = app.route(&config.server.health.path, get(health::health));
    }

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    log::info!("Access endpoint available at: http://{listen_address}{ACCESS_PATH}");

    if config.server.health.enabled {
        log::info!(
            "Health check endpoint exposed at http://{listen_address}{}",
            config.server.health.path
        );
    }

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
        .map_err(|e| anyhow!("Failed to start HTTP server: {e}"));

    shutdown.cancel();

    if let Some(handle) = autosave
        && let Err(e) = handle.await
    {
        log::error!("Snapshot task ended abnormally: {e}");
    }

    log::info!("Server stopped");

    result
}

//! Artifact Cache - A multi-tenant cache coordinator for CI pipelines

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use uuid::Uuid;

use artifact_cache::api::{create_router, AppState};
use artifact_cache::auth::{
    default_providers, DiscoveryVerifier, HttpDiscoveryClient, HttpKeySetFetcher, JwksCache,
    StaticVerifier, TokenVerifier,
};
use artifact_cache::config::{Config, OidcMode};
use artifact_cache::coordinator::{CacheCoordinator, CoordinatorSettings};
use artifact_cache::index::{Index, MemoryIndexStore};
use artifact_cache::planner::TransferPlanner;
use artifact_cache::storage::{LocalObjectStore, UrlSigner};
use artifact_cache::tasks::{spawn_cleanup_task, BlobRetention};
use artifact_cache::telemetry::init_logging;

/// Main entry point for the artifact cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Wire index, object store, planner and token verifier
/// 4. Start background TTL cleanup task
/// 5. Start HTTP server on configured port
/// 6. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("Starting Artifact Cache Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: port={}, part_size={}, commit_policy={:?}, oidc_mode={:?}",
        config.server_port, config.min_part_size, config.commit_policy, config.oidc_mode
    );

    let store = Arc::new(MemoryIndexStore::new());
    let index = Index::new(store.clone());

    let secret = match &config.blob_signing_secret {
        Some(secret) => secret.clone(),
        None => {
            warn!("BLOB_SIGNING_SECRET not set, presigned URLs will not survive a restart");
            Uuid::new_v4().to_string()
        }
    };
    let blobs = Arc::new(LocalObjectStore::new(
        config.public_base_url.clone(),
        UrlSigner::new(secret),
        config.presign_expiry(),
    ));

    let planner = TransferPlanner::new(blobs.clone(), config.min_part_size);
    let coordinator = CacheCoordinator::new(
        index,
        blobs.clone(),
        planner,
        CoordinatorSettings::from(&config),
    );

    let http = reqwest::Client::new();
    let keys = Arc::new(JwksCache::new(
        Arc::new(HttpKeySetFetcher::new(http.clone())),
        config.jwks_refresh_interval(),
    ));
    let verifier: Arc<dyn TokenVerifier> = match config.oidc_mode {
        OidcMode::Static => Arc::new(StaticVerifier::new(default_providers(), keys)),
        OidcMode::Discovery => Arc::new(DiscoveryVerifier::new(
            default_providers(),
            Arc::new(HttpDiscoveryClient::new(http)),
            keys,
        )),
    };

    if config.admin_token.is_none() {
        warn!("ADMIN_TOKEN not set, tenant provisioning is disabled");
    }
    let state = AppState::new(coordinator, verifier, blobs.clone(), &config.oidc_audience)
        .with_admin_token(config.admin_token.clone());

    let cleanup_handle = spawn_cleanup_task(
        store,
        blobs,
        BlobRetention::from(&config),
        config.cleanup_interval,
    );
    info!("Background cleanup task started");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the cleanup task and allows graceful shutdown.
async fn shutdown_signal(cleanup_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cleanup_handle.abort();
    warn!("Cleanup task aborted");
}

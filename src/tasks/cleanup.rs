//! TTL Cleanup Task
//!
//! Background task that periodically sweeps expired index items and the
//! local object store state they pointed at.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;
use crate::index::MemoryIndexStore;
use crate::storage::LocalObjectStore;

/// How long local object store state may outlive the index records that
/// reference it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobRetention {
    /// Age after which an uncompleted multipart upload is aborted
    pub uploads: Duration,
    /// Age after which an object not rewritten since is dropped
    pub objects: Duration,
}

impl From<&Config> for BlobRetention {
    fn from(config: &Config) -> Self {
        Self {
            uploads: config.pending_ttl(),
            objects: config.committed_ttl(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SweepReport {
    items: usize,
    uploads: usize,
    objects: usize,
}

async fn sweep(
    store: &MemoryIndexStore,
    blobs: &LocalObjectStore,
    retention: BlobRetention,
) -> SweepReport {
    SweepReport {
        items: store.cleanup_expired().await,
        uploads: blobs.abort_stale_uploads(retention.uploads).await,
        objects: blobs.evict_stale_objects(retention.objects).await,
    }
}

/// Spawns a background task that periodically removes expired index items,
/// abandoned multipart uploads and objects past their retention.
///
/// Expired items already read as absent; the sweep only reclaims memory.
///
/// # Arguments
/// * `store` - shared in-memory index backend
/// * `blobs` - local object store behind the `/blobs` routes
/// * `retention` - maximum ages for uploads and objects
/// * `cleanup_interval_secs` - Interval in seconds between cleanup runs
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_cleanup_task(
    store: Arc<MemoryIndexStore>,
    blobs: Arc<LocalObjectStore>,
    retention: BlobRetention,
    cleanup_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let report = sweep(&store, &blobs, retention).await;
            if report == SweepReport::default() {
                debug!("TTL cleanup: nothing to remove");
            } else {
                info!(
                    items = report.items,
                    uploads = report.uploads,
                    objects = report.objects,
                    "TTL cleanup: removed expired state"
                );
            }
        }
    })
}

//! Background Tasks
//!
//! Long-running jobs spawned by `main` next to the HTTP server:
//! - Index sweep: reclaims expired pending, committed and lease records,
//!   plus abandoned multipart uploads and stale objects in the local store

mod cleanup;

pub use cleanup::{spawn_cleanup_task, BlobRetention};

//! Artifact Cache - A multi-tenant cache coordinator for CI pipelines
//!
//! Authenticates CI jobs by their OIDC ID tokens, records cache entries in
//! a key-value index, and hands out presigned multipart transfer plans.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod index;
pub mod models;
pub mod planner;
pub mod storage;
pub mod tasks;
pub mod telemetry;
pub mod transfer;


pub use api::{create_router, AppState};
pub use client::{Archive, CacheClient, ClientError, EntryRef, SaveOutcome};
pub use config::Config;
pub use coordinator::{CacheCoordinator, CoordinatorSettings};
pub use error::{ApiError, AuthError, CacheError};
pub use tasks::spawn_cleanup_task;

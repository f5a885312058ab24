//! API Module
//!
//! HTTP handlers and routing for the cache RPC API.
//!
//! # Endpoints
//! - `POST /cache.v1.CacheService/*` - Cache entry lifecycle (ID token required)
//! - `POST /cache.v1.TenantService/*` - Tenant provisioning (admin token required)
//! - `PUT|GET /blobs/:key` - Presigned object transfers
//! - `GET /health` - Health check endpoint

pub mod blobs;
pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;

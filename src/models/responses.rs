//! Response DTOs for the cache RPC API
//!
//! Defines the structure of outgoing RPC response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{CacheEntry, ProviderType, TransferInstruction};

/// Response body for CheckEntry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckEntryResponse {
    pub exists: bool,
    /// Checksum of the committed entry, empty when absent
    pub sha256: String,
}

/// Response body for CreateEntry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryResponse {
    /// Upload id to pass back to UpdateEntry
    pub id: String,
    pub multipart: bool,
    pub upload_instructions: Vec<TransferInstruction>,
}

/// Response body for UpdateEntry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEntryResponse {
    pub id: String,
}

/// Response body for GetEntry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetEntryResponse {
    pub cache_entry: CacheEntry,
    pub multipart: bool,
    pub download_instructions: Vec<TransferInstruction>,
}

/// Response body for CreateTenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenantResponse {
    pub id: String,
}

/// Response body for GetTenant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTenantResponse {
    pub id: String,
    pub provider_type: ProviderType,
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable code (e.g. "not_found")
    pub code: String,
    /// Operation-scoped message; never carries internal detail
    pub message: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

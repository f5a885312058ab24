//! Record model
//!
//! Records persisted in the index. A cache record is written twice: once
//! under its upload id while pending, then under its stable key once
//! committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Identity;
use crate::models::{CacheEntry, ProviderType};

/// One cached artifact version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    /// Artifact key, stable within owner + provider
    pub id: String,
    pub owner: String,
    pub provider_type: ProviderType,
    pub name: String,
    pub branch: String,
    pub paths: Vec<String>,
    pub sha256: String,
    pub compression: String,
    pub file_size: u64,
    /// Present only while an object-store multipart upload is open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multipart_upload_id: Option<String>,
    /// Caller captured at creation time, for audit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    pub updated_at: DateTime<Utc>,
}

impl CacheRecord {
    pub fn from_entry(
        owner: &str,
        provider_type: ProviderType,
        entry: &CacheEntry,
        identity: Option<Identity>,
    ) -> Self {
        Self {
            id: entry.key.clone(),
            owner: owner.to_string(),
            provider_type,
            name: entry.name.clone(),
            branch: entry.branch.clone(),
            paths: entry.paths.clone(),
            sha256: entry.sha256.clone(),
            compression: entry.compression.clone(),
            file_size: entry.file_size,
            multipart_upload_id: None,
            identity,
            updated_at: Utc::now(),
        }
    }

    pub fn to_entry(&self) -> CacheEntry {
        CacheEntry {
            key: self.id.clone(),
            compression: self.compression.clone(),
            file_size: self.file_size,
            sha256: self.sha256.clone(),
            paths: self.paths.clone(),
            name: self.name.clone(),
            branch: self.branch.clone(),
        }
    }
}

/// One provisioned (provider, owner) tenant. Write-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRecord {
    pub id: String,
    pub provider_type: ProviderType,
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

/// Exclusive claim on a stable key between CreateEntry and UpdateEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRecord {
    pub upload_id: String,
    pub acquired_at: DateTime<Utc>,
}

//! Request DTOs for the cache RPC API
//!
//! Defines the structure of incoming RPC request bodies.

use serde::Deserialize;

use super::types::{CacheEntry, MultipartEtag, ProviderType};

/// Maximum allowed cache key length in bytes
pub const MAX_KEY_LENGTH: usize = 512;

fn validate_scope(owner: &str, provider_type: ProviderType, key: &str) -> Option<String> {
    if owner.is_empty() {
        return Some("Owner cannot be empty".to_string());
    }
    // '/' and '#' delimit index keys
    if owner.contains(['/', '#']) {
        return Some("Owner cannot contain '/' or '#'".to_string());
    }
    if provider_type == ProviderType::Unspecified {
        return Some("Provider type must be specified".to_string());
    }
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        ));
    }
    None
}

/// Request body for CheckEntry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckEntryRequest {
    pub owner: String,
    #[serde(default)]
    pub provider_type: ProviderType,
    pub key: String,
}

impl CheckEntryRequest {
    pub fn validate(&self) -> Option<String> {
        validate_scope(&self.owner, self.provider_type, &self.key)
    }
}

/// Request body for CreateEntry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryRequest {
    pub owner: String,
    #[serde(default)]
    pub provider_type: ProviderType,
    pub cache_entry: CacheEntry,
}

impl CreateEntryRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if let Some(msg) = validate_scope(&self.owner, self.provider_type, &self.cache_entry.key)
        {
            return Some(msg);
        }
        if self.cache_entry.sha256.is_empty() {
            return Some("Checksum cannot be empty".to_string());
        }
        None
    }
}

/// Request body for UpdateEntry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntryRequest {
    /// Upload id returned by CreateEntry
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub multipart_etags: Vec<MultipartEtag>,
}

impl UpdateEntryRequest {
    pub fn validate(&self) -> Option<String> {
        if self.id.is_empty() {
            return Some("Upload id cannot be empty".to_string());
        }
        if self.multipart_etags.iter().any(|e| e.part == 0) {
            return Some("Part numbers start at 1".to_string());
        }
        None
    }
}

/// Request body for GetEntry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetEntryRequest {
    pub owner: String,
    #[serde(default)]
    pub provider_type: ProviderType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub branch: String,
    pub key: String,
}

impl GetEntryRequest {
    pub fn validate(&self) -> Option<String> {
        validate_scope(&self.owner, self.provider_type, &self.key)
    }
}

/// Request body for CreateTenant
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantRequest {
    pub id: String,
    #[serde(default)]
    pub provider_type: ProviderType,
    pub owner: String,
}

impl CreateTenantRequest {
    pub fn validate(&self) -> Option<String> {
        if self.id.is_empty() {
            return Some("Tenant id cannot be empty".to_string());
        }
        validate_scope(&self.owner, self.provider_type, &self.id)
    }
}

/// Request body for GetTenant
#[derive(Debug, Clone, Deserialize)]
pub struct GetTenantRequest {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_entry_request_deserialize() {
        let json = r#"{
            "owner": "acme",
            "providerType": "github-actions",
            "cacheEntry": {"key": "deps", "sha256": "abc", "fileSize": 10}
        }"#;
        let req: CreateEntryRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.owner, "acme");
        assert_eq!(req.provider_type, ProviderType::GithubActions);
        assert_eq!(req.cache_entry.file_size, 10);
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_validate_empty_owner() {
        let req = CheckEntryRequest {
            owner: "".to_string(),
            provider_type: ProviderType::Gitlab,
            key: "deps".to_string(),
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_owner_with_key_delimiter() {
        for owner in ["upload#x", "acme/ci"] {
            let req = CheckEntryRequest {
                owner: owner.to_string(),
                provider_type: ProviderType::Gitlab,
                key: "deps".to_string(),
            };
            assert_eq!(
                req.validate().unwrap(),
                "Owner cannot contain '/' or '#'",
                "{}",
                owner
            );
        }
    }

    #[test]
    fn test_validate_unspecified_provider() {
        let req = CheckEntryRequest {
            owner: "acme".to_string(),
            provider_type: ProviderType::Unspecified,
            key: "deps".to_string(),
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_missing_checksum() {
        let req = CreateEntryRequest {
            owner: "acme".to_string(),
            provider_type: ProviderType::Buildkite,
            cache_entry: CacheEntry {
                key: "deps".to_string(),
                ..Default::default()
            },
        };
        assert_eq!(req.validate().unwrap(), "Checksum cannot be empty");
    }

    #[test]
    fn test_update_entry_rejects_part_zero() {
        let req: UpdateEntryRequest = serde_json::from_str(
            r#"{"id": "u1", "multipartEtags": [{"etag": "\"a\"", "part": 0}]}"#,
        )
        .unwrap();
        assert!(req.validate().is_some());
    }
}

//! Index key layout
//!
//! Every record lives in a single keyspace; the shape of the key tells the
//! record kind apart.

use crate::models::ProviderType;

/// Key of the committed, externally visible version of a cache entry.
pub fn stable_key(owner: &str, provider: ProviderType, key: &str) -> String {
    format!("{}/{}/{}", owner, provider.as_str(), key)
}

/// Key of the pending record opened by `CreateEntry`.
pub fn pending_key(upload_id: &str) -> String {
    format!("upload#{}", upload_id)
}

/// Key of a provisioned tenant.
pub fn tenant_key(provider: ProviderType, owner: &str) -> String {
    format!("{}#{}", provider.as_str(), owner)
}

/// Secondary key resolving a tenant by its id.
pub fn tenant_id_key(id: &str) -> String {
    format!("tenant-id#{}", id)
}

/// Key of the create→commit lease on a stable key.
pub fn lease_key(stable: &str) -> String {
    format!("lease#{}", stable)
}

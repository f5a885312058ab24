//! Tenant gate run ahead of every cache operation.

use tracing::warn;

use super::VerifiedCaller;
use crate::error::{CacheError, Result};
use crate::index::{tenant_key, Index, TenantRecord};
use crate::models::ProviderType;

#[derive(Clone)]
pub struct TenantAuthorizer {
    index: Index,
}

impl TenantAuthorizer {
    pub fn new(index: Index) -> Self {
        Self { index }
    }

    /// Confirms `(provider, owner)` is provisioned and, when a caller is
    /// present, that the caller's token names the same tenant.
    ///
    /// Every failure is `PermissionDenied` so an unprovisioned tenant cannot
    /// be told apart from any other refusal.
    pub async fn authorize(
        &self,
        caller: Option<&VerifiedCaller>,
        owner: &str,
        provider: ProviderType,
    ) -> Result<TenantRecord> {
        if let Some(caller) = caller {
            if caller.provider() != provider || caller.owner() != owner {
                warn!(
                    requested_owner = owner,
                    token_owner = caller.owner(),
                    "token does not belong to requested tenant"
                );
                return Err(denied(owner, provider));
            }
        }

        match self
            .index
            .exists_as::<TenantRecord>(&tenant_key(provider, owner))
            .await
        {
            Ok(Some(tenant)) => Ok(tenant),
            Ok(None) => Err(denied(owner, provider)),
            Err(e) => {
                warn!(owner, provider = %provider, error = %e, "tenant lookup failed");
                Err(denied(owner, provider))
            }
        }
    }
}

fn denied(owner: &str, provider: ProviderType) -> CacheError {
    CacheError::PermissionDenied(format!("{}#{}", provider, owner))
}

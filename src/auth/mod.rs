//! Authentication Module
//!
//! OIDC ID-token verification for CI providers and the tenant gate that
//! protects every cache operation.
//!
//! Two verifiers are available:
//! 1. `StaticVerifier` - issuer → JWKS URL map configured up front
//! 2. `DiscoveryVerifier` - resolves the JWKS URL through OIDC discovery
//!
//! Both share a `JwksCache` that refreshes key sets in the background.

mod claims;
mod discovery;
mod jwks;
mod tenant;
mod token;
mod verifier;

#[cfg(test)]
pub(crate) mod test_keys;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::models::ProviderType;

pub use claims::{BuildkiteClaims, GithubActionsClaims, GitlabClaims, ProviderClaims};
pub use discovery::{
    DiscoveryClient, DiscoveryDocument, DiscoveryVerifier, HttpDiscoveryClient, ProviderHandle,
};
pub use jwks::{
    HttpKeySetFetcher, JwksCache, KeySetFetcher, MAX_REFRESH_INTERVAL, MIN_REFRESH_INTERVAL,
};
pub use tenant::TenantAuthorizer;
pub use token::peek_issuer;
pub use verifier::{default_providers, ProviderDescriptor, StaticVerifier};

// == Identity ==
/// Audit identity taken from a verified ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    pub issuer: String,
    #[serde(default)]
    pub audience: Vec<String>,
}

/// Everything learned about the caller from a successful verification.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedCaller {
    pub identity: Identity,
    pub claims: ProviderClaims,
}

impl VerifiedCaller {
    pub fn provider(&self) -> ProviderType {
        self.claims.provider()
    }

    pub fn owner(&self) -> &str {
        self.claims.owner()
    }
}

// == Token Verifier ==
/// Authentication gate run once per inbound request.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verifies `token` as an ID token from `provider` addressed to `audience`.
    async fn validate(
        &self,
        token: &str,
        provider: ProviderType,
        audience: &str,
    ) -> Result<VerifiedCaller, AuthError>;
}

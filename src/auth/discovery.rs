//! OIDC discovery verifier
//!
//! Resolves each provider's key set location from its
//! `/.well-known/openid-configuration` document instead of a static map.
//! Concurrent first requests for a provider share one discovery call, and the
//! resulting handle lives for the rest of the process.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::info;

use super::token::peek_issuer;
use super::verifier::{verify_caller, ProviderDescriptor};
use super::{JwksCache, TokenVerifier, VerifiedCaller};
use crate::error::AuthError;
use crate::models::ProviderType;

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// The subset of an OpenID provider configuration this service reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub jwks_uri: String,
}

#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    async fn discover(&self, issuer: &str) -> Result<DiscoveryDocument, AuthError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpDiscoveryClient {
    client: reqwest::Client,
}

impl HttpDiscoveryClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiscoveryClient for HttpDiscoveryClient {
    async fn discover(&self, issuer: &str) -> Result<DiscoveryDocument, AuthError> {
        let url = format!("{}{}", issuer.trim_end_matches('/'), DISCOVERY_PATH);
        let document: DiscoveryDocument = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?;

        if document.issuer.trim_end_matches('/') != issuer.trim_end_matches('/') {
            return Err(AuthError::KeyFetch(format!(
                "discovery document for {} names issuer {}",
                issuer, document.issuer
            )));
        }
        Ok(document)
    }
}

/// A discovered provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderHandle {
    pub provider: ProviderType,
    pub issuer: String,
    pub jwks_uri: String,
}

// == Discovery Verifier ==
pub struct DiscoveryVerifier {
    issuers: HashMap<ProviderType, String>,
    client: Arc<dyn DiscoveryClient>,
    keys: Arc<JwksCache>,
    handles: DashMap<ProviderType, Arc<OnceCell<Arc<ProviderHandle>>>>,
}

impl DiscoveryVerifier {
    pub fn new(
        descriptors: impl IntoIterator<Item = ProviderDescriptor>,
        client: Arc<dyn DiscoveryClient>,
        keys: Arc<JwksCache>,
    ) -> Self {
        let issuers = descriptors
            .into_iter()
            .map(|d| (d.provider, d.issuer))
            .collect();
        Self {
            issuers,
            client,
            keys,
            handles: DashMap::new(),
        }
    }

    /// Returns the provider's handle, running discovery at most once per
    /// provider at a time. A failed discovery is not remembered.
    pub async fn handle(&self, provider: ProviderType) -> Result<Arc<ProviderHandle>, AuthError> {
        let issuer = self
            .issuers
            .get(&provider)
            .ok_or_else(|| AuthError::UnknownProvider(provider.to_string()))?;

        let cell = Arc::clone(&*self.handles.entry(provider).or_default());
        let handle = cell
            .get_or_try_init(|| async {
                let document = self.client.discover(issuer).await?;
                info!(
                    provider = %provider,
                    jwks_uri = %document.jwks_uri,
                    "discovered provider"
                );
                Ok::<_, AuthError>(Arc::new(ProviderHandle {
                    provider,
                    issuer: document.issuer,
                    jwks_uri: document.jwks_uri,
                }))
            })
            .await?;
        Ok(Arc::clone(handle))
    }

    fn provider_for_issuer(&self, issuer: &str) -> Option<ProviderType> {
        self.issuers
            .iter()
            .find(|(_, configured)| configured.trim_end_matches('/') == issuer.trim_end_matches('/'))
            .map(|(provider, _)| *provider)
    }
}

#[async_trait]
impl TokenVerifier for DiscoveryVerifier {
    async fn validate(
        &self,
        token: &str,
        provider: ProviderType,
        audience: &str,
    ) -> Result<VerifiedCaller, AuthError> {
        if provider == ProviderType::Unspecified {
            return Err(AuthError::UnknownProvider(provider.to_string()));
        }

        let issuer = peek_issuer(token)?;
        match self.provider_for_issuer(&issuer) {
            None => return Err(AuthError::UnknownIssuer(issuer)),
            Some(actual) if actual != provider => {
                return Err(AuthError::ProviderMismatch {
                    expected: provider.to_string(),
                    actual: actual.to_string(),
                })
            }
            Some(_) => {}
        }

        let handle = self.handle(provider).await?;
        let keys = self.keys.get(&handle.jwks_uri).await?;
        verify_caller(token, &keys, &handle.issuer, provider, audience)
    }
}

//! Shared fixtures for the integration tests.

use artifact_cache::auth::{Identity, ProviderClaims, TokenVerifier, VerifiedCaller};
use artifact_cache::error::AuthError;
use artifact_cache::models::ProviderType;
use async_trait::async_trait;
use serde_json::json;

/// Accepts `<owner>-token` as a GitHub Actions token for `<owner>`.
pub struct OwnerTokens;

#[async_trait]
impl TokenVerifier for OwnerTokens {
    async fn validate(
        &self,
        token: &str,
        provider: ProviderType,
        _audience: &str,
    ) -> Result<VerifiedCaller, AuthError> {
        let owner = token
            .strip_suffix("-token")
            .ok_or_else(|| AuthError::InvalidSignature("unknown test token".to_string()))?;
        if provider != ProviderType::GithubActions {
            return Err(AuthError::ProviderMismatch {
                expected: provider.to_string(),
                actual: ProviderType::GithubActions.to_string(),
            });
        }

        let claims = ProviderClaims::parse(
            provider,
            json!({
                "sub": format!("repo:{}/app:ref:refs/heads/main", owner),
                "repository": format!("{}/app", owner),
                "repository_owner": owner,
            }),
        )?;
        Ok(VerifiedCaller {
            identity: Identity {
                subject: format!("repo:{}/app", owner),
                issuer: "https://token.actions.githubusercontent.com".to_string(),
                audience: vec!["artifact-cache".to_string()],
            },
            claims,
        })
    }
}

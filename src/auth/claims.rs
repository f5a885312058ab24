//! Provider-specific claim sets
//!
//! Each CI provider publishes a different claim shape. The variant is chosen
//! by provider, never by probing the JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AuthError;
use crate::models::ProviderType;

/// GitHub Actions ID token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubActionsClaims {
    pub sub: String,
    pub repository: String,
    pub repository_owner: String,
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub workflow: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Buildkite agent OIDC claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildkiteClaims {
    pub sub: String,
    pub organization_slug: String,
    #[serde(default)]
    pub pipeline_slug: Option<String>,
    #[serde(default)]
    pub build_number: Option<u64>,
    #[serde(default)]
    pub build_branch: Option<String>,
}

/// GitLab CI ID token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitlabClaims {
    pub sub: String,
    pub namespace_path: String,
    #[serde(default)]
    pub project_path: Option<String>,
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub pipeline_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderClaims {
    GithubActions(GithubActionsClaims),
    Buildkite(BuildkiteClaims),
    Gitlab(GitlabClaims),
}

impl ProviderClaims {
    /// Interprets a verified claim set according to `provider`.
    pub fn parse(provider: ProviderType, claims: Value) -> Result<Self, AuthError> {
        let unparsable = |e: serde_json::Error| AuthError::ClaimsUnparsable(e.to_string());
        let parsed = match provider {
            ProviderType::GithubActions => {
                ProviderClaims::GithubActions(serde_json::from_value(claims).map_err(unparsable)?)
            }
            ProviderType::Buildkite => {
                ProviderClaims::Buildkite(serde_json::from_value(claims).map_err(unparsable)?)
            }
            ProviderType::Gitlab => {
                ProviderClaims::Gitlab(serde_json::from_value(claims).map_err(unparsable)?)
            }
            ProviderType::Unspecified => {
                return Err(AuthError::UnknownProvider(provider.to_string()));
            }
        };

        if parsed.owner().is_empty() {
            return Err(AuthError::ClaimsUnparsable("empty owner claim".to_string()));
        }
        Ok(parsed)
    }

    /// Tenant owner named by the token.
    pub fn owner(&self) -> &str {
        match self {
            ProviderClaims::GithubActions(c) => &c.repository_owner,
            ProviderClaims::Buildkite(c) => &c.organization_slug,
            ProviderClaims::Gitlab(c) => &c.namespace_path,
        }
    }

    pub fn provider(&self) -> ProviderType {
        match self {
            ProviderClaims::GithubActions(_) => ProviderType::GithubActions,
            ProviderClaims::Buildkite(_) => ProviderType::Buildkite,
            ProviderClaims::Gitlab(_) => ProviderType::Gitlab,
        }
    }
}

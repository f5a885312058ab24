//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::planner::MIN_PART_SIZE;

/// How `UpdateEntry` guards the stable key of an in-progress upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitPolicy {
    /// Last commit wins; concurrent creates for one key both succeed
    #[default]
    Overwrite,
    /// A create holds an exclusive lease on the stable key until it commits
    Lease,
}

impl FromStr for CommitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(CommitPolicy::Overwrite),
            "lease" => Ok(CommitPolicy::Lease),
            other => Err(format!("unknown commit policy: {}", other)),
        }
    }
}

/// Where verifiers learn each issuer's key set URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OidcMode {
    #[default]
    Static,
    Discovery,
}

impl FromStr for OidcMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(OidcMode::Static),
            "discovery" => Ok(OidcMode::Discovery),
            other => Err(format!("unknown oidc mode: {}", other)),
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Base URL that locally presigned blob URLs point at
    pub public_base_url: String,
    /// HMAC secret for blob URLs; a random one is generated when absent
    pub blob_signing_secret: Option<String>,
    /// Lifetime of presigned URLs in seconds
    pub presign_expiry: u64,
    /// Part size for multipart transfers in bytes
    pub min_part_size: u64,
    /// TTL of pending records in seconds
    pub pending_ttl: u64,
    /// TTL of committed records in seconds
    pub committed_ttl: u64,
    pub commit_policy: CommitPolicy,
    /// Audience every ID token must name
    pub oidc_audience: String,
    pub oidc_mode: OidcMode,
    /// Key set refresh interval in seconds
    pub jwks_refresh_interval: u64,
    /// Bearer token for tenant provisioning; tenant RPCs are refused when unset
    pub admin_token: Option<String>,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 60)
    /// - `PUBLIC_BASE_URL` - Blob URL base (default: http://127.0.0.1:3000)
    /// - `BLOB_SIGNING_SECRET` - Blob URL HMAC secret (default: random)
    /// - `PRESIGN_EXPIRY` - Presigned URL lifetime in seconds (default: 3600)
    /// - `MIN_PART_SIZE` - Multipart part size in bytes (default: 5 MiB)
    /// - `PENDING_TTL` - Pending record TTL in seconds (default: 1800)
    /// - `COMMITTED_TTL` - Committed record TTL in seconds (default: 86400)
    /// - `COMMIT_POLICY` - `overwrite` or `lease` (default: overwrite)
    /// - `OIDC_AUDIENCE` - Expected token audience (default: artifact-cache)
    /// - `OIDC_MODE` - `static` or `discovery` (default: static)
    /// - `JWKS_REFRESH_INTERVAL` - Key set refresh in seconds (default: 3600)
    /// - `ADMIN_TOKEN` - Tenant provisioning bearer (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            public_base_url: env_opt("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
            blob_signing_secret: env_opt("BLOB_SIGNING_SECRET"),
            presign_expiry: env_or("PRESIGN_EXPIRY", defaults.presign_expiry),
            min_part_size: Some(env_or("MIN_PART_SIZE", defaults.min_part_size))
                .filter(|size| *size > 0)
                .unwrap_or(defaults.min_part_size),
            pending_ttl: env_or("PENDING_TTL", defaults.pending_ttl),
            committed_ttl: env_or("COMMITTED_TTL", defaults.committed_ttl),
            commit_policy: env_or("COMMIT_POLICY", defaults.commit_policy),
            oidc_audience: env_opt("OIDC_AUDIENCE").unwrap_or(defaults.oidc_audience),
            oidc_mode: env_or("OIDC_MODE", defaults.oidc_mode),
            jwks_refresh_interval: env_or("JWKS_REFRESH_INTERVAL", defaults.jwks_refresh_interval),
            admin_token: env_opt("ADMIN_TOKEN"),
        }
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl)
    }

    pub fn committed_ttl(&self) -> Duration {
        Duration::from_secs(self.committed_ttl)
    }

    pub fn presign_expiry(&self) -> Duration {
        Duration::from_secs(self.presign_expiry)
    }

    pub fn jwks_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.jwks_refresh_interval)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cleanup_interval: 60,
            public_base_url: "http://127.0.0.1:3000".to_string(),
            blob_signing_secret: None,
            presign_expiry: 3600,
            min_part_size: MIN_PART_SIZE,
            pending_ttl: 30 * 60,
            committed_ttl: 24 * 60 * 60,
            commit_policy: CommitPolicy::Overwrite,
            oidc_audience: "artifact-cache".to_string(),
            oidc_mode: OidcMode::Static,
            jwks_refresh_interval: 3600,
            admin_token: None,
        }
    }
}

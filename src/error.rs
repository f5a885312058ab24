//! Error types for the cache service
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

use crate::models::ErrorResponse;

// == Auth Error Enum ==
/// Reasons an inbound ID token was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("missing X-Provider header")]
    MissingProvider,

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("unknown issuer: {0}")]
    UnknownIssuer(String),

    #[error("token issuer belongs to {actual}, request named {expected}")]
    ProviderMismatch { expected: String, actual: String },

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("key set fetch failed: {0}")]
    KeyFetch(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("issuer mismatch")]
    IssuerMismatch,

    #[error("claims unparsable: {0}")]
    ClaimsUnparsable(String),
}

// == Cache Error Enum ==
/// Unified error type for the cache service.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Token missing, malformed or unverifiable
    #[error("unauthenticated: {0}")]
    Unauthenticated(#[from] AuthError),

    /// Tenant not provisioned or not owned by the caller
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Record or object missing
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate stable key or tenant
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Invalid request data
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Dependency failure (index, object store, serialization)
    #[error("internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Connect-style error code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            CacheError::Unauthenticated(_) => "unauthenticated",
            CacheError::PermissionDenied(_) => "permission_denied",
            CacheError::NotFound(_) => "not_found",
            CacheError::AlreadyExists(_) => "already_exists",
            CacheError::InvalidRequest(_) => "invalid_argument",
            CacheError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            CacheError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            CacheError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::AlreadyExists(_) => StatusCode::CONFLICT,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Internal(format!("record serialization: {}", err))
    }
}

// == API Error ==
/// A `CacheError` tagged with the RPC operation that produced it.
///
/// The full error is logged server-side; the response body only names the
/// operation so internal state never reaches the caller.
#[derive(Debug)]
pub struct ApiError {
    pub operation: &'static str,
    pub source: CacheError,
}

impl ApiError {
    pub fn new(operation: &'static str, source: CacheError) -> Self {
        Self { operation, source }
    }

    /// Adapter for `map_err`.
    pub fn scoped(operation: &'static str) -> impl FnOnce(CacheError) -> ApiError {
        move |source| ApiError::new(operation, source)
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.source.status();
        if status.is_server_error() {
            error!(operation = self.operation, error = %self.source, "rpc failed");
        } else {
            warn!(operation = self.operation, error = %self.source, "rpc rejected");
        }

        let message = match &self.source {
            CacheError::InvalidRequest(msg) => format!("{} failed: {}", self.operation, msg),
            _ => format!("{} failed", self.operation),
        };

        let body = Json(ErrorResponse::new(self.source.code(), message));
        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache service.
pub type Result<T> = std::result::Result<T, CacheError>;

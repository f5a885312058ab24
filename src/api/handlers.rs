//! API Handlers
//!
//! RPC handlers for the cache and tenant services. Each handler opens a
//! trace context, runs the coordinator operation inside it and scopes any
//! error to the operation name.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    Json,
};
use sha2::{Digest, Sha256};
use tracing::Instrument;

use crate::auth::{TokenVerifier, VerifiedCaller};
use crate::coordinator::CacheCoordinator;
use crate::error::{ApiError, AuthError, CacheError};
use crate::models::{
    CheckEntryRequest, CheckEntryResponse, CreateEntryRequest, CreateEntryResponse,
    CreateTenantRequest, CreateTenantResponse, GetEntryRequest, GetEntryResponse,
    GetTenantRequest, GetTenantResponse, HealthResponse, ProviderType, UpdateEntryRequest,
    UpdateEntryResponse,
};
use crate::storage::LocalObjectStore;
use crate::telemetry::Tracer;

/// Header naming which CI provider issued the bearer token.
pub const PROVIDER_HEADER: &str = "x-provider";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: CacheCoordinator,
    pub verifier: Arc<dyn TokenVerifier>,
    /// Audience every ID token must carry
    pub audience: Arc<str>,
    pub tracer: Tracer,
    /// Bearer for tenant provisioning; tenant RPCs are refused when None
    pub admin_token: Option<Arc<str>>,
    /// Backing store for the presigned `/blobs` routes
    pub blobs: Arc<LocalObjectStore>,
}

impl AppState {
    pub fn new(
        coordinator: CacheCoordinator,
        verifier: Arc<dyn TokenVerifier>,
        blobs: Arc<LocalObjectStore>,
        audience: &str,
    ) -> Self {
        Self {
            coordinator,
            verifier,
            audience: Arc::from(audience),
            tracer: Tracer::new("artifact-cache"),
            admin_token: None,
            blobs,
        }
    }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token.map(Arc::from);
        self
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// == Extractors ==
/// A caller whose ID token passed verification.
#[derive(Debug, Clone)]
pub struct AuthenticatedCaller(pub VerifiedCaller);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let reject = |e: AuthError| ApiError::new("authenticate", CacheError::Unauthenticated(e));

        let token = bearer(&parts.headers).ok_or_else(|| reject(AuthError::MissingToken))?;
        let provider = parts
            .headers
            .get(PROVIDER_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| reject(AuthError::MissingProvider))?
            .parse::<ProviderType>()
            .map_err(|e| reject(AuthError::UnknownProvider(e)))?;

        let caller = state
            .verifier
            .validate(token, provider, &state.audience)
            .await
            .map_err(reject)?;
        Ok(AuthenticatedCaller(caller))
    }
}

/// Holder of the provisioning token.
#[derive(Debug, Clone, Copy)]
pub struct AdminCaller;

#[async_trait]
impl FromRequestParts<AppState> for AdminCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let Some(expected) = state.admin_token.as_deref() else {
            return Err(ApiError::new(
                "authorize admin",
                CacheError::PermissionDenied("tenant provisioning disabled".to_string()),
            ));
        };
        let token = bearer(&parts.headers).ok_or_else(|| {
            ApiError::new(
                "authorize admin",
                CacheError::Unauthenticated(AuthError::MissingToken),
            )
        })?;

        // Compare digests so the comparison time does not depend on the prefix
        if Sha256::digest(token.as_bytes()) != Sha256::digest(expected.as_bytes()) {
            return Err(ApiError::new(
                "authorize admin",
                CacheError::PermissionDenied("invalid admin token".to_string()),
            ));
        }
        Ok(AdminCaller)
    }
}

// == Cache Service ==
pub async fn check_entry_handler(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Json(req): Json<CheckEntryRequest>,
) -> Result<Json<CheckEntryResponse>, ApiError> {
    let ctx = state.tracer.request("CheckEntry");
    let span = ctx.span().clone();
    state
        .coordinator
        .check_entry(&ctx, Some(&caller), &req)
        .instrument(span)
        .await
        .map(Json)
        .map_err(ApiError::scoped("check entry"))
}

pub async fn create_entry_handler(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Json(req): Json<CreateEntryRequest>,
) -> Result<Json<CreateEntryResponse>, ApiError> {
    let ctx = state.tracer.request("CreateEntry");
    let span = ctx.span().clone();
    state
        .coordinator
        .create_entry(&ctx, Some(&caller), &req)
        .instrument(span)
        .await
        .map(Json)
        .map_err(ApiError::scoped("create entry"))
}

pub async fn update_entry_handler(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Json(req): Json<UpdateEntryRequest>,
) -> Result<Json<UpdateEntryResponse>, ApiError> {
    let ctx = state.tracer.request("UpdateEntry");
    let span = ctx.span().clone();
    state
        .coordinator
        .update_entry(&ctx, Some(&caller), &req)
        .instrument(span)
        .await
        .map(Json)
        .map_err(ApiError::scoped("update entry"))
}

pub async fn get_entry_handler(
    State(state): State<AppState>,
    AuthenticatedCaller(caller): AuthenticatedCaller,
    Json(req): Json<GetEntryRequest>,
) -> Result<Json<GetEntryResponse>, ApiError> {
    let ctx = state.tracer.request("GetEntry");
    let span = ctx.span().clone();
    state
        .coordinator
        .get_entry(&ctx, Some(&caller), &req)
        .instrument(span)
        .await
        .map(Json)
        .map_err(ApiError::scoped("get entry"))
}

// == Tenant Service ==
pub async fn create_tenant_handler(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Json(req): Json<CreateTenantRequest>,
) -> Result<Json<CreateTenantResponse>, ApiError> {
    let ctx = state.tracer.request("CreateTenant");
    let span = ctx.span().clone();
    state
        .coordinator
        .create_tenant(&ctx, &req)
        .instrument(span)
        .await
        .map(Json)
        .map_err(ApiError::scoped("create tenant"))
}

pub async fn get_tenant_handler(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Json(req): Json<GetTenantRequest>,
) -> Result<Json<GetTenantResponse>, ApiError> {
    let ctx = state.tracer.request("GetTenant");
    let span = ctx.span().clone();
    state
        .coordinator
        .get_tenant(&ctx, &req)
        .instrument(span)
        .await
        .map(Json)
        .map_err(ApiError::scoped("get tenant"))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer(&headers).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer(&headers), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert!(bearer(&headers).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer(&headers).is_none());
    }
}

//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use super::blobs::{get_blob_handler, put_blob_handler};
use super::handlers::{
    check_entry_handler, create_entry_handler, create_tenant_handler, get_entry_handler,
    get_tenant_handler, health_handler, update_entry_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `POST /cache.v1.CacheService/{CheckEntry,CreateEntry,UpdateEntry,GetEntry}`
/// - `POST /cache.v1.TenantService/{CreateTenant,GetTenant}`
/// - `PUT|GET /blobs/:key` - Presigned object transfers
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/cache.v1.CacheService/CheckEntry", post(check_entry_handler))
        .route("/cache.v1.CacheService/CreateEntry", post(create_entry_handler))
        .route("/cache.v1.CacheService/UpdateEntry", post(update_entry_handler))
        .route("/cache.v1.CacheService/GetEntry", post(get_entry_handler))
        .route("/cache.v1.TenantService/CreateTenant", post(create_tenant_handler))
        .route("/cache.v1.TenantService/GetTenant", post(get_tenant_handler))
        .route(
            "/blobs/:key",
            put(put_blob_handler)
                .get(get_blob_handler)
                .layer(DefaultBodyLimit::disable()),
        )
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{TokenVerifier, VerifiedCaller};
    use crate::coordinator::{CacheCoordinator, CoordinatorSettings};
    use crate::error::AuthError;
    use crate::index::{Index, MemoryIndexStore};
    use crate::models::{ErrorResponse, ProviderType};
    use crate::planner::TransferPlanner;
    use crate::storage::{LocalObjectStore, ObjectStore, UrlSigner};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tower::util::ServiceExt;

    /// Rejects every token.
    struct DenyAll;

    #[async_trait]
    impl TokenVerifier for DenyAll {
        async fn validate(
            &self,
            _token: &str,
            _provider: ProviderType,
            _audience: &str,
        ) -> Result<VerifiedCaller, AuthError> {
            Err(AuthError::InvalidSignature("test".to_string()))
        }
    }

    fn create_test_app() -> (Router, Arc<LocalObjectStore>) {
        let index = Index::new(Arc::new(MemoryIndexStore::new()));
        let blobs = Arc::new(LocalObjectStore::new(
            "http://127.0.0.1:3000",
            UrlSigner::new("secret"),
            Duration::from_secs(60),
        ));
        let planner = TransferPlanner::new(blobs.clone(), 1024);
        let coordinator =
            CacheCoordinator::new(index, blobs.clone(), planner, CoordinatorSettings::default());
        let state = AppState::new(coordinator, Arc::new(DenyAll), blobs.clone(), "artifact-cache")
            .with_admin_token(Some("admin-secret".to_string()));
        (create_router(state), blobs)
    }

    /// Path and query of a presigned URL.
    fn local_path(url: &str) -> String {
        url.trim_start_matches("http://127.0.0.1:3000").to_string()
    }

    async fn body_json(response: axum::response::Response) -> ErrorResponse {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cache_rpc_requires_bearer() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/cache.v1.CacheService/CheckEntry")
                    .header("content-type", "application/json")
                    .header("x-provider", "github-actions")
                    .body(Body::from(
                        r#"{"owner":"acme","providerType":"github-actions","key":"deps"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body.code, "unauthenticated");
        assert_eq!(body.message, "authenticate failed");
    }

    #[tokio::test]
    async fn test_cache_rpc_rejected_token() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/cache.v1.CacheService/GetEntry")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer a.b.c")
                    .header("x-provider", "gitlab")
                    .body(Body::from(
                        r#"{"owner":"acme","providerType":"gitlab","key":"deps"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_tenant_rpc_requires_admin_token() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/cache.v1.TenantService/CreateTenant")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer wrong")
                    .body(Body::from(
                        r#"{"id":"t-1","providerType":"gitlab","owner":"acme"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_create_and_get_tenant() {
        let (app, _) = create_test_app();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/cache.v1.TenantService/CreateTenant")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer admin-secret")
                    .body(Body::from(
                        r#"{"id":"t-1","providerType":"gitlab","owner":"acme"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/cache.v1.TenantService/GetTenant")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer admin-secret")
                    .body(Body::from(r#"{"id":"t-1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_blob_put_requires_content_length() {
        let (app, blobs) = create_test_app();
        let url = blobs
            .presign_put("acme/gitlab/deps", &Default::default())
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(local_path(&url))
                    .body(Body::from("data"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::LENGTH_REQUIRED);
    }

    #[tokio::test]
    async fn test_blob_put_rejects_tampered_signature() {
        let (app, blobs) = create_test_app();
        let url = blobs
            .presign_put("acme/gitlab/deps", &Default::default())
            .await
            .unwrap();
        let tampered = local_path(&url).replace("deps", "other");

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(tampered)
                    .header("content-length", "4")
                    .body(Body::from("data"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_single_put_keeps_declared_compression() {
        let (app, blobs) = create_test_app();
        let key = "acme/gitlab/deps";
        let attributes = crate::storage::ObjectAttributes {
            sha256: String::new(),
            compression: "zstd".to_string(),
        };
        let put_url = blobs.presign_put(key, &attributes).await.unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(local_path(&put_url))
                    .header("content-length", "4")
                    .body(Body::from("data"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let meta = blobs.head_object(key).await.unwrap().unwrap();
        assert_eq!(meta.compression.as_deref(), Some("zstd"));
    }

    #[tokio::test]
    async fn test_blob_put_then_ranged_get() {
        let (app, blobs) = create_test_app();
        let key = "acme/gitlab/deps";
        let put_url = blobs.presign_put(key, &Default::default()).await.unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(local_path(&put_url))
                    .header("content-length", "10")
                    .body(Body::from("0123456789"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("etag"));

        let offset = crate::models::Offset {
            part: 2,
            start: 4,
            end: 7,
        };
        let get_url = blobs.presign_get(key, Some(offset)).await.unwrap();
        let response = app
            .oneshot(
                Request::builder()
                    .uri(local_path(&get_url))
                    .header("range", offset.range_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers().get("content-range").unwrap(),
            "bytes 4-7/10"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"4567");
    }
}

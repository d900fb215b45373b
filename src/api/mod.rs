/// API routes and handlers
pub mod analytics;
pub mod health;
pub mod upload;

use crate::{context::AppContext, metrics};
use axum::{http::header, response::IntoResponse, routing::get, Router};

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(upload::routes())
        .merge(analytics::routes())
        .merge(health::routes())
        .route("/metrics", get(metrics_handler))
}

/// Prometheus text exposition
async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::{
        auth::{issue_token, ADMIN_ROLE},
        config::ServerConfig,
        context::AppContext,
        server::build_router,
        upload::pipeline::tests::FakeCompressor,
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use std::{path::Path, sync::Arc};
    use tower::ServiceExt;

    pub(crate) async fn test_context(dir: &Path, compressor: FakeCompressor) -> AppContext {
        AppContext::with_compressor(ServerConfig::for_tests(dir), Arc::new(compressor))
            .await
            .unwrap()
    }

    pub(crate) fn admin_token(ctx: &AppContext) -> String {
        issue_token(
            &ctx.config.authentication.jwt_secret,
            "admin@example.com",
            ADMIN_ROLE,
            chrono::Duration::hours(1),
        )
        .unwrap()
    }

    pub(crate) async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path(), FakeCompressor::unavailable()).await;
        crate::metrics::record_upload("stored");

        let response = build_router(ctx)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("pdf_uploads_total"));
    }

    #[tokio::test]
    async fn test_health_probes() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path(), FakeCompressor::unavailable()).await;
        let app = build_router(ctx);

        for uri in ["/health/live", "/health/ready"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["checks"][0]["name"], "database");
        assert_eq!(json["checks"][0]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_health_hides_paths_and_error_text() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path(), FakeCompressor::unavailable()).await;
        let app = build_router(ctx.clone());

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let text = body_json(response).await.to_string();
        assert!(!text.contains(&*dir.path().to_string_lossy()), "{text}");

        // A regular file where the upload directory belongs fails the storage check
        let root = ctx.blob_store.root().to_path_buf();
        std::fs::remove_dir_all(&root).unwrap();
        std::fs::write(&root, b"not a directory").unwrap();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["checks"][1]["name"], "upload_storage");
        assert_eq!(json["checks"][1]["status"], "unhealthy");
        assert_eq!(json["checks"][1]["error"], "check failed");
        assert!(!json.to_string().contains(&*dir.path().to_string_lossy()));

        let response = app
            .oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unknown_route_returns_json_404() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path(), FakeCompressor::unavailable()).await;

        let response = build_router(ctx)
            .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_json(response).await["error"].is_string());
    }
}

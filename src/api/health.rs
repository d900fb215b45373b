/// Health check endpoints for liveness and readiness probes
///
/// Readiness requires the database and the upload directory to be usable.
/// The compressor is reported but never makes the service unready, since
/// uploads fall back to storing originals.
use crate::{context::AppContext, error::CmsResult};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Name of the probe file written during the storage check
const PROBE_FILE: &str = ".health-probe";

/// Reported in place of the underlying error, which goes to the log
const CHECK_FAILED: &str = "check failed";

/// Health status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall status: "healthy", "degraded", or "unhealthy"
    pub status: String,
    pub version: String,
    pub checks: Vec<ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Health status of individual component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ComponentHealth {
    fn from_result(name: &str, start: Instant, result: CmsResult<()>, failed: &str) -> Self {
        let response_time_ms = Some(start.elapsed().as_millis() as u64);
        match result {
            Ok(()) => Self {
                name: name.to_string(),
                status: "healthy".to_string(),
                response_time_ms,
                error: None,
                details: None,
            },
            Err(e) => {
                tracing::warn!(component = name, error = %e, "health_check_failed");
                Self {
                    name: name.to_string(),
                    status: failed.to_string(),
                    response_time_ms,
                    error: Some(CHECK_FAILED.to_string()),
                    details: None,
                }
            }
        }
    }
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_detailed))
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
}

/// Liveness probe
///
/// If we can respond, we're alive.
pub async fn liveness_probe() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness probe - 200 when the database and upload directory are usable
pub async fn readiness_probe(
    State(ctx): State<AppContext>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if let Err(e) = check_database(&ctx).await {
        tracing::warn!(error = %e, "readiness_probe_failed: database check failed");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    if let Err(e) = check_upload_storage(&ctx).await {
        tracing::warn!(error = %e, "readiness_probe_failed: upload storage check failed");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(serde_json::json!({
        "status": "ready",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

/// Detailed health check with all component statuses
pub async fn health_detailed(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let start = Instant::now();

    let mut checks = Vec::new();

    let db_start = Instant::now();
    let mut database = ComponentHealth::from_result(
        "database",
        db_start,
        check_database(&ctx).await,
        "unhealthy",
    );
    database.details = Some(serde_json::json!({
        "type": "sqlite",
        "pool_size": ctx.db.size(),
    }));
    checks.push(database);

    let storage_start = Instant::now();
    let mut storage = ComponentHealth::from_result(
        "upload_storage",
        storage_start,
        check_upload_storage(&ctx).await,
        "unhealthy",
    );
    // Filesystem layout is only shown to local developers
    if ctx.config.service.development {
        storage.details = Some(serde_json::json!({
            "root": ctx.blob_store.root().display().to_string(),
        }));
    }
    checks.push(storage);

    checks.push(check_compressor(&ctx).await);

    let overall_status = determine_overall_status(&checks);

    let health = HealthStatus {
        status: overall_status.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks,
        message: if overall_status == "healthy" {
            None
        } else {
            Some("One or more components are unhealthy".to_string())
        },
    };

    let status_code = match overall_status.as_str() {
        "healthy" | "degraded" => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };

    tracing::debug!(
        status = %overall_status,
        duration_ms = start.elapsed().as_millis() as u64,
        "health_check_completed"
    );

    (status_code, Json(health))
}

async fn check_database(ctx: &AppContext) -> CmsResult<()> {
    crate::db::test_connection(&ctx.db).await
}

/// Write and remove a probe file in the upload directory
async fn check_upload_storage(ctx: &AppContext) -> CmsResult<()> {
    let probe = ctx.blob_store.root().join(PROBE_FILE);
    tokio::fs::create_dir_all(ctx.blob_store.root()).await?;
    tokio::fs::write(&probe, b"ok").await?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

/// Compressor availability; missing Ghostscript only degrades the service
async fn check_compressor(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();
    let status = ctx.upload_pipeline.compression_status().await;

    ComponentHealth {
        name: "compressor".to_string(),
        status: if status.ghostscript_available || !ctx.config.compression.enabled {
            "healthy"
        } else {
            "degraded"
        }
        .to_string(),
        response_time_ms: Some(start.elapsed().as_millis() as u64),
        error: None,
        details: serde_json::to_value(&status).ok(),
    }
}

/// Determine overall health status from individual checks
fn determine_overall_status(checks: &[ComponentHealth]) -> String {
    if checks.iter().any(|c| c.status == "unhealthy") {
        "unhealthy".to_string()
    } else if checks.iter().any(|c| c.status == "degraded") {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}

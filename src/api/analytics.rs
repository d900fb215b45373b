/// App-open analytics endpoints
use crate::{
    analytics::AppOpenSummary,
    auth::AdminAuthContext,
    context::AppContext,
    error::{CmsError, CmsResult},
    metrics,
    rate_limit::ClientKey,
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Build analytics routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/analytics/app-open", post(record_app_open))
        .route("/api/analytics/app-opens", get(app_open_summary))
}

/// Optional beacon body
#[derive(Debug, Default, Deserialize)]
pub struct AppOpenRequest {
    pub platform: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppOpenResponse {
    pub success: bool,
    pub platform: String,
}

/// Record an app open
///
/// Public, limited per client key by the fixed-window limiter. The body is
/// optional; a missing or malformed body records an "unknown" platform.
async fn record_app_open(
    State(ctx): State<AppContext>,
    client: ClientKey,
    body: Option<Json<AppOpenRequest>>,
) -> CmsResult<(StatusCode, Json<AppOpenResponse>)> {
    let limits = &ctx.config.rate_limit;
    let window = Duration::from_millis(limits.app_open_window_ms);

    if limits.enabled
        && ctx
            .app_open_limiter
            .check_and_increment(&client.0, limits.app_open_max_requests, window)
    {
        metrics::record_rate_limited("app_open");
        tracing::warn!(client = %client.0, "App-open rate limit exceeded");
        return Err(CmsError::RateLimitExceeded { retry_after: window });
    }

    let request = body.map(|Json(b)| b).unwrap_or_default();
    let event = ctx
        .analytics
        .record_app_open(request.platform.as_deref(), &client.0)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AppOpenResponse {
            success: true,
            platform: event.platform,
        }),
    ))
}

async fn app_open_summary(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
) -> CmsResult<Json<AppOpenSummary>> {
    Ok(Json(ctx.analytics.summary(chrono::Utc::now()).await?))
}

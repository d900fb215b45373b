/// Metrics and telemetry for the Curricula content API
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - PDF uploads and compression results
/// - File deletions
/// - Rate limit rejections
/// - App-open beacons
/// - Background job execution

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ========== Upload Metrics ==========

    /// PDF uploads by outcome (stored, compressed, rejected, failed)
    pub static ref UPLOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "pdf_uploads_total",
        "Total number of PDF uploads",
        &["outcome"]
    )
    .unwrap();

    /// Compression attempts by result
    pub static ref COMPRESSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "pdf_compressions_total",
        "Total number of PDF compression attempts",
        &["result"]
    )
    .unwrap();

    /// Bytes saved by compression
    pub static ref COMPRESSION_BYTES_SAVED_TOTAL: IntCounter = register_int_counter!(
        "pdf_compression_bytes_saved_total",
        "Total bytes saved by PDF compression"
    )
    .unwrap();

    /// File deletions by whether the file existed
    pub static ref FILE_DELETIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "file_deletions_total",
        "Total number of stored file deletions",
        &["found"]
    )
    .unwrap();

    // ========== Rate Limit Metrics ==========

    /// Requests rejected by a rate limiter
    pub static ref RATE_LIMITED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rate_limited_requests_total",
        "Total number of requests rejected by rate limiting",
        &["scope"]
    )
    .unwrap();

    // ========== Analytics Metrics ==========

    /// App-open beacons by platform
    pub static ref APP_OPENS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "app_opens_total",
        "Total number of recorded app opens",
        &["platform"]
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    /// Background job duration in seconds
    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "background_job_duration_seconds",
        "Background job execution time in seconds",
        &["job_type"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record an upload outcome
pub fn record_upload(outcome: &str) {
    UPLOADS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a compression attempt
pub fn record_compression(result: &str, original_size: u64, compressed_size: u64) {
    COMPRESSIONS_TOTAL.with_label_values(&[result]).inc();
    if result == "succeeded" {
        COMPRESSION_BYTES_SAVED_TOTAL.inc_by(original_size.saturating_sub(compressed_size));
    }
}

/// Record a file deletion
pub fn record_file_deletion(found: bool) {
    FILE_DELETIONS_TOTAL
        .with_label_values(&[if found { "yes" } else { "no" }])
        .inc();
}

/// Record a rate-limited request
pub fn record_rate_limited(scope: &str) {
    RATE_LIMITED_TOTAL.with_label_values(&[scope]).inc();
}

/// Record an app open
pub fn record_app_open(platform: &str) {
    APP_OPENS_TOTAL.with_label_values(&[platform]).inc();
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str, duration: f64) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration);
}

/// Background task implementations
use crate::{context::AppContext, error::CmsResult, metrics};
use std::time::{Duration, Instant};

/// Evict expired app-open rate-limit windows
pub fn sweep_rate_limits(ctx: &AppContext) -> usize {
    let start = Instant::now();
    let removed = ctx.app_open_limiter.sweep();
    metrics::record_background_job("rate_limit_sweep", "success", start.elapsed().as_secs_f64());
    removed
}

/// Remove staging files older than the configured TTL
pub async fn cleanup_staging_files(ctx: &AppContext) -> CmsResult<u64> {
    let start = Instant::now();
    let ttl = Duration::from_secs(ctx.config.storage.staging_ttl_secs);

    let result = ctx.blob_store.cleanup_staging(ttl).await;

    let status = if result.is_ok() { "success" } else { "error" };
    metrics::record_background_job("staging_cleanup", status, start.elapsed().as_secs_f64());

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::tests::test_context, upload::pipeline::tests::FakeCompressor};

    #[tokio::test]
    async fn test_sweep_keeps_active_windows() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path(), FakeCompressor::unavailable()).await;

        ctx.app_open_limiter
            .check_and_increment("203.0.113.1", 3, Duration::from_secs(600));
        ctx.app_open_limiter
            .check_and_increment("203.0.113.2", 3, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(sweep_rate_limits(&ctx), 1);
        assert_eq!(ctx.app_open_limiter.len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = crate::config::ServerConfig::for_tests(dir.path());
        config.storage.staging_ttl_secs = 0;
        let ctx = crate::context::AppContext::with_compressor(
            config,
            std::sync::Arc::new(FakeCompressor::unavailable()),
        )
        .await
        .unwrap();

        let kept = ctx.blob_store.store(b"%PDF-1.4", "pdf", "a.pdf").await.unwrap();
        ctx.blob_store
            .store_as(&format!("temp-{}", kept.name), b"staged")
            .await
            .unwrap();

        assert_eq!(cleanup_staging_files(&ctx).await.unwrap(), 1);
        assert!(ctx.blob_store.stat(&kept.name).await.unwrap().is_some());

        // Default TTL leaves fresh staging files alone
        let ctx = test_context(dir.path(), FakeCompressor::unavailable()).await;
        ctx.blob_store
            .store_as(&format!("compressed-{}", kept.name), b"out")
            .await
            .unwrap();
        assert_eq!(cleanup_staging_files(&ctx).await.unwrap(), 0);
    }
}

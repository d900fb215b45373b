/// Application context and dependency injection
use crate::{
    analytics::AnalyticsStore,
    blob_store::LocalBlobStore,
    compression::{GhostscriptCompressor, PdfCompressor},
    config::ServerConfig,
    db,
    error::{CmsError, CmsResult},
    rate_limit::{GlobalRateLimiter, WindowRateLimiter},
    upload::{UploadPipeline, UploadPolicy},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub blob_store: Arc<LocalBlobStore>,
    pub upload_pipeline: Arc<UploadPipeline>,
    // Rate limiters
    pub global_rate_limiter: Arc<GlobalRateLimiter>,
    pub app_open_limiter: Arc<WindowRateLimiter>,
    pub analytics: Arc<AnalyticsStore>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> CmsResult<Self> {
        let compressor = Arc::new(GhostscriptCompressor::from_config(&config.compression));
        Self::with_compressor(config, compressor).await
    }

    /// Create a context around a specific compressor implementation
    pub async fn with_compressor(
        config: ServerConfig,
        compressor: Arc<dyn PdfCompressor>,
    ) -> CmsResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directories if they don't exist
        Self::ensure_directories(&config).await?;

        let db = db::create_pool(&config.database.path, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let blob_store = Arc::new(LocalBlobStore::new(
            &config.storage.upload_directory,
            &config.service.base_url,
        )?);

        let upload_pipeline = Arc::new(UploadPipeline::new(
            blob_store.clone(),
            compressor,
            UploadPolicy::from_config(&config)?,
        ));

        let global_rate_limiter = Arc::new(GlobalRateLimiter::new(
            config.rate_limit.global_requests_per_minute,
        ));
        let app_open_limiter = Arc::new(WindowRateLimiter::new());
        let analytics = Arc::new(AnalyticsStore::new(db.clone()));

        tracing::info!(
            upload_directory = %blob_store.root().display(),
            compression_enabled = config.compression.enabled,
            "Application context initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            db,
            blob_store,
            upload_pipeline,
            global_rate_limiter,
            app_open_limiter,
            analytics,
        })
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> CmsResult<()> {
        let dir = &config.storage.upload_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                CmsError::StorageWrite(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> &str {
        &self.config.service.base_url
    }
}

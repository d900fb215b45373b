/// Upload orchestration
use crate::{
    blob_store::{
        LocalBlobStore, StoredFile, COMPRESSED_PREFIX, MANAGED_EXTENSION, PDF_MIME_TYPE,
        TEMP_PREFIX,
    },
    compression::{CompressionOptions, CompressionOutcome, PdfCompressor},
    config::ServerConfig,
    error::{CmsError, CmsResult},
    metrics,
    upload::{is_explicit_false, ResourceRecord},
};
use serde::Serialize;
use std::sync::Arc;
use tokio::fs;

/// Base for generated storage names
const UPLOAD_NAME_BASE: &str = "pdf";

/// Filename hint for name generation
///
/// Every accepted upload is a PDF, so the stored name always carries the
/// managed extension whatever the client called the file.
fn storage_name_hint() -> String {
    format!("{}.{}", UPLOAD_NAME_BASE, MANAGED_EXTENSION)
}

/// One upload as received from the client
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub original_name: String,
    /// Raw value of the optional `compress` form field
    pub compress: Option<String>,
}

/// Limits and switches applied to every upload
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    /// Uploads of this size or larger are rejected
    pub max_upload_bytes: usize,
    /// Uploads larger than this are compressed even when the caller opts out
    pub auto_compress_threshold_bytes: usize,
    pub compression_enabled: bool,
    pub options: CompressionOptions,
}

impl UploadPolicy {
    pub fn from_config(config: &ServerConfig) -> CmsResult<Self> {
        Ok(Self {
            max_upload_bytes: config.storage.max_upload_bytes,
            auto_compress_threshold_bytes: config.compression.auto_compress_threshold_bytes,
            compression_enabled: config.compression.enabled,
            options: CompressionOptions::new(
                config.compression.quality.parse()?,
                &config.compression.compatibility_level,
            )?,
        })
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_upload_bytes: 30 * 1024 * 1024,
            auto_compress_threshold_bytes: 2 * 1024 * 1024,
            compression_enabled: true,
            options: CompressionOptions::default(),
        }
    }
}

/// Result of a completed upload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub locator: String,
    pub name: String,
    pub original_name: String,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_ratio_percent: Option<i64>,
    /// Set when compression was attempted and fell back to the original
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl UploadOutcome {
    fn uncompressed(file: StoredFile, original_name: String, warning: Option<String>) -> Self {
        Self {
            locator: file.locator,
            name: file.name,
            original_name,
            size_bytes: file.size_bytes,
            original_size_bytes: None,
            compression_ratio_percent: None,
            warning,
        }
    }
}

/// Compressor availability as reported to clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionStatus {
    pub ghostscript_available: bool,
    pub compression_enabled: bool,
    pub message: String,
}

/// Upload pipeline service
pub struct UploadPipeline {
    store: Arc<LocalBlobStore>,
    compressor: Arc<dyn PdfCompressor>,
    policy: UploadPolicy,
}

impl UploadPipeline {
    pub fn new(
        store: Arc<LocalBlobStore>,
        compressor: Arc<dyn PdfCompressor>,
        policy: UploadPolicy,
    ) -> Self {
        Self {
            store,
            compressor,
            policy,
        }
    }

    /// Reject wrong media types, oversized and empty payloads
    pub fn validate(&self, request: &UploadRequest) -> CmsResult<()> {
        if !request.mime_type.trim().eq_ignore_ascii_case(PDF_MIME_TYPE) {
            return Err(CmsError::UnsupportedMediaType(format!(
                "Only PDF files are allowed (got {})",
                request.mime_type
            )));
        }

        if request.data.len() >= self.policy.max_upload_bytes {
            return Err(CmsError::PayloadTooLarge(format!(
                "File must be smaller than {} MB",
                self.policy.max_upload_bytes / (1024 * 1024)
            )));
        }

        if request.data.is_empty() {
            return Err(CmsError::Validation("Uploaded file is empty".to_string()));
        }

        Ok(())
    }

    /// Whether this upload should go through the compressor
    pub async fn should_compress(&self, flag: Option<&str>, size: usize) -> bool {
        if !self.policy.compression_enabled {
            return false;
        }

        let requested =
            !is_explicit_false(flag) || size > self.policy.auto_compress_threshold_bytes;
        if !requested {
            return false;
        }

        let available = self.compressor.is_available().await;
        if !available {
            tracing::info!(size, "Compressor unavailable, storing upload uncompressed");
        }
        available
    }

    /// Run one upload through the pipeline
    pub async fn upload(&self, request: UploadRequest) -> CmsResult<UploadOutcome> {
        if let Err(e) = self.validate(&request) {
            metrics::record_upload("rejected");
            return Err(e);
        }

        let size = request.data.len();
        let compress = self
            .should_compress(request.compress.as_deref(), size)
            .await;

        tracing::info!(
            original_name = %request.original_name,
            size,
            compress,
            "Processing PDF upload"
        );

        let result = if compress {
            self.upload_compressed(request).await
        } else {
            self.store
                .store(&request.data, UPLOAD_NAME_BASE, &storage_name_hint())
                .await
                .map(|file| UploadOutcome::uncompressed(file, request.original_name, None))
        };

        match &result {
            Ok(outcome) => {
                metrics::record_upload(if outcome.compression_ratio_percent.is_some() {
                    "compressed"
                } else {
                    "stored"
                });
                tracing::info!(
                    name = %outcome.name,
                    size = outcome.size_bytes,
                    ratio_percent = ?outcome.compression_ratio_percent,
                    "PDF upload stored"
                );
            }
            Err(e) => {
                metrics::record_upload("failed");
                tracing::error!(error = %e, "PDF upload failed");
            }
        }

        result
    }

    /// Stage the original, compress it, and settle on a final file
    async fn upload_compressed(&self, request: UploadRequest) -> CmsResult<UploadOutcome> {
        let final_name = LocalBlobStore::generate_name(UPLOAD_NAME_BASE, &storage_name_hint());
        let temp_name = format!("{}{}", TEMP_PREFIX, final_name);
        let compressed_name = format!("{}{}", COMPRESSED_PREFIX, final_name);

        let staged = self.store.store_as(&temp_name, &request.data).await?;

        let outcome = match self.run_compressor(&temp_name, &compressed_name).await {
            Ok(outcome) => outcome,
            Err(e) => CompressionOutcome::failure(staged.size_bytes, e.to_string()),
        };

        if outcome.succeeded && outcome.compressed_size_bytes < outcome.original_size_bytes {
            metrics::record_compression("succeeded", outcome.original_size_bytes, outcome.compressed_size_bytes);
            return self
                .persist_compressed(&final_name, &temp_name, &compressed_name, &outcome, request.original_name)
                .await;
        }

        let warning = if outcome.succeeded {
            metrics::record_compression("no_gain", outcome.original_size_bytes, outcome.compressed_size_bytes);
            tracing::info!(
                original_size = outcome.original_size_bytes,
                compressed_size = outcome.compressed_size_bytes,
                "Compression gave no reduction, keeping original"
            );
            None
        } else {
            metrics::record_compression("failed", outcome.original_size_bytes, outcome.original_size_bytes);
            let reason = outcome.error.clone().unwrap_or_default();
            tracing::warn!(error = %reason, "Compression failed, keeping original");
            Some("Compression failed, original file was stored uncompressed".to_string())
        };

        self.discard(&compressed_name).await;

        match self.store.rename(&temp_name, &final_name).await {
            Ok(file) => Ok(UploadOutcome::uncompressed(file, request.original_name, warning)),
            Err(e) => {
                self.discard(&temp_name).await;
                Err(e)
            }
        }
    }

    async fn run_compressor(
        &self,
        temp_name: &str,
        compressed_name: &str,
    ) -> CmsResult<CompressionOutcome> {
        let input = self.store.path_for(temp_name)?;
        let output = self.store.path_for(compressed_name)?;
        self.compressor
            .compress(&input, &output, &self.policy.options)
            .await
    }

    /// Store the compressor output under the final name and drop the staging files
    async fn persist_compressed(
        &self,
        final_name: &str,
        temp_name: &str,
        compressed_name: &str,
        outcome: &CompressionOutcome,
        original_name: String,
    ) -> CmsResult<UploadOutcome> {
        let stored = async {
            let compressed_path = self.store.path_for(compressed_name)?;
            let bytes = fs::read(&compressed_path).await.map_err(|e| {
                CmsError::StorageWrite(format!("Failed to read compressed output: {}", e))
            })?;
            self.store.store_as(final_name, &bytes).await
        }
        .await;

        self.discard(temp_name).await;
        self.discard(compressed_name).await;

        let file = stored?;

        Ok(UploadOutcome {
            locator: file.locator,
            name: file.name,
            original_name,
            size_bytes: file.size_bytes,
            original_size_bytes: Some(outcome.original_size_bytes),
            compression_ratio_percent: Some(outcome.ratio_percent),
            warning: None,
        })
    }

    /// Best-effort removal of a staging file; failures are logged only
    async fn discard(&self, name: &str) {
        if let Err(e) = self.store.delete(name).await {
            tracing::warn!(name = %name, error = %e, "Failed to clean up staging file");
        }
    }

    /// Delete a stored file by name or locator
    pub async fn delete_file(&self, reference: &str) -> CmsResult<bool> {
        let deleted = self.store.delete(reference).await?;
        metrics::record_file_deletion(deleted);
        Ok(deleted)
    }

    /// Release the stored file behind a resource that is about to be deleted
    ///
    /// PDF resources lose both their `file_name` and `locator`; other
    /// resource types are left untouched.
    pub async fn release_resource_file(&self, record: &mut ResourceRecord) -> CmsResult<bool> {
        if !record.is_stored_pdf() {
            return Ok(false);
        }

        let reference = match (&record.file_name, &record.locator) {
            (Some(name), _) => name.clone(),
            (None, Some(locator)) => locator.clone(),
            (None, None) => return Ok(false),
        };

        let deleted = self.delete_file(&reference).await?;
        record.file_name = None;
        record.locator = None;

        tracing::info!(resource_id = %record.id, deleted, "Released resource file");
        Ok(deleted)
    }

    /// Availability of compression for status reporting
    pub async fn compression_status(&self) -> CompressionStatus {
        let available = self.compressor.is_available().await;
        let enabled = available && self.policy.compression_enabled;

        let message = match (available, self.policy.compression_enabled) {
            (true, true) => "Ghostscript is available, PDF compression is enabled",
            (true, false) => "Ghostscript is available but PDF compression is disabled",
            (false, _) => "Ghostscript is not installed, PDFs are stored uncompressed",
        };

        CompressionStatus {
            ghostscript_available: available,
            compression_enabled: enabled,
            message: message.to_string(),
        }
    }
}

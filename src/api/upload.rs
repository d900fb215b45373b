/// PDF upload and file management endpoints
use crate::{
    auth::AdminAuthContext,
    blob_store::StoredFile,
    context::AppContext,
    error::{CmsError, CmsResult},
    upload::{CompressionStatus, UploadOutcome, UploadRequest},
};
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;

/// Multipart field carrying the document
const FILE_FIELD: &str = "pdf";

/// Multipart field carrying the compression flag
const COMPRESS_FIELD: &str = "compress";

/// Build upload routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/upload/pdf", post(upload_pdf))
        .route("/api/upload/pdf/:filename", delete(delete_pdf))
        .route("/api/upload/pdf/:filename/info", get(pdf_info))
        .route("/api/upload/pdfs", get(list_pdfs))
        .route("/api/upload/compression-status", get(compression_status))
}

/// Upload response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub file_id: String,
    pub file_name: String,
    pub original_name: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_ratio: Option<i64>,
    pub url: String,
    pub file_path: String,
    pub viewing_url: String,
    pub embedded_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<UploadOutcome> for UploadResponse {
    fn from(outcome: UploadOutcome) -> Self {
        let message = if outcome.compression_ratio_percent.is_some() {
            "PDF uploaded and compressed successfully"
        } else {
            "PDF uploaded successfully"
        };

        Self {
            message: message.to_string(),
            file_id: outcome.name.clone(),
            file_path: format!("/uploads/{}", outcome.name),
            viewing_url: format!("{}#view=FitH", outcome.locator),
            embedded_url: format!("{}#toolbar=0&navpanes=0", outcome.locator),
            url: outcome.locator,
            file_name: outcome.name,
            original_name: outcome.original_name,
            size: outcome.size_bytes,
            original_size: outcome.original_size_bytes,
            compression_ratio: outcome.compression_ratio_percent,
            warning: outcome.warning,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub files: Vec<StoredFile>,
    pub count: usize,
}

/// Map multipart read failures; body-limit rejections surface as 413
fn multipart_error(e: MultipartError) -> CmsError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        CmsError::PayloadTooLarge("File exceeds the upload size limit".to_string())
    } else {
        CmsError::Validation(format!("Malformed multipart body: {}", e.body_text()))
    }
}

/// Upload a PDF
///
/// Accepts `multipart/form-data` with the document in field `pdf` and an
/// optional boolean-like `compress` field.
async fn upload_pdf(
    State(ctx): State<AppContext>,
    admin: AdminAuthContext,
    mut multipart: Multipart,
) -> CmsResult<(StatusCode, Json<UploadResponse>)> {
    let mut file: Option<(Vec<u8>, String, String)> = None;
    let mut compress: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            FILE_FIELD => {
                if file.is_some() {
                    return Err(CmsError::Validation(
                        "Only one PDF may be uploaded per request".to_string(),
                    ));
                }
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let original_name = field.file_name().unwrap_or("document.pdf").to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                file = Some((data.to_vec(), mime_type, original_name));
            }
            COMPRESS_FIELD => {
                compress = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let (data, mime_type, original_name) =
        file.ok_or_else(|| CmsError::Validation("No file uploaded".to_string()))?;

    tracing::info!(
        admin = %admin.subject,
        original_name = %original_name,
        size = data.len(),
        "PDF upload received"
    );

    let outcome = ctx
        .upload_pipeline
        .upload(UploadRequest {
            data,
            mime_type,
            original_name,
            compress,
        })
        .await?;

    Ok((StatusCode::OK, Json(outcome.into())))
}

/// Delete a stored PDF; deleting a missing file still succeeds
async fn delete_pdf(
    State(ctx): State<AppContext>,
    admin: AdminAuthContext,
    Path(filename): Path<String>,
) -> CmsResult<Json<DeleteResponse>> {
    let deleted = ctx.upload_pipeline.delete_file(&filename).await?;

    tracing::info!(admin = %admin.subject, filename = %filename, deleted, "PDF delete requested");

    Ok(Json(DeleteResponse {
        message: if deleted {
            "File deleted successfully".to_string()
        } else {
            "File not found, nothing to delete".to_string()
        },
        deleted,
    }))
}

/// Metadata for a stored PDF
async fn pdf_info(
    State(ctx): State<AppContext>,
    Path(filename): Path<String>,
) -> CmsResult<Json<StoredFile>> {
    ctx.blob_store
        .stat(&filename)
        .await?
        .map(Json)
        .ok_or_else(|| CmsError::NotFound(format!("File not found: {}", filename)))
}

async fn list_pdfs(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
) -> CmsResult<Json<ListResponse>> {
    let files = ctx.blob_store.list().await?;
    Ok(Json(ListResponse {
        count: files.len(),
        files,
    }))
}

async fn compression_status(State(ctx): State<AppContext>) -> Json<CompressionStatus> {
    Json(ctx.upload_pipeline.compression_status().await)
}

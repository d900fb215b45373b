/// PDF upload pipeline
///
/// Receive → validate → decide compression → stage → compress → persist →
/// respond. Compression failures fall back to the staged original; storage
/// failures abort the request after best-effort cleanup of staged files.

pub mod pipeline;
pub mod resource;

pub use pipeline::{CompressionStatus, UploadOutcome, UploadPipeline, UploadPolicy, UploadRequest};
pub use resource::ResourceRecord;

/// Interpret a boolean-like form value as an explicit "false"
///
/// Absent values are not an explicit opt-out.
pub fn is_explicit_false(flag: Option<&str>) -> bool {
    matches!(
        flag.map(|f| f.trim().to_ascii_lowercase()).as_deref(),
        Some("false" | "0" | "no" | "off")
    )
}

/// Blob storage data models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for a file held by the local blob store
///
/// Immutable once created. Callers keep `name`/`locator` as references and
/// never touch the bytes directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    /// Opaque identifier (the storage name)
    pub id: String,
    /// Unique storage name inside the blob root
    pub name: String,
    /// Externally resolvable URL
    pub locator: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Media type for the managed document format
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Extension of files enumerated by `list`
pub const MANAGED_EXTENSION: &str = "pdf";

/// Prefix for originals staged before compression
pub const TEMP_PREFIX: &str = "temp-";

/// Prefix for loose compressor output
pub const COMPRESSED_PREFIX: &str = "compressed-";

/// Whether a storage name belongs to an in-flight upload
pub fn is_staging_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) || name.starts_with(COMPRESSED_PREFIX)
}

/// Media type inferred from a storage name's extension
pub fn mime_type_for(name: &str) -> &'static str {
    match std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => PDF_MIME_TYPE,
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_names() {
        assert!(is_staging_name("temp-pdf-1700000000000-42.pdf"));
        assert!(is_staging_name("compressed-pdf-1700000000000-42.pdf"));
        assert!(!is_staging_name("pdf-1700000000000-42.pdf"));
    }

    #[test]
    fn test_mime_type_for() {
        assert_eq!(mime_type_for("pdf-1-2.PDF"), PDF_MIME_TYPE);
        assert_eq!(mime_type_for("notes.txt"), "application/octet-stream");
        assert_eq!(mime_type_for("no-extension"), "application/octet-stream");
    }

    #[test]
    fn test_stored_file_serialization() {
        let file = StoredFile {
            id: "pdf-1-2.pdf".to_string(),
            name: "pdf-1-2.pdf".to_string(),
            locator: "http://localhost:5000/uploads/pdf-1-2.pdf".to_string(),
            mime_type: PDF_MIME_TYPE.to_string(),
            size_bytes: 12,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["mimeType"], "application/pdf");
        assert_eq!(json["sizeBytes"], 12);
    }
}

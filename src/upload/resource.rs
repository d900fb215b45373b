/// Catalog resources that may point at stored files
use serde::{Deserialize, Serialize};

/// Resource type whose file lives in the local blob store
pub const PDF_RESOURCE_TYPE: &str = "pdf";

/// Simplified view of a catalog resource
///
/// Either references an external URL, or (for PDFs) a stored file through
/// `file_name` plus `locator`. The persistence of these records is handled
/// elsewhere; this type only carries what is needed to keep the stored file
/// and the record consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    pub id: i64,
    pub resource_type: String,
    pub file_name: Option<String>,
    pub locator: Option<String>,
}

impl ResourceRecord {
    pub fn stored_pdf(id: i64, file_name: &str, locator: &str) -> Self {
        Self {
            id,
            resource_type: PDF_RESOURCE_TYPE.to_string(),
            file_name: Some(file_name.to_string()),
            locator: Some(locator.to_string()),
        }
    }

    pub fn external(id: i64, resource_type: &str, url: &str) -> Self {
        Self {
            id,
            resource_type: resource_type.to_string(),
            file_name: None,
            locator: Some(url.to_string()),
        }
    }

    /// Whether deleting this record must also delete a stored file
    pub fn is_stored_pdf(&self) -> bool {
        self.resource_type.eq_ignore_ascii_case(PDF_RESOURCE_TYPE)
            && (self.file_name.is_some() || self.locator.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_stored_pdf() {
        assert!(ResourceRecord::stored_pdf(1, "pdf-1-1.pdf", "/uploads/pdf-1-1.pdf").is_stored_pdf());
        assert!(!ResourceRecord::external(2, "video", "https://example.com").is_stored_pdf());

        let mut cleared = ResourceRecord::stored_pdf(3, "pdf-1-1.pdf", "/uploads/pdf-1-1.pdf");
        cleared.file_name = None;
        cleared.locator = None;
        assert!(!cleared.is_stored_pdf());
    }
}

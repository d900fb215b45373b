/// PDF Compression
///
/// Wraps an external PDF optimizer behind the `PdfCompressor` trait. The
/// production implementation shells out to Ghostscript with an argument
/// vector; paths are validated before they ever reach the subprocess.

pub mod ghostscript;

pub use ghostscript::GhostscriptCompressor;

use crate::error::{CmsError, CmsResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use std::str::FromStr;

/// Compressor backend trait
#[async_trait]
pub trait PdfCompressor: Send + Sync {
    /// Cheap probe; never fails, reports `false` when the tool is unusable
    async fn is_available(&self) -> bool;

    /// Rewrite `input` into `output`
    ///
    /// Only path validation produces an `Err`; every runtime failure of the
    /// tool is reported as an unsuccessful `CompressionOutcome`.
    async fn compress(
        &self,
        input: &Path,
        output: &Path,
        options: &CompressionOptions,
    ) -> CmsResult<CompressionOutcome>;
}

/// Ghostscript `-dPDFSETTINGS` presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Screen,
    Ebook,
    Printer,
    Prepress,
}

impl QualityPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityPreset::Screen => "screen",
            QualityPreset::Ebook => "ebook",
            QualityPreset::Printer => "printer",
            QualityPreset::Prepress => "prepress",
        }
    }
}

impl FromStr for QualityPreset {
    type Err = CmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "screen" => Ok(QualityPreset::Screen),
            "ebook" => Ok(QualityPreset::Ebook),
            "printer" => Ok(QualityPreset::Printer),
            "prepress" => Ok(QualityPreset::Prepress),
            other => Err(CmsError::Validation(format!(
                "Unknown compression quality: {}",
                other
            ))),
        }
    }
}

/// Options passed to the compressor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionOptions {
    pub quality: QualityPreset,
    pub compatibility_level: String,
}

impl CompressionOptions {
    pub fn new(quality: QualityPreset, compatibility_level: &str) -> CmsResult<Self> {
        let level = compatibility_level.trim();
        let valid = level
            .split_once('.')
            .map(|(major, minor)| {
                !major.is_empty()
                    && !minor.is_empty()
                    && major.chars().all(|c| c.is_ascii_digit())
                    && minor.chars().all(|c| c.is_ascii_digit())
            })
            .unwrap_or(false);

        if !valid {
            return Err(CmsError::Validation(format!(
                "Invalid PDF compatibility level: {}",
                compatibility_level
            )));
        }

        Ok(Self {
            quality,
            compatibility_level: level.to_string(),
        })
    }
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            quality: QualityPreset::Ebook,
            compatibility_level: "1.4".to_string(),
        }
    }
}

/// Result of one compressor run; produced and consumed within a single upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionOutcome {
    pub succeeded: bool,
    pub original_size_bytes: u64,
    pub compressed_size_bytes: u64,
    pub ratio_percent: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompressionOutcome {
    pub fn success(original_size_bytes: u64, compressed_size_bytes: u64) -> Self {
        Self {
            succeeded: true,
            original_size_bytes,
            compressed_size_bytes,
            ratio_percent: ratio_percent(original_size_bytes, compressed_size_bytes),
            error: None,
        }
    }

    pub fn failure(original_size_bytes: u64, error: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            original_size_bytes,
            compressed_size_bytes: original_size_bytes,
            ratio_percent: 0,
            error: Some(error.into()),
        }
    }
}

/// Integer percentage reduction, `round((orig - compressed) / orig * 100)`
pub fn ratio_percent(original: u64, compressed: u64) -> i64 {
    if original == 0 {
        return 0;
    }
    ((original as f64 - compressed as f64) / original as f64 * 100.0).round() as i64
}

/// Reject anything but absolute paths without `..` segments
pub fn validate_path(path: &Path) -> CmsResult<()> {
    if !path.is_absolute() {
        return Err(CmsError::InvalidPath(format!(
            "Path must be absolute: {}",
            path.display()
        )));
    }

    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(CmsError::InvalidPath(format!(
            "Path must not contain parent-directory segments: {}",
            path.display()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_percent() {
        assert_eq!(ratio_percent(5_000_000, 3_000_000), 40);
        assert_eq!(ratio_percent(1000, 1000), 0);
        assert_eq!(ratio_percent(3, 2), 33);
        assert_eq!(ratio_percent(1000, 1200), -20);
        assert_eq!(ratio_percent(0, 0), 0);
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path(Path::new("/srv/uploads/temp-pdf-1-1.pdf")).is_ok());
        assert!(matches!(
            validate_path(Path::new("uploads/a.pdf")),
            Err(CmsError::InvalidPath(_))
        ));
        assert!(matches!(
            validate_path(Path::new("/srv/uploads/../etc/passwd")),
            Err(CmsError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_quality_preset_parsing() {
        assert_eq!("ebook".parse::<QualityPreset>().unwrap(), QualityPreset::Ebook);
        assert_eq!("Screen".parse::<QualityPreset>().unwrap(), QualityPreset::Screen);
        assert!("maximum".parse::<QualityPreset>().is_err());
        assert_eq!(QualityPreset::Prepress.as_str(), "prepress");
    }

    #[test]
    fn test_compatibility_level_validation() {
        assert!(CompressionOptions::new(QualityPreset::Ebook, "1.4").is_ok());
        assert!(CompressionOptions::new(QualityPreset::Ebook, "1.7").is_ok());
        assert!(CompressionOptions::new(QualityPreset::Ebook, "1.4 -dSAFER").is_err());
        assert!(CompressionOptions::new(QualityPreset::Ebook, "latest").is_err());
    }

    #[test]
    fn test_failure_outcome_keeps_original_size() {
        let outcome = CompressionOutcome::failure(2048, "exit code 1");
        assert!(!outcome.succeeded);
        assert_eq!(outcome.compressed_size_bytes, 2048);
        assert_eq!(outcome.ratio_percent, 0);
        assert_eq!(outcome.error.as_deref(), Some("exit code 1"));
    }
}

/// Ghostscript-backed PDF compressor
use crate::{
    compression::{validate_path, CompressionOptions, CompressionOutcome, PdfCompressor},
    config::CompressionConfig,
    error::CmsResult,
};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::{
    fs,
    io::{AsyncRead, AsyncReadExt},
    process::Command,
};

/// Runs `gs -sDEVICE=pdfwrite ...` as a subprocess
///
/// Arguments are passed as a vector, never through a shell.
#[derive(Debug, Clone)]
pub struct GhostscriptCompressor {
    binary: String,
    timeout: Duration,
    probe_timeout: Duration,
    max_output_bytes: usize,
}

/// Captured output of one subprocess run
struct RunOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    overflowed: bool,
}

impl GhostscriptCompressor {
    pub fn new(
        binary: impl Into<String>,
        timeout: Duration,
        probe_timeout: Duration,
        max_output_bytes: usize,
    ) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            probe_timeout,
            max_output_bytes,
        }
    }

    pub fn from_config(config: &CompressionConfig) -> Self {
        Self::new(
            config.ghostscript_binary.clone(),
            Duration::from_secs(config.timeout_secs),
            Duration::from_secs(config.probe_timeout_secs),
            config.max_output_bytes,
        )
    }

    /// Argument vector for one compression run
    fn build_args(input: &Path, output: &Path, options: &CompressionOptions) -> Vec<OsString> {
        let mut output_arg = OsString::from("-sOutputFile=");
        output_arg.push(output.as_os_str());

        vec![
            "-sDEVICE=pdfwrite".into(),
            format!("-dCompatibilityLevel={}", options.compatibility_level).into(),
            format!("-dPDFSETTINGS=/{}", options.quality.as_str()).into(),
            "-dNOPAUSE".into(),
            "-dQUIET".into(),
            "-dBATCH".into(),
            output_arg,
            input.as_os_str().to_owned(),
        ]
    }

    /// Spawn the binary and wait for it, bounded by `timeout` and the capture limit
    async fn run(&self, args: &[OsString], timeout: Duration) -> Result<RunOutput, String> {
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to start {}: {}", self.binary, e))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.max_output_bytes as u64;

        let work = async {
            let (stdout, stderr) =
                tokio::join!(read_limited(stdout, limit), read_limited(stderr, limit));
            let status = child.wait().await;
            (stdout, stderr, status)
        };

        let result = tokio::time::timeout(timeout, work).await;

        let (stdout, stderr, status) = match result {
            Ok(done) => done,
            Err(_) => {
                if let Err(e) = child.start_kill() {
                    tracing::warn!(error = %e, "Failed to kill timed out compressor");
                }
                return Err(format!(
                    "{} timed out after {}s",
                    self.binary,
                    timeout.as_secs_f64()
                ));
            }
        };

        let (stdout, stdout_overflow) =
            stdout.map_err(|e| format!("Failed to read compressor output: {}", e))?;
        let (stderr, stderr_overflow) =
            stderr.map_err(|e| format!("Failed to read compressor output: {}", e))?;
        let status = status.map_err(|e| format!("Failed to wait for {}: {}", self.binary, e))?;

        Ok(RunOutput {
            status,
            stdout,
            stderr,
            overflowed: stdout_overflow || stderr_overflow,
        })
    }
}

/// Read up to `limit` bytes, draining and discarding the rest
async fn read_limited<R: AsyncRead + Unpin>(
    reader: Option<R>,
    limit: u64,
) -> std::io::Result<(Vec<u8>, bool)> {
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), false));
    };

    let mut buf = Vec::new();
    (&mut reader).take(limit).read_to_end(&mut buf).await?;
    let discarded = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;

    Ok((buf, discarded > 0))
}

fn diagnostic(run: &RunOutput) -> String {
    let stderr = String::from_utf8_lossy(&run.stderr);
    let stdout = String::from_utf8_lossy(&run.stdout);
    let text = if !stderr.trim().is_empty() {
        stderr.trim().to_string()
    } else {
        stdout.trim().to_string()
    };

    if text.is_empty() {
        format!("Compressor exited with {}", run.status)
    } else {
        format!("Compressor exited with {}: {}", run.status, text)
    }
}

#[async_trait]
impl PdfCompressor for GhostscriptCompressor {
    async fn is_available(&self) -> bool {
        match self.run(&["--version".into()], self.probe_timeout).await {
            Ok(run) if run.status.success() => {
                tracing::debug!(
                    binary = %self.binary,
                    version = %String::from_utf8_lossy(&run.stdout).trim(),
                    "Ghostscript available"
                );
                true
            }
            Ok(run) => {
                tracing::debug!(binary = %self.binary, status = %run.status, "Ghostscript probe failed");
                false
            }
            Err(e) => {
                tracing::debug!(binary = %self.binary, error = %e, "Ghostscript unavailable");
                false
            }
        }
    }

    async fn compress(
        &self,
        input: &Path,
        output: &Path,
        options: &CompressionOptions,
    ) -> CmsResult<CompressionOutcome> {
        validate_path(input)?;
        validate_path(output)?;

        let original_size = match fs::metadata(input).await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                return Ok(CompressionOutcome::failure(
                    0,
                    format!("Failed to read compressor input: {}", e),
                ))
            }
        };

        let started = Instant::now();
        let args = Self::build_args(input, output, options);
        let outcome = match self.run(&args, self.timeout).await {
            Err(e) => CompressionOutcome::failure(original_size, e),
            Ok(run) if run.overflowed => CompressionOutcome::failure(
                original_size,
                format!(
                    "Compressor output exceeded {} bytes",
                    self.max_output_bytes
                ),
            ),
            Ok(run) if !run.status.success() => {
                CompressionOutcome::failure(original_size, diagnostic(&run))
            }
            Ok(_) => match fs::metadata(output).await {
                Ok(metadata) => CompressionOutcome::success(original_size, metadata.len()),
                Err(_) => CompressionOutcome::failure(
                    original_size,
                    "Compressor exited successfully but produced no output file",
                ),
            },
        };

        if outcome.succeeded {
            tracing::info!(
                original_size = outcome.original_size_bytes,
                compressed_size = outcome.compressed_size_bytes,
                ratio_percent = outcome.ratio_percent,
                quality = options.quality.as_str(),
                duration_ms = started.elapsed().as_millis() as u64,
                "PDF compressed"
            );
        } else {
            tracing::warn!(
                error = outcome.error.as_deref().unwrap_or_default(),
                duration_ms = started.elapsed().as_millis() as u64,
                "PDF compression failed"
            );
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::QualityPreset;
    use crate::error::CmsError;
    use tempfile::tempdir;

    fn compressor(binary: &str) -> GhostscriptCompressor {
        GhostscriptCompressor::new(
            binary,
            Duration::from_secs(10),
            Duration::from_secs(5),
            1024 * 1024,
        )
    }

    #[test]
    fn test_build_args() {
        let options = CompressionOptions::new(QualityPreset::Screen, "1.5").unwrap();
        let args = GhostscriptCompressor::build_args(
            Path::new("/srv/uploads/temp-a.pdf"),
            Path::new("/srv/uploads/compressed-a.pdf"),
            &options,
        );

        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "-sDEVICE=pdfwrite");
        assert!(args.contains(&"-dCompatibilityLevel=1.5".to_string()));
        assert!(args.contains(&"-dPDFSETTINGS=/screen".to_string()));
        assert!(args.contains(&"-sOutputFile=/srv/uploads/compressed-a.pdf".to_string()));
        assert_eq!(args.last().unwrap(), "/srv/uploads/temp-a.pdf");
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let compressor = compressor("definitely-not-a-real-ghostscript-binary");
        assert!(!compressor.is_available().await);
    }

    #[tokio::test]
    async fn test_rejects_relative_paths() {
        let compressor = compressor("gs");
        let result = compressor
            .compress(
                Path::new("uploads/in.pdf"),
                Path::new("/tmp/out.pdf"),
                &CompressionOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(CmsError::InvalidPath(_))));

        let result = compressor
            .compress(
                Path::new("/tmp/in.pdf"),
                Path::new("/tmp/../etc/out.pdf"),
                &CompressionOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(CmsError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_missing_binary_reports_failure() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.pdf");
        std::fs::write(&input, b"%PDF-1.4").unwrap();

        let outcome = compressor("definitely-not-a-real-ghostscript-binary")
            .compress(&input, &dir.path().join("out.pdf"), &CompressionOptions::default())
            .await
            .unwrap();

        assert!(!outcome.succeeded);
        assert!(outcome.error.unwrap().contains("Failed to start"));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, name: &str, body: &str) -> String {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        #[tokio::test]
        async fn test_zero_exit_without_output_is_failure() {
            let dir = tempdir().unwrap();
            let input = dir.path().join("in.pdf");
            std::fs::write(&input, b"%PDF-1.4").unwrap();
            let binary = script(dir.path(), "fake-gs", "exit 0");

            let outcome = compressor(&binary)
                .compress(&input, &dir.path().join("out.pdf"), &CompressionOptions::default())
                .await
                .unwrap();

            assert!(!outcome.succeeded);
            assert!(outcome.error.unwrap().contains("no output file"));
        }

        #[tokio::test]
        async fn test_non_zero_exit_carries_diagnostic() {
            let dir = tempdir().unwrap();
            let input = dir.path().join("in.pdf");
            std::fs::write(&input, b"%PDF-1.4").unwrap();
            let binary = script(dir.path(), "fake-gs", "echo 'Unrecoverable error' >&2\nexit 1");

            let outcome = compressor(&binary)
                .compress(&input, &dir.path().join("out.pdf"), &CompressionOptions::default())
                .await
                .unwrap();

            assert!(!outcome.succeeded);
            assert!(outcome.error.unwrap().contains("Unrecoverable error"));
        }

        #[tokio::test]
        async fn test_successful_run_reports_ratio() {
            let dir = tempdir().unwrap();
            let input = dir.path().join("in.pdf");
            std::fs::write(&input, vec![b'x'; 1000]).unwrap();
            let binary = script(
                dir.path(),
                "fake-gs",
                r#"for arg in "$@"; do
  case "$arg" in
    -sOutputFile=*) out="${arg#-sOutputFile=}" ;;
  esac
  last="$arg"
done
head -c 600 "$last" > "$out""#,
            );

            let output = dir.path().join("out.pdf");
            let outcome = compressor(&binary)
                .compress(&input, &output, &CompressionOptions::default())
                .await
                .unwrap();

            assert!(outcome.succeeded, "{:?}", outcome.error);
            assert_eq!(outcome.original_size_bytes, 1000);
            assert_eq!(outcome.compressed_size_bytes, 600);
            assert_eq!(outcome.ratio_percent, 40);
            assert!(output.exists());
        }

        #[tokio::test]
        async fn test_timeout_is_failure() {
            let dir = tempdir().unwrap();
            let input = dir.path().join("in.pdf");
            std::fs::write(&input, b"%PDF-1.4").unwrap();
            let binary = script(dir.path(), "slow-gs", "sleep 5");

            let compressor = GhostscriptCompressor::new(
                binary,
                Duration::from_millis(200),
                Duration::from_millis(200),
                1024,
            );
            let outcome = compressor
                .compress(&input, &dir.path().join("out.pdf"), &CompressionOptions::default())
                .await
                .unwrap();

            assert!(!outcome.succeeded);
            assert!(outcome.error.unwrap().contains("timed out"));
            assert!(!compressor.is_available().await);
        }

        #[tokio::test]
        async fn test_output_overflow_is_failure() {
            let dir = tempdir().unwrap();
            let input = dir.path().join("in.pdf");
            std::fs::write(&input, b"%PDF-1.4").unwrap();
            let binary = script(
                dir.path(),
                "noisy-gs",
                r#"i=0
while [ $i -lt 200 ]; do echo "warning line $i"; i=$((i+1)); done"#,
            );

            let compressor = GhostscriptCompressor::new(
                binary,
                Duration::from_secs(10),
                Duration::from_secs(5),
                64,
            );
            let outcome = compressor
                .compress(&input, &dir.path().join("out.pdf"), &CompressionOptions::default())
                .await
                .unwrap();

            assert!(!outcome.succeeded);
            assert!(outcome.error.unwrap().contains("exceeded"));
        }
    }
}

/// Configuration management for the Curricula content API
use crate::error::{CmsError, CmsResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub compression: CompressionConfig,
    pub authentication: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Public base URL used to build file locators
    pub base_url: String,
    /// Development mode returns internal error details to clients
    pub development: bool,
    /// Allowed CORS origins (empty means any)
    pub cors_origins: Vec<String>,
}

/// Upload storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub upload_directory: PathBuf,
    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
    /// Staging files older than this are removed by the cleanup job
    pub staging_ttl_secs: u64,
}

/// PDF compression configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub ghostscript_binary: String,
    pub quality: String,
    pub compatibility_level: String,
    pub timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub max_output_bytes: usize,
    /// Uploads above this size are compressed even when the caller opts out
    pub auto_compress_threshold_bytes: usize,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub global_requests_per_minute: u32,
    pub app_open_max_requests: u32,
    pub app_open_window_ms: u64,
    pub sweep_interval_secs: u64,
    /// Key clients by `X-Forwarded-For`/`X-Real-IP`; only safe behind a proxy that sets them
    pub trust_proxy_headers: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

/// Quality presets understood by the compressor
pub const QUALITY_PRESETS: [&str; 4] = ["screen", "ebook", "printer", "prepress"];

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> CmsResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("CMS_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("CMS_PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| CmsError::Validation("Invalid port number".to_string()))?;
        let base_url = env::var("CMS_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();
        let development = env::var("CMS_ENV")
            .map(|v| v.eq_ignore_ascii_case("development"))
            .unwrap_or(false);
        let cors_origins = env::var("CMS_CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let data_directory: PathBuf = env::var("CMS_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let upload_directory = env::var("CMS_UPLOAD_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("uploads"));
        let max_upload_bytes = env_or("CMS_MAX_UPLOAD_BYTES", 30 * 1024 * 1024);
        let staging_ttl_secs = env_or("CMS_STAGING_TTL_SECS", 3600);

        let compression = CompressionConfig {
            enabled: env_or("CMS_COMPRESSION_ENABLED", true),
            ghostscript_binary: env::var("CMS_GHOSTSCRIPT_BINARY")
                .unwrap_or_else(|_| "gs".to_string()),
            quality: env::var("CMS_COMPRESSION_QUALITY")
                .unwrap_or_else(|_| "ebook".to_string())
                .to_lowercase(),
            compatibility_level: env::var("CMS_COMPRESSION_COMPATIBILITY_LEVEL")
                .unwrap_or_else(|_| "1.4".to_string()),
            timeout_secs: env_or("CMS_COMPRESSION_TIMEOUT_SECS", 60),
            probe_timeout_secs: env_or("CMS_COMPRESSION_PROBE_TIMEOUT_SECS", 5),
            max_output_bytes: env_or("CMS_COMPRESSION_MAX_OUTPUT_BYTES", 10 * 1024 * 1024),
            auto_compress_threshold_bytes: env_or(
                "CMS_AUTO_COMPRESS_THRESHOLD_BYTES",
                2 * 1024 * 1024,
            ),
        };

        let jwt_secret = env::var("CMS_JWT_SECRET")
            .map_err(|_| CmsError::Validation("JWT secret required".to_string()))?;

        let rate_limit = RateLimitConfig {
            enabled: env_or("CMS_RATE_LIMITS_ENABLED", true),
            global_requests_per_minute: env_or("CMS_RATE_LIMIT_GLOBAL_REQUESTS_PER_MINUTE", 3000),
            app_open_max_requests: env_or("CMS_RATE_LIMIT_APP_OPEN_MAX_REQUESTS", 10),
            app_open_window_ms: env_or("CMS_RATE_LIMIT_APP_OPEN_WINDOW_MS", 60_000),
            sweep_interval_secs: env_or("CMS_RATE_LIMIT_SWEEP_INTERVAL_SECS", 300),
            trust_proxy_headers: env_or("CMS_TRUST_PROXY_HEADERS", false),
        };

        let database = DatabaseConfig {
            path: env::var("CMS_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_directory.join("curricula.sqlite")),
        };

        let logging = LoggingConfig {
            level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            json: env_or("CMS_LOG_JSON", false),
        };

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                base_url,
                development,
                cors_origins,
            },
            storage: StorageConfig {
                upload_directory,
                max_upload_bytes,
                staging_ttl_secs,
            },
            compression,
            authentication: AuthConfig { jwt_secret },
            rate_limit,
            database,
            logging,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> CmsResult<()> {
        if self.service.hostname.is_empty() {
            return Err(CmsError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(CmsError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.storage.max_upload_bytes == 0 {
            return Err(CmsError::Validation(
                "Upload size ceiling must be greater than zero".to_string(),
            ));
        }

        if !QUALITY_PRESETS.contains(&self.compression.quality.as_str()) {
            return Err(CmsError::Validation(format!(
                "Unknown compression quality '{}', expected one of {:?}",
                self.compression.quality, QUALITY_PRESETS
            )));
        }

        if self.rate_limit.app_open_window_ms == 0 {
            return Err(CmsError::Validation(
                "App-open rate limit window must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
impl ServerConfig {
    /// Configuration rooted in a scratch directory
    pub fn for_tests(root: &std::path::Path) -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 5000,
                base_url: "http://localhost:5000".to_string(),
                development: false,
                cors_origins: Vec::new(),
            },
            storage: StorageConfig {
                upload_directory: root.join("uploads"),
                max_upload_bytes: 30 * 1024 * 1024,
                staging_ttl_secs: 3600,
            },
            compression: CompressionConfig {
                enabled: true,
                ghostscript_binary: "gs".to_string(),
                quality: "ebook".to_string(),
                compatibility_level: "1.4".to_string(),
                timeout_secs: 60,
                probe_timeout_secs: 5,
                max_output_bytes: 10 * 1024 * 1024,
                auto_compress_threshold_bytes: 2 * 1024 * 1024,
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-that-is-at-least-32-characters".to_string(),
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                global_requests_per_minute: 3000,
                app_open_max_requests: 3,
                app_open_window_ms: 60_000,
                sweep_interval_secs: 300,
                trust_proxy_headers: false,
            },
            database: DatabaseConfig {
                path: root.join("test.sqlite"),
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::for_tests(dir.path());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_secret() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::for_tests(dir.path());
        config.authentication.jwt_secret = "short".to_string();
        assert!(matches!(config.validate(), Err(CmsError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_quality() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::for_tests(dir.path());
        config.compression.quality = "best".to_string();
        assert!(matches!(config.validate(), Err(CmsError::Validation(_))));
    }
}

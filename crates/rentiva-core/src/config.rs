//! Configuration module
//!
//! Env-driven configuration for the upload security pipeline: validation
//! limits, sanitizer settings, scanner endpoint and failure policy,
//! quarantine retention, and rate limiting.

use std::env;
use std::path::PathBuf;

// Common constants
const MAX_FILE_SIZE_MB: u64 = 10;
const MIN_DIMENSION: u32 = 1;
const MAX_DIMENSION: u32 = 8192;
const MAX_PIXELS: u64 = 40_000_000;
const SANITIZER_QUALITY: u8 = 85;
const SCAN_TIMEOUT_SECS: u64 = 30;
const QUARANTINE_RETENTION_DAYS: i64 = 30;
const QUARANTINE_SWEEP_INTERVAL_SECS: u64 = 3600;
const RATE_LIMIT_MAX_UPLOADS: u32 = 20;
const RATE_LIMIT_WINDOW_SECS: u64 = 60;
const MIN_DISK_FREE_MB: u64 = 512;

/// Upload security pipeline configuration.
#[derive(Clone, Debug)]
pub struct UploadSecurityConfig {
    /// Root directory for accepted files.
    pub storage_root: PathBuf,
    /// Isolated root directory for quarantined files. Must live on the same
    /// filesystem as `storage_root` so moves are atomic renames.
    pub quarantine_root: PathBuf,
    pub max_file_size_bytes: u64,
    pub allowed_extensions: Vec<String>,
    pub allowed_content_types: Vec<String>,
    pub min_dimension: u32,
    pub max_dimension: u32,
    pub max_pixels: u64,
    /// JPEG quality used when re-encoding validated pixels.
    pub sanitizer_quality: u8,
    // ClamAV configuration
    pub clamav_enabled: bool,
    pub clamav_host: String,
    pub clamav_port: u16,
    /// If true, a scanner outage rejects the upload; if false, the upload
    /// proceeds with scan status `pending` and a logged warning.
    pub scan_fail_closed: bool,
    pub scan_timeout_secs: u64,
    // Quarantine retention
    pub quarantine_retention_days: i64,
    pub quarantine_sweep_interval_secs: u64,
    // Rate limiting
    pub rate_limit_max_uploads: u32,
    pub rate_limit_window_secs: u64,
    // Capacity check
    pub min_disk_free_mb: u64,
    pub database_url: Option<String>,
    pub environment: String,
}

impl UploadSecurityConfig {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());
        let is_production =
            environment.to_lowercase() == "production" || environment.to_lowercase() == "prod";

        let max_file_size_mb = env::var("MAX_FILE_SIZE_MB")
            .unwrap_or_else(|_| MAX_FILE_SIZE_MB.to_string())
            .parse::<u64>()
            .unwrap_or(MAX_FILE_SIZE_MB);

        let allowed_extensions = env::var("ALLOWED_EXTENSIONS")
            .unwrap_or_else(|_| "jpg,jpeg,png,gif,webp".to_string())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .collect();

        let allowed_content_types = env::var("ALLOWED_CONTENT_TYPES")
            .unwrap_or_else(|_| "image/jpeg,image/png,image/gif,image/webp".to_string())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .collect();

        let config = UploadSecurityConfig {
            storage_root: env::var("UPLOAD_STORAGE_ROOT")
                .unwrap_or_else(|_| "./data/uploads".to_string())
                .into(),
            quarantine_root: env::var("QUARANTINE_ROOT")
                .unwrap_or_else(|_| "./data/quarantine".to_string())
                .into(),
            max_file_size_bytes: max_file_size_mb * 1024 * 1024,
            allowed_extensions,
            allowed_content_types,
            min_dimension: env::var("MIN_IMAGE_DIMENSION")
                .unwrap_or_else(|_| MIN_DIMENSION.to_string())
                .parse()
                .unwrap_or(MIN_DIMENSION),
            max_dimension: env::var("MAX_IMAGE_DIMENSION")
                .unwrap_or_else(|_| MAX_DIMENSION.to_string())
                .parse()
                .unwrap_or(MAX_DIMENSION),
            max_pixels: env::var("MAX_IMAGE_PIXELS")
                .unwrap_or_else(|_| MAX_PIXELS.to_string())
                .parse()
                .unwrap_or(MAX_PIXELS),
            sanitizer_quality: env::var("SANITIZER_JPEG_QUALITY")
                .unwrap_or_else(|_| SANITIZER_QUALITY.to_string())
                .parse()
                .unwrap_or(SANITIZER_QUALITY),
            clamav_enabled: env::var("CLAMAV_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(false),
            clamav_host: env::var("CLAMAV_HOST").unwrap_or_else(|_| "localhost".to_string()),
            clamav_port: env::var("CLAMAV_PORT")
                .unwrap_or_else(|_| "3310".to_string())
                .parse()
                .unwrap_or(3310),
            scan_fail_closed: env::var("SCAN_FAIL_CLOSED")
                .unwrap_or_else(|_| is_production.to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(is_production),
            scan_timeout_secs: env::var("SCAN_TIMEOUT_SECS")
                .unwrap_or_else(|_| SCAN_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(SCAN_TIMEOUT_SECS),
            quarantine_retention_days: env::var("QUARANTINE_RETENTION_DAYS")
                .unwrap_or_else(|_| QUARANTINE_RETENTION_DAYS.to_string())
                .parse()
                .unwrap_or(QUARANTINE_RETENTION_DAYS),
            quarantine_sweep_interval_secs: env::var("QUARANTINE_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| QUARANTINE_SWEEP_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(QUARANTINE_SWEEP_INTERVAL_SECS),
            rate_limit_max_uploads: env::var("RATE_LIMIT_MAX_UPLOADS")
                .unwrap_or_else(|_| RATE_LIMIT_MAX_UPLOADS.to_string())
                .parse()
                .unwrap_or(RATE_LIMIT_MAX_UPLOADS),
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(|_| RATE_LIMIT_WINDOW_SECS.to_string())
                .parse()
                .unwrap_or(RATE_LIMIT_WINDOW_SECS),
            min_disk_free_mb: env::var("MIN_DISK_FREE_MB")
                .unwrap_or_else(|_| MIN_DISK_FREE_MB.to_string())
                .parse()
                .unwrap_or(MIN_DISK_FREE_MB),
            database_url: env::var("DATABASE_URL").ok(),
            environment,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.sanitizer_quality == 0 || self.sanitizer_quality > 100 {
            return Err(anyhow::anyhow!(
                "SANITIZER_JPEG_QUALITY must be between 1 and 100"
            ));
        }

        if self.min_dimension == 0 || self.max_dimension < self.min_dimension {
            return Err(anyhow::anyhow!(
                "Image dimension bounds invalid: min {} max {}",
                self.min_dimension,
                self.max_dimension
            ));
        }

        if self.quarantine_retention_days <= 0 {
            return Err(anyhow::anyhow!(
                "QUARANTINE_RETENTION_DAYS must be positive"
            ));
        }

        if self.storage_root == self.quarantine_root {
            return Err(anyhow::anyhow!(
                "UPLOAD_STORAGE_ROOT and QUARANTINE_ROOT must differ"
            ));
        }

        if let Some(url) = &self.database_url {
            if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        if self.allowed_extensions.is_empty() {
            return Err(anyhow::anyhow!("ALLOWED_EXTENSIONS must not be empty"));
        }

        Ok(())
    }
}

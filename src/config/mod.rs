use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::services::recognizer::MatchStrategy;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub max_file_size_mb: u64,
    pub max_concurrent_scans: usize,
    pub preview_page_limit: usize,
    pub preview_char_limit: usize,
    pub extraction_timeout_ms: u64,
    pub recognition_timeout_ms: u64,
    pub analysis_service_url: Option<String>,
    pub analysis_delay_ms: u64,
    pub analysis_timeout_seconds: u64,
    pub recognition_strategy: MatchStrategy,
    pub patterns_file: Option<String>,
    pub scan_cache_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let config = Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| {
                info!("SERVER_HOST not set, using default: 0.0.0.0");
                "0.0.0.0".to_string()
            }),
            server_port: Self::parse_env_var("SERVER_PORT", 8080)
                .context("Failed to parse SERVER_PORT")?,
            max_file_size_mb: Self::parse_env_var("MAX_FILE_SIZE_MB", 50)
                .context("Failed to parse MAX_FILE_SIZE_MB")?,
            max_concurrent_scans: Self::parse_env_var("MAX_CONCURRENT_SCANS", 32)
                .context("Failed to parse MAX_CONCURRENT_SCANS")?,
            preview_page_limit: Self::parse_env_var("PREVIEW_PAGE_LIMIT", 3)
                .context("Failed to parse PREVIEW_PAGE_LIMIT")?,
            preview_char_limit: Self::parse_env_var("PREVIEW_CHAR_LIMIT", 500)
                .context("Failed to parse PREVIEW_CHAR_LIMIT")?,
            extraction_timeout_ms: Self::parse_env_var("EXTRACTION_TIMEOUT_MS", 10_000)
                .context("Failed to parse EXTRACTION_TIMEOUT_MS")?,
            recognition_timeout_ms: Self::parse_env_var("RECOGNITION_TIMEOUT_MS", 2_000)
                .context("Failed to parse RECOGNITION_TIMEOUT_MS")?,
            analysis_service_url: Self::optional_env_var("ANALYSIS_SERVICE_URL"),
            analysis_delay_ms: Self::parse_env_var("ANALYSIS_DELAY_MS", 100)
                .context("Failed to parse ANALYSIS_DELAY_MS")?,
            analysis_timeout_seconds: Self::parse_env_var("ANALYSIS_TIMEOUT_SECONDS", 60)
                .context("Failed to parse ANALYSIS_TIMEOUT_SECONDS")?,
            recognition_strategy: Self::parse_env_var("RECOGNITION_STRATEGY", MatchStrategy::FirstMatch)
                .context("Failed to parse RECOGNITION_STRATEGY")?,
            patterns_file: Self::optional_env_var("PATTERNS_FILE"),
            scan_cache_capacity: Self::parse_env_var("SCAN_CACHE_CAPACITY", 128)
                .context("Failed to parse SCAN_CACHE_CAPACITY")?,
        };

        config.validate()?;

        if config.analysis_service_url.is_none() {
            warn!("ANALYSIS_SERVICE_URL not set. Background analysis is disabled.");
        }
        if config.recognition_strategy == MatchStrategy::BestScore {
            warn!("RECOGNITION_STRATEGY=best-score: documents are classified by keyword hit count instead of registry order");
        }

        info!("Configuration loaded successfully: {:?}", config);
        Ok(config)
    }

    fn parse_env_var<T>(var_name: &str, default: T) -> Result<T>
    where
        T: std::str::FromStr + Copy + std::fmt::Debug,
        T::Err: std::fmt::Display,
    {
        match env::var(var_name) {
            Ok(val) => match val.parse() {
                Ok(parsed) => Ok(parsed),
                Err(e) => {
                    warn!("Failed to parse {}: {} (using default: {:?})", var_name, e, default);
                    Ok(default)
                }
            },
            Err(_) => {
                info!("{} not set, using default: {:?}", var_name, default);
                Ok(default)
            }
        }
    }

    fn optional_env_var(var_name: &str) -> Option<String> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn validate(&self) -> Result<()> {
        if self.server_port == 0 {
            return Err(anyhow::anyhow!("SERVER_PORT must be greater than 0"));
        }
        if self.max_file_size_mb == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_MB must be greater than 0"));
        }
        if self.max_concurrent_scans == 0 {
            return Err(anyhow::anyhow!("MAX_CONCURRENT_SCANS must be greater than 0"));
        }
        if self.preview_page_limit == 0 {
            return Err(anyhow::anyhow!("PREVIEW_PAGE_LIMIT must be greater than 0"));
        }
        if self.preview_char_limit == 0 {
            return Err(anyhow::anyhow!("PREVIEW_CHAR_LIMIT must be greater than 0"));
        }
        if self.extraction_timeout_ms == 0 {
            return Err(anyhow::anyhow!("EXTRACTION_TIMEOUT_MS must be greater than 0"));
        }
        if self.recognition_timeout_ms == 0 {
            return Err(anyhow::anyhow!("RECOGNITION_TIMEOUT_MS must be greater than 0"));
        }
        if self.analysis_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("ANALYSIS_TIMEOUT_SECONDS must be greater than 0"));
        }
        Ok(())
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    /// HTTP body ceiling: twice the validator limit, so oversized uploads
    /// still reach the pipeline and get an invalid preview.
    pub fn body_limit_bytes(&self) -> usize {
        self.max_file_size_bytes().saturating_mul(2) as usize
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_millis(self.extraction_timeout_ms)
    }

    pub fn recognition_timeout(&self) -> Duration {
        Duration::from_millis(self.recognition_timeout_ms)
    }

    pub fn analysis_delay(&self) -> Duration {
        Duration::from_millis(self.analysis_delay_ms)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_seconds)
    }
}

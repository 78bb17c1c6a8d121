use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Stage;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug, Clone)]
pub enum AppError {
    #[error("File too large: {size}MB exceeds limit of {limit}MB")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Invalid file: {message}")]
    InvalidFile { message: String },

    #[error("Unsupported document kind: {kind}")]
    UnsupportedKind { kind: String },

    #[error("Text extraction failed: {message}")]
    ExtractionFailed { message: String },

    #[error("Stage {stage} exceeded its deadline of {limit_ms}ms")]
    StageTimeout { stage: Stage, limit_ms: u64 },

    #[error("Scan cancelled during {stage}")]
    Cancelled { stage: Stage },

    #[error("Background analysis failed: {message}")]
    AnalysisFailed { message: String },

    #[error("Invalid pattern definition: {message}")]
    PatternError { message: String },

    #[error("No scan found with id {scan_id}")]
    ScanNotFound { scan_id: Uuid },

    #[error("Rate limit exceeded: all scan slots are busy")]
    RateLimitExceeded,

    #[error("Missing file in request")]
    MissingFile,

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            AppError::InvalidFile { .. } => "INVALID_FILE",
            AppError::UnsupportedKind { .. } => "UNSUPPORTED_KIND",
            AppError::ExtractionFailed { .. } => "EXTRACTION_FAILED",
            AppError::StageTimeout { .. } => "STAGE_TIMEOUT",
            AppError::Cancelled { .. } => "CANCELLED",
            AppError::AnalysisFailed { .. } => "ANALYSIS_FAILED",
            AppError::PatternError { .. } => "PATTERN_ERROR",
            AppError::ScanNotFound { .. } => "SCAN_NOT_FOUND",
            AppError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            AppError::MissingFile => "MISSING_FILE",
            AppError::ValidationError { .. } => "VALIDATION_ERROR",
            AppError::ConfigError { .. } => "CONFIG_ERROR",
            AppError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::InvalidFile { .. } => StatusCode::BAD_REQUEST,
            AppError::UnsupportedKind { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::ExtractionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::StageTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::AnalysisFailed { .. } => StatusCode::BAD_GATEWAY,
            AppError::PatternError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ScanNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::MissingFile => StatusCode::BAD_REQUEST,
            AppError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            AppError::ConfigError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();
        let request_id = Uuid::new_v4().to_string();
        let timestamp = chrono::Utc::now().to_rfc3339();

        tracing::error!(
            error_code = error_code,
            status_code = %status,
            request_id = %request_id,
            error_message = %message,
            "API error occurred"
        );

        let body = Json(json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message,
                "request_id": request_id,
                "timestamp": timestamp
            },
            "data": null
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ValidationError {
            message: format!("JSON parsing error: {}", err),
        }
    }
}

impl From<lopdf::Error> for AppError {
    fn from(err: lopdf::Error) -> Self {
        AppError::ExtractionFailed {
            message: err.to_string(),
        }
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        AppError::PatternError {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::AnalysisFailed {
            message: err.to_string(),
        }
    }
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::ValidationError {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        AppError::ConfigError {
            message: message.into(),
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        AppError::ExtractionFailed {
            message: message.into(),
        }
    }

    pub fn pattern(message: impl Into<String>) -> Self {
        AppError::PatternError {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal {
            message: message.into(),
        }
    }
}

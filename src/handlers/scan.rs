use axum::{
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::models::{sniff_kind, FileHandle, ScanResponse, KIND_OCTET_STREAM};
use crate::services::{ScanObserver, TracingObserver};

pub const FILE_NAME_HEADER: &str = "x-file-name";
pub const LAST_MODIFIED_HEADER: &str = "x-last-modified";

/// Multipart upload: a `file` part plus an optional `last_modified` part in epoch milliseconds.
pub async fn scan_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<ScanResponse>)> {
    let file = match file_from_multipart(&mut multipart).await {
        Ok(file) => file,
        Err(e) => {
            error!(error = %e, "Failed to read upload from multipart form");
            return Err(e);
        }
    };
    run_scan(state, file).await
}

/// Raw body upload. Name and modification time come from headers.
pub async fn scan_binary_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<ScanResponse>)> {
    if body.is_empty() {
        warn!("Empty body received");
        return Err(AppError::MissingFile);
    }

    let declared = header_str(&headers, "content-type");
    let kind = resolve_kind(declared, &body);
    let name = header_str(&headers, FILE_NAME_HEADER).unwrap_or("upload");

    let mut file = FileHandle::new(name, kind, body);
    if let Some(millis) = parse_last_modified(header_str(&headers, LAST_MODIFIED_HEADER))? {
        file = file.with_last_modified_ms(millis);
    }
    run_scan(state, file).await
}

async fn run_scan(state: AppState, file: FileHandle) -> AppResult<(StatusCode, Json<ScanResponse>)> {
    let start = Instant::now();
    info!(
        file_name = %file.name,
        file_size = file.size,
        kind = %file.kind,
        "Starting scan"
    );

    let observer: Arc<dyn ScanObserver> = Arc::new(TracingObserver);
    let outcome = state
        .pipeline
        .run(file, observer, state.shutdown.child_token())
        .await;

    if let Some(handle) = &outcome.analysis {
        state.analyses.insert(handle.clone());
    }

    let status = outcome
        .error
        .as_ref()
        .map(|e| e.error.status_code())
        .unwrap_or(StatusCode::OK);
    let total_time = start.elapsed().as_millis() as u64;

    info!(
        scan_id = %outcome.scan_id,
        state = ?outcome.state,
        total_time_ms = total_time,
        "Scan request completed"
    );

    Ok((status, Json(ScanResponse::new(outcome.to_data(), total_time))))
}

async fn file_from_multipart(multipart: &mut Multipart) -> AppResult<FileHandle> {
    let mut upload: Option<(String, Option<String>, Bytes)> = None;
    let mut last_modified: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::InvalidFile {
        message: format!("Failed to read multipart field: {}", e),
    })? {
        match field.name().unwrap_or("") {
            "file" => {
                let name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|e| AppError::InvalidFile {
                    message: format!("Failed to read file data: {}", e),
                })?;
                upload = Some((name, content_type, data));
            }
            "last_modified" => {
                let text = field.text().await.map_err(|e| AppError::InvalidFile {
                    message: format!("Failed to read last_modified: {}", e),
                })?;
                last_modified = Some(text);
            }
            other => debug!(field = %other, "Ignoring unknown multipart field"),
        }
    }

    let (name, content_type, data) = upload.ok_or(AppError::MissingFile)?;
    if data.is_empty() {
        return Err(AppError::InvalidFile {
            message: "File is empty".to_string(),
        });
    }

    let kind = resolve_kind(content_type.as_deref(), &data);
    let mut file = FileHandle::new(name, kind, data);
    if let Some(millis) = parse_last_modified(last_modified.as_deref())? {
        file = file.with_last_modified_ms(millis);
    }
    Ok(file)
}

/// Declared kind wins unless it is missing or generic, then the content is sniffed.
pub fn resolve_kind(declared: Option<&str>, content: &[u8]) -> String {
    let declared = declared
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_lowercase())
        .filter(|ct| !ct.is_empty() && ct != KIND_OCTET_STREAM);

    match declared {
        Some(kind) => kind,
        None => sniff_kind(content).unwrap_or(KIND_OCTET_STREAM).to_string(),
    }
}

fn parse_last_modified(raw: Option<&str>) -> AppResult<Option<i64>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse::<i64>()
            .map(Some)
            .map_err(|_| AppError::validation(format!("last_modified must be epoch milliseconds, got '{}'", s))),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KIND_PDF, KIND_PNG};

    #[test]
    fn declared_kind_is_normalized() {
        assert_eq!(resolve_kind(Some("Application/PDF; charset=binary"), b""), KIND_PDF);
    }

    #[test]
    fn generic_kind_falls_back_to_sniffing() {
        assert_eq!(resolve_kind(Some(KIND_OCTET_STREAM), b"%PDF-1.7"), KIND_PDF);
        assert_eq!(resolve_kind(None, b"\x89PNG\r\n\x1a\n0000"), KIND_PNG);
        assert_eq!(resolve_kind(None, b"plain words"), KIND_OCTET_STREAM);
    }

    #[test]
    fn last_modified_must_be_numeric() {
        assert_eq!(parse_last_modified(None).unwrap(), None);
        assert_eq!(parse_last_modified(Some(" ")).unwrap(), None);
        assert_eq!(parse_last_modified(Some("1700000000000")).unwrap(), Some(1_700_000_000_000));
        assert!(parse_last_modified(Some("yesterday")).is_err());
    }
}

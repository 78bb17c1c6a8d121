use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use crate::error::AppResult;
use crate::handlers::AppState;

/// Health check endpoint
pub async fn health_handler(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let recognizer = state.pipeline.recognizer();
    let document_types = recognizer.registry().document_types();
    let analysis_service = state.pipeline.analysis_service_name();
    let (total_scans, rejected_scans, available_slots) = state.scan_slots.metrics();

    let status = if document_types.is_empty() { "degraded" } else { "healthy" };

    let response = json!({
        "status": status,
        "timestamp": Utc::now().timestamp(),
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "extractor": state.pipeline.extractor_name(),
            "analysis": analysis_service.unwrap_or("disabled"),
            "recognition_strategy": recognizer.strategy().to_string(),
            "document_types": document_types,
        },
        "scans": {
            "total": total_scans,
            "rejected": rejected_scans,
            "available_slots": available_slots,
            "tracked_analyses": state.analyses.len(),
        },
    });

    info!(status = status, analysis = analysis_service.unwrap_or("disabled"), "Health check completed");

    Ok(Json(response))
}

/// Ready once at least one document type can be recognized.
pub async fn ready_handler(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    if state.pipeline.recognizer().registry().is_empty() {
        info!("Readiness check failed - no document types registered");
        Err(StatusCode::SERVICE_UNAVAILABLE)
    } else {
        Ok(StatusCode::OK)
    }
}

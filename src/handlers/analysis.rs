use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::models::AnalysisStatus;

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub scan_id: Uuid,
    #[serde(flatten)]
    pub status: AnalysisStatus,
}

/// Polls the background analysis of an earlier scan.
pub async fn analysis_status_handler(
    State(state): State<AppState>,
    Path(scan_id): Path<Uuid>,
) -> AppResult<Json<AnalysisResponse>> {
    let status = state
        .analyses
        .status(&scan_id)
        .ok_or(AppError::ScanNotFound { scan_id })?;

    debug!(scan_id = %scan_id, status = ?status, "Analysis status requested");
    Ok(Json(AnalysisResponse { scan_id, status }))
}

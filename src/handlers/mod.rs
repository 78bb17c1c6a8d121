pub mod analysis;
pub mod health;
pub mod scan;

pub use analysis::*;
pub use health::*;
pub use scan::*;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{logging_middleware, rate_limit_middleware, ScanSlots};
use crate::services::{AnalysisRegistry, ScanPipeline};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ScanPipeline>,
    pub analyses: Arc<AnalysisRegistry>,
    pub scan_slots: Arc<ScanSlots>,
    /// Cancelled on shutdown; every scan runs under a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(pipeline: ScanPipeline, tracked_analyses: usize, max_concurrent_scans: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            analyses: Arc::new(AnalysisRegistry::new(tracked_analyses)),
            scan_slots: Arc::new(ScanSlots::new(max_concurrent_scans)),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Builds the full router. `body_limit` should leave room above the validator
/// ceiling so oversized files still get a preview.
pub fn create_router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/api/v1/scan", post(scan_handler))
        .route("/api/v1/scan/binary", post(scan_binary_handler))
        .route("/api/v1/scan/:scan_id/analysis", get(analysis_status_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit))
                .layer(axum::middleware::from_fn(logging_middleware))
                .layer(axum::middleware::from_fn_with_state(
                    state.scan_slots.clone(),
                    rate_limit_middleware,
                )),
        )
        .with_state(state)
}

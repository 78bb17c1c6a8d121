use std::sync::Mutex;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AnalysisStatus, ExtractionResult, InstantPreview, RecognitionResult, Stage};

/// Stage callbacks for one scan.
///
/// Preview, extraction and recognition fire in that order on the caller's task.
/// `on_full_analysis` fires once, later, from the background task, and may
/// interleave with another scan's callbacks, so implementations should key
/// on `scan_id`. `on_error` replaces every callback after the failing stage.
pub trait ScanObserver: Send + Sync {
    fn on_instant_preview(&self, _scan_id: Uuid, _preview: &InstantPreview) {}

    fn on_fast_extraction(&self, _scan_id: Uuid, _extraction: &ExtractionResult) {}

    fn on_smart_recognition(&self, _scan_id: Uuid, _recognition: &RecognitionResult) {}

    fn on_full_analysis(&self, _scan_id: Uuid, _status: &AnalysisStatus) {}

    fn on_error(&self, _scan_id: Uuid, _stage: Stage, _error: &AppError) {}
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ScanObserver for NoopObserver {}

/// Writes each event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ScanObserver for TracingObserver {
    fn on_instant_preview(&self, scan_id: Uuid, preview: &InstantPreview) {
        tracing::info!(
            scan_id = %scan_id,
            file_name = %preview.name,
            is_valid = preview.is_valid,
            elapsed_ms = preview.timing.elapsed_ms,
            "Instant preview"
        );
    }

    fn on_fast_extraction(&self, scan_id: Uuid, extraction: &ExtractionResult) {
        tracing::info!(
            scan_id = %scan_id,
            page_count = extraction.page_count,
            pages_read = extraction.pages_read,
            elapsed_ms = extraction.timing.elapsed_ms,
            "Fast extraction"
        );
    }

    fn on_smart_recognition(&self, scan_id: Uuid, recognition: &RecognitionResult) {
        tracing::info!(
            scan_id = %scan_id,
            document_type = %recognition.document_type,
            confidence = recognition.confidence.value(),
            fields = recognition.extracted_fields.len(),
            degraded = recognition.degraded,
            "Smart recognition"
        );
    }

    fn on_full_analysis(&self, scan_id: Uuid, status: &AnalysisStatus) {
        match status {
            AnalysisStatus::Failed { reason } => {
                tracing::warn!(scan_id = %scan_id, reason = %reason, "Full analysis failed")
            }
            other => tracing::info!(scan_id = %scan_id, status = ?other, "Full analysis settled"),
        }
    }

    fn on_error(&self, scan_id: Uuid, stage: Stage, error: &AppError) {
        tracing::warn!(
            scan_id = %scan_id,
            stage = %stage,
            error_code = error.error_code(),
            error = %error,
            "Scan stage failed"
        );
    }
}

#[derive(Debug, Clone)]
pub enum ScanEvent {
    InstantPreview(Uuid, InstantPreview),
    FastExtraction(Uuid, ExtractionResult),
    SmartRecognition(Uuid, RecognitionResult),
    FullAnalysis(Uuid, AnalysisStatus),
    Error(Uuid, Stage, AppError),
}

impl ScanEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ScanEvent::InstantPreview(..) => "preview",
            ScanEvent::FastExtraction(..) => "extraction",
            ScanEvent::SmartRecognition(..) => "recognition",
            ScanEvent::FullAnalysis(..) => "analysis",
            ScanEvent::Error(..) => "error",
        }
    }
}

/// Keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ScanEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(ScanEvent::name).collect()
    }

    fn push(&self, event: ScanEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl ScanObserver for RecordingObserver {
    fn on_instant_preview(&self, scan_id: Uuid, preview: &InstantPreview) {
        self.push(ScanEvent::InstantPreview(scan_id, preview.clone()));
    }

    fn on_fast_extraction(&self, scan_id: Uuid, extraction: &ExtractionResult) {
        self.push(ScanEvent::FastExtraction(scan_id, extraction.clone()));
    }

    fn on_smart_recognition(&self, scan_id: Uuid, recognition: &RecognitionResult) {
        self.push(ScanEvent::SmartRecognition(scan_id, recognition.clone()));
    }

    fn on_full_analysis(&self, scan_id: Uuid, status: &AnalysisStatus) {
        self.push(ScanEvent::FullAnalysis(scan_id, status.clone()));
    }

    fn on_error(&self, scan_id: Uuid, stage: Stage, error: &AppError) {
        self.push(ScanEvent::Error(scan_id, stage, error.clone()));
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel document type used when no pattern definition matches.
pub const UNKNOWN_DOCUMENT_TYPE: &str = "unbekannt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Preview,
    Extraction,
    Recognition,
    Analysis,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Preview => "preview",
            Stage::Extraction => "extraction",
            Stage::Recognition => "recognition",
            Stage::Analysis => "analysis",
        }
    }

    /// Soft latency target. Surfaced in [`StageTiming`], never enforced.
    pub fn target_ms(&self) -> u64 {
        match self {
            Stage::Preview => 100,
            Stage::Extraction => 1_000,
            Stage::Recognition => 2_000,
            Stage::Analysis => 3_000,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long a stage took compared to its latency target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub elapsed_ms: u64,
    pub target_ms: u64,
    pub within_target: bool,
}

impl StageTiming {
    pub fn measure(stage: Stage, elapsed: Duration) -> Self {
        let elapsed_ms = elapsed.as_millis() as u64;
        let target_ms = stage.target_ms();
        Self {
            elapsed_ms,
            target_ms,
            within_target: elapsed_ms <= target_ms,
        }
    }

    pub fn label(&self) -> String {
        format!("{}ms", self.elapsed_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstantPreview {
    pub name: String,
    pub size_label: String,
    pub kind: String,
    pub last_modified_label: String,
    pub is_valid: bool,
    pub estimated_duration_label: String,
    pub timing: StageTiming,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub page_count: usize,
    pub pages_read: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    /// Bounded excerpt of the first pages. Nothing beyond it is kept.
    pub text_preview: String,
    pub timing: StageTiming,
}

/// A value pulled out of the text by a field rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Amount(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_amount(&self) -> Option<f64> {
        match self {
            FieldValue::Amount(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Amount(_) => None,
        }
    }
}

/// Coarse quality tier derived from the number of extracted fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn value(&self) -> f32 {
        match self {
            Confidence::None => 0.0,
            Confidence::Low => 0.3,
            Confidence::Medium => 0.6,
            Confidence::High => 0.9,
        }
    }
}

impl Serialize for Confidence {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f32(self.value())
    }
}

impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f32::deserialize(deserializer)?;
        Ok(if value >= 0.9 {
            Confidence::High
        } else if value >= 0.6 {
            Confidence::Medium
        } else if value >= 0.3 {
            Confidence::Low
        } else {
            Confidence::None
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub document_type: String,
    pub confidence: Confidence,
    pub extracted_fields: BTreeMap<String, FieldValue>,
    /// Set when recognition hit its deadline and fell back to the unknown type.
    #[serde(default)]
    pub degraded: bool,
    pub timing: StageTiming,
}

impl RecognitionResult {
    pub fn unknown(timing: StageTiming) -> Self {
        Self {
            document_type: UNKNOWN_DOCUMENT_TYPE.to_string(),
            confidence: Confidence::None,
            extracted_fields: BTreeMap::new(),
            degraded: false,
            timing,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.document_type == UNKNOWN_DOCUMENT_TYPE
    }

    pub fn amount(&self, field: &str) -> Option<f64> {
        self.extracted_fields.get(field).and_then(FieldValue::as_amount)
    }
}

/// Everything the synchronous stages produced, handed to the deep analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickResults {
    pub preview: InstantPreview,
    pub extraction: ExtractionResult,
    pub recognition: RecognitionResult,
}

/// Reference to the uploaded file as seen by the deep-analysis service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReference {
    pub scan_id: Uuid,
    pub name: String,
    pub size: u64,
    pub kind: String,
}

/// State of the background analysis for one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Ready { payload: serde_json::Value },
    /// The service answered but had nothing to report.
    Empty,
    Failed { reason: String },
    Cancelled,
}

impl AnalysisStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, AnalysisStatus::Pending)
    }
}

/// Pipeline state machine. `BackgroundReady` and `ErrorAtStage` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum ScanState {
    Validated,
    PreviewReady,
    ExtractionReady,
    RecognitionReady,
    BackgroundDispatched,
    BackgroundReady,
    ErrorAtStage(Stage),
}

impl ScanState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanState::BackgroundReady | ScanState::ErrorAtStage(_))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanResponse {
    pub success: bool,
    pub data: ScanData,
    pub processing_time_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanData {
    pub scan_id: Uuid,
    pub state: ScanState,
    pub preview: InstantPreview,
    pub extraction: Option<ExtractionResult>,
    pub recognition: Option<RecognitionResult>,
    pub analysis: Option<AnalysisStatus>,
    pub error: Option<StageErrorBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageErrorBody {
    pub stage: Stage,
    pub code: String,
    pub message: String,
}

impl ScanResponse {
    pub fn new(data: ScanData, processing_time_ms: u64) -> Self {
        Self {
            success: data.error.is_none(),
            data,
            processing_time_ms,
        }
    }
}

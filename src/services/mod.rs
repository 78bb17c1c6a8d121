pub mod analysis;
pub mod cache;
pub mod confidence;
pub mod extraction;
pub mod observer;
pub mod patterns;
pub mod pipeline;
pub mod preview;
pub mod recognizer;
pub mod validator;

pub use analysis::{
    AnalysisHandle, AnalysisJob, AnalysisRegistry, AnalysisService, BackgroundDispatcher, HttpAnalysisService,
};
pub use cache::{CachedScan, MemoryScanCache, ScanCache};
pub use extraction::{ExtractionLimits, PdfTextExtractor, TextExtractor};
pub use observer::{NoopObserver, RecordingObserver, ScanEvent, ScanObserver, TracingObserver};
pub use patterns::{FieldKind, PatternDefinition, PatternRegistry};
pub use pipeline::{PipelineSettings, ScanOutcome, ScanPipeline, StageError};
pub use preview::instant_preview;
pub use recognizer::{parse_amount, MatchStrategy, Recognizer};
pub use validator::FileValidator;

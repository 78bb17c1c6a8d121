//! Progressive scan pipeline.
//!
//! A scan moves through `Validated → PreviewReady → ExtractionReady →
//! RecognitionReady → BackgroundDispatched → BackgroundReady`. The preview is
//! always produced. An invalid file ends the scan at `PreviewReady` with
//! `is_valid` unset. Extraction failure is the only hard stop
//! (`ErrorAtStage(Extraction)`). Background failures only show up in the
//! analysis status.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{
    ExtractionResult, FileHandle, InstantPreview, QuickResults, RecognitionResult, ScanData, ScanState,
    Stage, StageErrorBody, StageTiming,
};
use crate::services::analysis::{AnalysisHandle, AnalysisJob, BackgroundDispatcher, HttpAnalysisService};
use crate::services::cache::{CachedScan, MemoryScanCache, ScanCache};
use crate::services::extraction::{ExtractionLimits, PdfTextExtractor, TextExtractor};
use crate::services::observer::ScanObserver;
use crate::services::patterns::PatternRegistry;
use crate::services::preview::instant_preview;
use crate::services::recognizer::Recognizer;
use crate::services::validator::FileValidator;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub limits: ExtractionLimits,
    pub extraction_timeout: Duration,
    pub recognition_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            limits: ExtractionLimits::default(),
            extraction_timeout: Duration::from_secs(10),
            recognition_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            limits: ExtractionLimits {
                max_pages: config.preview_page_limit,
                max_chars: config.preview_char_limit,
            },
            extraction_timeout: config.extraction_timeout(),
            recognition_timeout: config.recognition_timeout(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageError {
    pub stage: Stage,
    pub error: AppError,
}

impl From<&StageError> for StageErrorBody {
    fn from(err: &StageError) -> Self {
        StageErrorBody {
            stage: err.stage,
            code: err.error.error_code().to_string(),
            message: err.error.to_string(),
        }
    }
}

/// What the synchronous part of a scan produced.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub scan_id: Uuid,
    pub state: ScanState,
    /// Every state entered, in order.
    pub transitions: Vec<ScanState>,
    pub preview: InstantPreview,
    pub extraction: Option<ExtractionResult>,
    pub recognition: Option<RecognitionResult>,
    pub analysis: Option<AnalysisHandle>,
    pub error: Option<StageError>,
    pub cache_hit: bool,
}

impl ScanOutcome {
    /// State including background progress made since the scan returned.
    pub fn current_state(&self) -> ScanState {
        match (&self.state, &self.analysis) {
            (ScanState::BackgroundDispatched, Some(handle)) if handle.status().is_settled() => {
                ScanState::BackgroundReady
            }
            (state, _) => *state,
        }
    }

    pub fn to_data(&self) -> ScanData {
        ScanData {
            scan_id: self.scan_id,
            state: self.current_state(),
            preview: self.preview.clone(),
            extraction: self.extraction.clone(),
            recognition: self.recognition.clone(),
            analysis: self.analysis.as_ref().map(AnalysisHandle::status),
            error: self.error.as_ref().map(StageErrorBody::from),
        }
    }

    fn advance(&mut self, state: ScanState) {
        self.state = state;
        self.transitions.push(state);
    }

    fn fail(mut self, stage: Stage, error: AppError, observer: &dyn ScanObserver) -> Self {
        observer.on_error(self.scan_id, stage, &error);
        self.advance(ScanState::ErrorAtStage(stage));
        self.error = Some(StageError { stage, error });
        self
    }
}

pub struct ScanPipeline {
    validator: FileValidator,
    extractor: Arc<dyn TextExtractor>,
    recognizer: Arc<Recognizer>,
    dispatcher: Option<BackgroundDispatcher>,
    cache: Option<Arc<dyn ScanCache>>,
    settings: PipelineSettings,
}

impl ScanPipeline {
    pub fn new(validator: FileValidator, extractor: Arc<dyn TextExtractor>, recognizer: Arc<Recognizer>) -> Self {
        Self {
            validator,
            extractor,
            recognizer,
            dispatcher: None,
            cache: None,
            settings: PipelineSettings::default(),
        }
    }

    /// Wires the production stack: lopdf extraction, builtin or file-based
    /// patterns, the HTTP analysis client when configured, an in-memory cache.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let registry = match &config.patterns_file {
            Some(path) => PatternRegistry::from_file(path)?,
            None => PatternRegistry::builtin()?,
        };
        let recognizer = Recognizer::new(Arc::new(registry)).with_strategy(config.recognition_strategy);

        let mut pipeline = Self::new(
            FileValidator::new(config.max_file_size_bytes()),
            Arc::new(PdfTextExtractor::new()),
            Arc::new(recognizer),
        )
        .with_settings(PipelineSettings::from(config));

        if let Some(url) = &config.analysis_service_url {
            let service = HttpAnalysisService::new(url.clone(), config.analysis_timeout())?;
            pipeline = pipeline.with_dispatcher(
                BackgroundDispatcher::new(Arc::new(service))
                    .with_delay(config.analysis_delay())
                    .with_timeout(config.analysis_timeout()),
            );
        }
        if config.scan_cache_capacity > 0 {
            pipeline = pipeline.with_cache(Arc::new(MemoryScanCache::new(config.scan_cache_capacity)));
        }
        Ok(pipeline)
    }

    pub fn with_dispatcher(mut self, dispatcher: BackgroundDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ScanCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn recognizer(&self) -> &Recognizer {
        &self.recognizer
    }

    pub fn extractor_name(&self) -> &'static str {
        self.extractor.name()
    }

    pub fn analysis_service_name(&self) -> Option<&'static str> {
        self.dispatcher.as_ref().map(BackgroundDispatcher::service_name)
    }

    /// Runs the synchronous stages and dispatches the background analysis.
    ///
    /// Returns as soon as recognition is done; the background result arrives
    /// through `observer.on_full_analysis` and the outcome's analysis handle.
    pub async fn run(
        &self,
        file: FileHandle,
        observer: Arc<dyn ScanObserver>,
        cancel: CancellationToken,
    ) -> ScanOutcome {
        let scan_id = Uuid::new_v4();
        let started = Instant::now();

        let verdict = self.validator.validate(&file);
        let preview = instant_preview(&file, &self.validator);

        let mut outcome = ScanOutcome {
            scan_id,
            state: ScanState::Validated,
            transitions: vec![ScanState::Validated],
            preview,
            extraction: None,
            recognition: None,
            analysis: None,
            error: None,
            cache_hit: false,
        };
        outcome.advance(ScanState::PreviewReady);
        observer.on_instant_preview(scan_id, &outcome.preview);

        // An invalid file is reported only through the preview's `is_valid`.
        if let Err(reason) = verdict {
            tracing::info!(scan_id = %scan_id, reason = %reason, "File rejected, skipping extraction");
            return outcome;
        }

        let identity = file.identity();
        let cached = self.cache.as_ref().and_then(|cache| cache.get(&identity));
        outcome.cache_hit = cached.is_some();

        let (extraction, recognition) = match cached {
            Some(hit) => {
                tracing::debug!(scan_id = %scan_id, "Scan cache hit, skipping extraction");
                observer.on_fast_extraction(scan_id, &hit.extraction);
                observer.on_smart_recognition(scan_id, &hit.recognition);
                (hit.extraction, hit.recognition)
            }
            None => {
                let extraction = match self.extract(&file, &cancel).await {
                    Ok(extraction) => extraction,
                    Err(err) => return outcome.fail(Stage::Extraction, err, observer.as_ref()),
                };
                outcome.advance(ScanState::ExtractionReady);
                observer.on_fast_extraction(scan_id, &extraction);

                let recognition = self.recognize(&extraction.text_preview).await;
                observer.on_smart_recognition(scan_id, &recognition);

                if let Some(cache) = &self.cache {
                    if !recognition.degraded {
                        cache.put(
                            identity,
                            CachedScan {
                                extraction: extraction.clone(),
                                recognition: recognition.clone(),
                            },
                        );
                    }
                }
                (extraction, recognition)
            }
        };
        outcome.advance(ScanState::RecognitionReady);

        if let Some(dispatcher) = &self.dispatcher {
            let job = AnalysisJob::new(
                scan_id,
                file,
                QuickResults {
                    preview: outcome.preview.clone(),
                    extraction: extraction.clone(),
                    recognition: recognition.clone(),
                },
            );
            outcome.analysis = Some(dispatcher.dispatch(job, Arc::clone(&observer), cancel.child_token()));
            outcome.advance(ScanState::BackgroundDispatched);
        }

        outcome.extraction = Some(extraction);
        outcome.recognition = Some(recognition);

        tracing::info!(
            scan_id = %scan_id,
            state = ?outcome.state,
            cache_hit = outcome.cache_hit,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Synchronous scan stages completed"
        );
        outcome
    }

    async fn extract(&self, file: &FileHandle, cancel: &CancellationToken) -> AppResult<ExtractionResult> {
        let limit = self.settings.extraction_timeout;
        // Stops the page loop if the deadline passes while parsing.
        let stage_token = cancel.child_token();

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled { stage: Stage::Extraction }),
            result = tokio::time::timeout(limit, self.extractor.extract(file, self.settings.limits, &stage_token)) => {
                match result {
                    Ok(result) => result,
                    Err(_) => Err(AppError::StageTimeout {
                        stage: Stage::Extraction,
                        limit_ms: limit.as_millis() as u64,
                    }),
                }
            }
        };
        stage_token.cancel();
        result
    }

    async fn recognize(&self, text: &str) -> RecognitionResult {
        let start = Instant::now();
        let limit = self.settings.recognition_timeout;
        let recognizer = Arc::clone(&self.recognizer);
        let text = text.to_string();

        let task = tokio::task::spawn_blocking(move || recognizer.recognize(&text));
        let failure = match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => return result,
            Ok(Err(e)) => format!("recognition task failed: {}", e),
            Err(_) => format!("recognition exceeded {}ms", limit.as_millis()),
        };

        tracing::warn!(reason = %failure, "Recognition degraded to unknown document type");
        RecognitionResult {
            degraded: true,
            ..RecognitionResult::unknown(StageTiming::measure(Stage::Recognition, start.elapsed()))
        }
    }
}

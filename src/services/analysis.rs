use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{AnalysisStatus, FileHandle, FileReference, QuickResults};
use crate::services::observer::ScanObserver;

/// Payload for the deep-analysis service.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub reference: FileReference,
    /// The job's own handle on the file, so the service can re-read it.
    pub file: FileHandle,
    pub quick_results: QuickResults,
}

impl AnalysisJob {
    pub fn new(scan_id: Uuid, file: FileHandle, quick_results: QuickResults) -> Self {
        Self {
            reference: FileReference {
                scan_id,
                name: file.name.clone(),
                size: file.size,
                kind: file.kind.clone(),
            },
            file,
            quick_results,
        }
    }
}

/// External deep-analysis collaborator. `Ok(None)` means nothing to report.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, job: &AnalysisJob) -> AppResult<Option<serde_json::Value>>;

    fn name(&self) -> &'static str;
}

/// Posts the file and quick results as multipart to an HTTP endpoint.
pub struct HttpAnalysisService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAnalysisService {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn analyze(&self, job: &AnalysisJob) -> AppResult<Option<serde_json::Value>> {
        let file_part = Part::bytes(job.file.content().to_vec())
            .file_name(job.file.name.clone())
            .mime_str(&job.file.kind)?;
        let form = Form::new()
            .text("file_reference", serde_json::to_string(&job.reference)?)
            .text("quick_results", serde_json::to_string(&job.quick_results)?)
            .part("file", file_part);

        tracing::debug!(
            scan_id = %job.reference.scan_id,
            endpoint = %self.endpoint,
            "Sending deep-analysis request"
        );

        let body = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let payload: serde_json::Value = serde_json::from_slice(&body)?;
        Ok(if payload.is_null() { None } else { Some(payload) })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Observable result of one background analysis.
#[derive(Debug, Clone)]
pub struct AnalysisHandle {
    scan_id: Uuid,
    status: watch::Receiver<AnalysisStatus>,
}

impl AnalysisHandle {
    pub fn scan_id(&self) -> Uuid {
        self.scan_id
    }

    /// Current status without waiting.
    pub fn status(&self) -> AnalysisStatus {
        self.status.borrow().clone()
    }

    /// Waits until the analysis settles.
    pub async fn wait(&mut self) -> AnalysisStatus {
        match self.status.wait_for(AnalysisStatus::is_settled).await {
            Ok(status) => status.clone(),
            Err(_) => AnalysisStatus::Failed {
                reason: "analysis task ended without a result".to_string(),
            },
        }
    }
}

/// Fires single-attempt background analyses without blocking the caller.
#[derive(Clone)]
pub struct BackgroundDispatcher {
    service: Arc<dyn AnalysisService>,
    delay: Duration,
    timeout: Duration,
}

impl BackgroundDispatcher {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self {
            service,
            delay: Duration::from_millis(100),
            timeout: Duration::from_secs(60),
        }
    }

    /// Pause before the request starts, so the caller's own callbacks run first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn service_name(&self) -> &'static str {
        self.service.name()
    }

    /// Spawns the analysis and returns immediately with a pending handle.
    pub fn dispatch(
        &self,
        job: AnalysisJob,
        observer: Arc<dyn ScanObserver>,
        cancel: CancellationToken,
    ) -> AnalysisHandle {
        let scan_id = job.reference.scan_id;
        let (tx, rx) = watch::channel(AnalysisStatus::Pending);
        let service = Arc::clone(&self.service);
        let delay = self.delay;
        let timeout = self.timeout;

        tokio::spawn(async move {
            let status = tokio::select! {
                _ = cancel.cancelled() => AnalysisStatus::Cancelled,
                status = run_once(service, job, delay, timeout) => status,
            };
            observer.on_full_analysis(scan_id, &status);
            tx.send_replace(status);
        });

        tracing::debug!(scan_id = %scan_id, "Background analysis dispatched");
        AnalysisHandle { scan_id, status: rx }
    }
}

async fn run_once(
    service: Arc<dyn AnalysisService>,
    job: AnalysisJob,
    delay: Duration,
    timeout: Duration,
) -> AnalysisStatus {
    tokio::time::sleep(delay).await;

    let scan_id = job.reference.scan_id;
    match tokio::time::timeout(timeout, service.analyze(&job)).await {
        Ok(Ok(Some(payload))) => AnalysisStatus::Ready { payload },
        Ok(Ok(None)) => AnalysisStatus::Empty,
        Ok(Err(e)) => {
            tracing::warn!(scan_id = %scan_id, error = %e, "Background analysis failed");
            AnalysisStatus::Failed { reason: e.to_string() }
        }
        Err(_) => {
            tracing::warn!(scan_id = %scan_id, timeout_ms = timeout.as_millis() as u64, "Background analysis timed out");
            AnalysisStatus::Failed {
                reason: format!("timed out after {}ms", timeout.as_millis()),
            }
        }
    }
}

/// Background analyses by scan id, so results never cross between scans.
#[derive(Debug)]
pub struct AnalysisRegistry {
    capacity: usize,
    inner: Mutex<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    handles: HashMap<Uuid, AnalysisHandle>,
    order: VecDeque<Uuid>,
}

impl AnalysisRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    pub fn insert(&self, handle: AnalysisHandle) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let scan_id = handle.scan_id();
        if inner.handles.insert(scan_id, handle).is_none() {
            inner.order.push_back(scan_id);
        }
        while inner.handles.len() > self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.handles.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn status(&self, scan_id: &Uuid) -> Option<AnalysisStatus> {
        let inner = self.inner.lock().ok()?;
        inner.handles.get(scan_id).map(AnalysisHandle::status)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.handles.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

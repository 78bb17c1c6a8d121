//! Integration tests driving the HTTP router end to end

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use lopdf::{dictionary, Document, Object, Stream};
use quickscan::{
    error::AppResult,
    handlers::{create_router, AppState},
    models::{ScanResponse, ScanState, Stage},
    services::{
        AnalysisJob, AnalysisService, BackgroundDispatcher, FileValidator, PatternRegistry, PdfTextExtractor,
        Recognizer, ScanPipeline,
    },
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const BODY_LIMIT: usize = 16 * 1024 * 1024;

fn make_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = text
            .lines()
            .enumerate()
            .map(|(i, line)| format!("BT /F1 11 Tf 72 {} Td ({}) Tj ET", 760 - 14 * i, line))
            .collect::<Vec<_>>()
            .join("\n");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Answers every analysis with a fixed verdict.
struct StaticAnalysis;

#[async_trait]
impl AnalysisService for StaticAnalysis {
    async fn analyze(&self, job: &AnalysisJob) -> AppResult<Option<Value>> {
        Ok(Some(json!({
            "document_type": job.quick_results.recognition.document_type,
            "verdict": "plausibel",
        })))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

fn pipeline() -> ScanPipeline {
    ScanPipeline::new(
        FileValidator::default(),
        Arc::new(PdfTextExtractor::new()),
        Arc::new(Recognizer::new(Arc::new(PatternRegistry::builtin().unwrap()))),
    )
}

fn app(pipeline: ScanPipeline) -> Router {
    create_router(AppState::new(pipeline, 64, 4), BODY_LIMIT)
}

fn binary_upload(name: &str, kind: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/scan/binary")
        .header("content-type", kind)
        .header("x-file-name", name)
        .header("x-last-modified", "1704103200000")
        .body(Body::from(body))
        .unwrap()
}

async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_binary_scan_recognizes_utility_statement() {
    let pdf = make_pdf(&["Nebenkostenabrechnung 2023\nGesamtkosten: 1.234,56 EUR"]);
    let response = app(pipeline())
        .oneshot(binary_upload("abrechnung.pdf", "application/pdf", pdf))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: ScanResponse = read_json(response).await;
    assert!(body.success);
    assert_eq!(body.data.state, ScanState::RecognitionReady);
    assert_eq!(body.data.preview.name, "abrechnung.pdf");
    assert_eq!(body.data.preview.last_modified_label, "1.1.2024");
    assert!(body.data.preview.is_valid);

    let extraction = body.data.extraction.unwrap();
    assert_eq!(extraction.page_count, 1);
    assert!(extraction.text_preview.contains("Nebenkostenabrechnung"));

    let recognition = body.data.recognition.unwrap();
    assert_eq!(recognition.document_type, "nebenkostenabrechnung");
    assert!(body.data.analysis.is_none());
}

#[tokio::test]
async fn test_unsupported_kind_is_flagged_in_preview_only() {
    let response = app(pipeline())
        .oneshot(binary_upload("notes.txt", "text/plain", b"just some notes".to_vec()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: ScanResponse = read_json(response).await;
    assert!(!body.data.preview.is_valid);
    assert_eq!(body.data.state, ScanState::PreviewReady);
    assert!(body.data.error.is_none());
    assert!(body.data.extraction.is_none());
    assert!(body.data.recognition.is_none());
}

#[tokio::test]
async fn test_corrupt_pdf_fails_at_extraction() {
    let response = app(pipeline())
        .oneshot(binary_upload("kaputt.pdf", "application/pdf", b"%PDF-1.4 garbage".to_vec()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: ScanResponse = read_json(response).await;
    assert!(body.data.preview.is_valid);
    assert_eq!(body.data.state, ScanState::ErrorAtStage(Stage::Extraction));
    assert!(body.data.recognition.is_none());
}

#[tokio::test]
async fn test_empty_binary_body_is_rejected() {
    let response = app(pipeline())
        .oneshot(binary_upload("leer.pdf", "application/pdf", Vec::new()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = read_json(response).await;
    assert_eq!(body["error"]["code"], "MISSING_FILE");
}

#[tokio::test]
async fn test_multipart_scan_sniffs_generic_kind() {
    let boundary = "quickscanboundary";
    let pdf = make_pdf(&["Mietvertrag\nKaltmiete: 850,00 EUR"]);

    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"last_modified\"\r\n\r\n1704103200000\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"vertrag.pdf\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n",
            b = boundary
        )
        .as_bytes(),
    );
    body.extend_from_slice(&pdf);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/scan")
        .header("content-type", format!("multipart/form-data; boundary={}", boundary))
        .body(Body::from(body))
        .unwrap();
    let response = app(pipeline()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: ScanResponse = read_json(response).await;
    assert_eq!(body.data.preview.kind, "application/pdf");
    assert_eq!(body.data.recognition.unwrap().document_type, "mietvertrag");
}

#[tokio::test]
async fn test_multipart_without_file_is_rejected() {
    let boundary = "quickscanboundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"last_modified\"\r\n\r\n0\r\n--{b}--\r\n",
        b = boundary
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/scan")
        .header("content-type", format!("multipart/form-data; boundary={}", boundary))
        .body(Body::from(body))
        .unwrap();
    let response = app(pipeline()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_background_analysis_is_polled_by_scan_id() {
    let pipeline = pipeline()
        .with_dispatcher(BackgroundDispatcher::new(Arc::new(StaticAnalysis)).with_delay(Duration::from_millis(1)));
    let router = app(pipeline);

    let pdf = make_pdf(&["Betriebskostenabrechnung\nNachzahlung: 120,50 EUR"]);
    let response = router
        .clone()
        .oneshot(binary_upload("abrechnung.pdf", "application/pdf", pdf))
        .await
        .unwrap();
    let body: ScanResponse = read_json(response).await;
    assert!(matches!(
        body.data.state,
        ScanState::BackgroundDispatched | ScanState::BackgroundReady
    ));
    let scan_id = body.data.scan_id;

    let mut last = Value::Null;
    for _ in 0..50 {
        let request = Request::builder()
            .uri(format!("/api/v1/scan/{}/analysis", scan_id))
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        last = read_json(response).await;
        if last["status"] != "pending" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(last["scan_id"], scan_id.to_string());
    assert_eq!(last["status"], "ready");
    assert_eq!(last["payload"]["document_type"], "nebenkostenabrechnung");
}

#[tokio::test]
async fn test_unknown_scan_id_is_not_found() {
    let request = Request::builder()
        .uri(format!("/api/v1/scan/{}/analysis", uuid::Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let response = app(pipeline()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = read_json(response).await;
    assert_eq!(body["error"]["code"], "SCAN_NOT_FOUND");
}

#[tokio::test]
async fn test_health_reports_document_types() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app(pipeline()).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"]["extractor"], "lopdf");
    assert_eq!(body["services"]["analysis"], "disabled");
    assert_eq!(
        body["services"]["document_types"],
        json!(["nebenkostenabrechnung", "mietvertrag"])
    );
}

#[tokio::test]
async fn test_health_reports_configured_scan_slots() {
    let router = create_router(AppState::new(pipeline(), 64, 3), BODY_LIMIT);
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();

    let body: Value = read_json(response).await;
    assert_eq!(body["scans"]["available_slots"], 3);
    assert_eq!(body["scans"]["total"], 0);
}

#[tokio::test]
async fn test_ready_requires_patterns() {
    let empty = ScanPipeline::new(
        FileValidator::default(),
        Arc::new(PdfTextExtractor::new()),
        Arc::new(Recognizer::new(Arc::new(PatternRegistry::new()))),
    );
    let request = || Request::builder().uri("/ready").body(Body::empty()).unwrap();

    let response = app(pipeline()).oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(empty).oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

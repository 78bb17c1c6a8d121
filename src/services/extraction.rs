use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use lopdf::{Document, Object};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::models::{ExtractionResult, FileHandle, Stage, StageTiming};

const TITLE_MAX_CHARS: usize = 50;

/// Bounds on how much of a document fast extraction reads and keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionLimits {
    pub max_pages: usize,
    pub max_chars: usize,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_pages: 3,
            max_chars: 500,
        }
    }
}

/// Opens a document and returns text from its first pages plus metadata.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(
        &self,
        file: &FileHandle,
        limits: ExtractionLimits,
        cancel: &CancellationToken,
    ) -> AppResult<ExtractionResult>;

    fn name(&self) -> &'static str;
}

/// Page-document extractor backed by lopdf.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

struct PageText {
    page_count: usize,
    pages_read: usize,
    title: Option<String>,
    author: Option<String>,
    text_preview: String,
}

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract_blocking(
        content: Bytes,
        limits: ExtractionLimits,
        cancel: CancellationToken,
    ) -> AppResult<PageText> {
        let doc = Document::load_mem(&content)?;
        let pages = doc.get_pages();
        let page_count = pages.len();

        let mut page_texts = Vec::with_capacity(limits.max_pages.min(page_count));
        for page_number in pages.keys().take(limits.max_pages) {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled {
                    stage: Stage::Extraction,
                });
            }
            let raw = doc.extract_text(&[*page_number])?;
            page_texts.push(clean_page_text(&raw));
        }

        let title = info_string(&doc, b"Title")
            .or_else(|| page_texts.first().and_then(|text| title_from_text(text)));
        let author = info_string(&doc, b"Author");
        let text_preview: String = page_texts.join("\n").chars().take(limits.max_chars).collect();

        Ok(PageText {
            page_count,
            pages_read: page_texts.len(),
            title,
            author,
            text_preview,
        })
    }
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(
        &self,
        file: &FileHandle,
        limits: ExtractionLimits,
        cancel: &CancellationToken,
    ) -> AppResult<ExtractionResult> {
        let start = Instant::now();

        tracing::info!(
            "Starting fast extraction for file: {} ({} bytes)",
            file.name,
            file.size
        );

        if !file.is_pdf() {
            return Err(AppError::UnsupportedKind {
                kind: file.kind.clone(),
            });
        }

        let content = file.content().clone();
        let token = cancel.clone();
        let page_text = tokio::task::spawn_blocking(move || Self::extract_blocking(content, limits, token))
            .await
            .map_err(|e| AppError::internal(format!("Extraction task failed: {}", e)))??;

        let timing = StageTiming::measure(Stage::Extraction, start.elapsed());
        if !timing.within_target {
            tracing::warn!(
                elapsed_ms = timing.elapsed_ms,
                target_ms = timing.target_ms,
                "Fast extraction exceeded its latency target"
            );
        }

        tracing::info!(
            "Fast extraction completed in {}ms, read {} of {} pages, kept {} characters",
            timing.elapsed_ms,
            page_text.pages_read,
            page_text.page_count,
            page_text.text_preview.chars().count()
        );

        Ok(ExtractionResult {
            page_count: page_text.page_count,
            pages_read: page_text.pages_read,
            title: page_text.title,
            author: page_text.author,
            text_preview: page_text.text_preview,
            timing,
        })
    }

    fn name(&self) -> &'static str {
        "lopdf"
    }
}

/// Trims every line and drops blank ones.
fn clean_page_text(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// First non-blank line, capped at 50 characters.
pub fn title_from_text(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.chars().take(TITLE_MAX_CHARS).collect::<String>().trim_end().to_string())
}

fn info_string(doc: &Document, key: &[u8]) -> Option<String> {
    let info = match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        direct => direct,
    };
    let raw = info.as_dict().ok()?.get(key).ok()?.as_str().ok()?;
    let value = decode_pdf_string(raw);
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        decode_utf16(rest, u16::from_be_bytes)
    } else if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        decode_utf16(rest, u16::from_le_bytes)
    } else if looks_like_utf16(bytes) {
        decode_utf16(bytes, u16::from_be_bytes)
    } else {
        Document::decode_text(Some("WinAnsiEncoding"), bytes)
    }
}

// More than a third of the bytes being NUL means BOM-less UTF-16.
fn looks_like_utf16(bytes: &[u8]) -> bool {
    if bytes.len() < 2 {
        return false;
    }
    let null_count = bytes.iter().filter(|&&b| b == 0).count();
    null_count > bytes.len() / 3
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> String {
    let units = bytes.chunks_exact(2).map(|pair| to_unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .filter_map(Result::ok)
        .filter(|c| *c != '\0')
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{KIND_PDF, KIND_PNG};
    use lopdf::{dictionary, Stream};

    /// Builds a PDF with one Helvetica text line per page.
    pub(crate) fn make_test_pdf(pages: &[&str], title: Option<&str>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", text);
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

        if let Some(title) = title {
            let info_id = doc.add_object(dictionary! {
                "Title" => Object::string_literal(title),
                "Author" => Object::string_literal("Hausverwaltung Muster"),
            });
            doc.trailer.set("Info", info_id);
        }

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn pdf_file(pages: &[&str], title: Option<&str>) -> FileHandle {
        FileHandle::new("test.pdf", KIND_PDF, make_test_pdf(pages, title))
    }

    #[tokio::test]
    async fn reads_metadata_and_first_page_text() {
        let file = pdf_file(&["Nebenkostenabrechnung 2023"], Some("Abrechnung Wohnung 3"));
        let result = PdfTextExtractor::new()
            .extract(&file, ExtractionLimits::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.page_count, 1);
        assert_eq!(result.pages_read, 1);
        assert_eq!(result.title.as_deref(), Some("Abrechnung Wohnung 3"));
        assert_eq!(result.author.as_deref(), Some("Hausverwaltung Muster"));
        assert!(result.text_preview.contains("Nebenkostenabrechnung"));
    }

    #[tokio::test]
    async fn only_first_three_pages_are_read() {
        let file = pdf_file(&["Seite eins", "Seite zwei", "Seite drei", "Seite vier", "Seite fuenf"], None);
        let result = PdfTextExtractor::new()
            .extract(&file, ExtractionLimits::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.page_count, 5);
        assert_eq!(result.pages_read, 3);
        assert!(result.text_preview.contains("drei"));
        assert!(!result.text_preview.contains("vier"));
        assert!(!result.text_preview.contains("fuenf"));
    }

    #[tokio::test]
    async fn title_falls_back_to_first_line() {
        let file = pdf_file(&["Betriebskostenabrechnung fuer das Kalenderjahr 2023 Objekt Musterstrasse 12"], None);
        let result = PdfTextExtractor::new()
            .extract(&file, ExtractionLimits::default(), &CancellationToken::new())
            .await
            .unwrap();

        let title = result.title.unwrap();
        assert!(title.starts_with("Betriebskostenabrechnung"));
        assert!(title.chars().count() <= TITLE_MAX_CHARS);
        assert!(result.author.is_none());
    }

    #[tokio::test]
    async fn preview_is_bounded() {
        let long_line = "Heizkosten ".repeat(30);
        let file = pdf_file(&[long_line.as_str(), long_line.as_str()], None);
        let limits = ExtractionLimits {
            max_pages: 3,
            max_chars: 40,
        };
        let result = PdfTextExtractor::new()
            .extract(&file, limits, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.text_preview.chars().count(), 40);
    }

    #[tokio::test]
    async fn corrupt_pdf_is_an_error() {
        let file = FileHandle::new("broken.pdf", KIND_PDF, b"%PDF-1.4 this is not a document".to_vec());
        let err = PdfTextExtractor::new()
            .extract(&file, ExtractionLimits::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "EXTRACTION_FAILED");
    }

    #[tokio::test]
    async fn images_have_no_text_layer() {
        let file = FileHandle::new("scan.png", KIND_PNG, vec![0u8; 16]);
        let err = PdfTextExtractor::new()
            .extract(&file, ExtractionLimits::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_KIND");
    }

    #[tokio::test]
    async fn cancelled_token_stops_extraction() {
        let file = pdf_file(&["Seite eins"], None);
        let token = CancellationToken::new();
        token.cancel();
        let err = PdfTextExtractor::new()
            .extract(&file, ExtractionLimits::default(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled { stage: Stage::Extraction }));
    }

    #[test]
    fn decodes_utf16_metadata() {
        let be = [0xFE, 0xFF, 0x00, b'M', 0x00, b'i', 0x00, 0xE4];
        assert_eq!(decode_pdf_string(&be), "Miä");

        let le = [0xFF, 0xFE, b'O', 0x00, b'K', 0x00];
        assert_eq!(decode_pdf_string(&le), "OK");

        assert_eq!(decode_pdf_string(b"plain"), "plain");
        assert_eq!(decode_pdf_string(b"M\xFCller"), "Müller");
    }

    #[test]
    fn title_from_text_skips_blank_lines() {
        assert_eq!(title_from_text("\n   \n  Mietvertrag  \nrest").as_deref(), Some("Mietvertrag"));
        assert_eq!(title_from_text("   "), None);
    }
}

use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

pub const KIND_PDF: &str = "application/pdf";
pub const KIND_PNG: &str = "image/png";
pub const KIND_JPEG: &str = "image/jpeg";
pub const KIND_OCTET_STREAM: &str = "application/octet-stream";

/// An uploaded document plus the attributes the caller declared for it.
///
/// Cloning is cheap: the content is reference counted, so the background
/// analysis job can hold its own handle after the synchronous stages finish.
#[derive(Debug, Clone)]
pub struct FileHandle {
    pub name: String,
    pub size: u64,
    pub kind: String,
    pub last_modified: DateTime<Utc>,
    content: Bytes,
}

/// Cache key for a file: two handles with equal identity are treated as the
/// same unchanged document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    pub name: String,
    pub size: u64,
    pub last_modified_ms: i64,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, content: impl Into<Bytes>) -> Self {
        let content = content.into();
        Self {
            name: name.into(),
            size: content.len() as u64,
            kind: kind.into(),
            last_modified: Utc::now(),
            content,
        }
    }

    /// Loads a file from disk, taking the modification time from its metadata.
    pub async fn from_path(path: impl AsRef<Path>, kind: impl Into<String>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await?;
        let modified = tokio::fs::metadata(path).await?.modified()?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        Ok(Self::new(name, kind, content).with_last_modified(DateTime::<Utc>::from(modified)))
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = last_modified;
        self
    }

    /// Sets the modification time from epoch milliseconds, the way browsers report it.
    pub fn with_last_modified_ms(self, millis: i64) -> Self {
        match Utc.timestamp_millis_opt(millis).single() {
            Some(ts) => self.with_last_modified(ts),
            None => self,
        }
    }

    /// Overrides the declared size. Only useful for callers that know the
    /// original upload size differs from the bytes they hold.
    pub fn with_declared_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn identity(&self) -> FileIdentity {
        FileIdentity {
            name: self.name.clone(),
            size: self.size,
            last_modified_ms: self.last_modified.timestamp_millis(),
        }
    }

    pub fn is_pdf(&self) -> bool {
        if self.kind == KIND_PDF {
            return true;
        }
        if self.kind.is_empty() || self.kind == KIND_OCTET_STREAM {
            return self.name.to_lowercase().ends_with(".pdf") || self.content.starts_with(b"%PDF");
        }
        false
    }
}

/// Guesses a document kind from its leading bytes.
pub fn sniff_kind(content: &[u8]) -> Option<&'static str> {
    if content.starts_with(b"%PDF") {
        return Some(KIND_PDF);
    }
    match image::guess_format(content) {
        Ok(image::ImageFormat::Png) => Some(KIND_PNG),
        Ok(image::ImageFormat::Jpeg) => Some(KIND_JPEG),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_follows_content() {
        let file = FileHandle::new("a.pdf", KIND_PDF, vec![0u8; 42]);
        assert_eq!(file.size, 42);
        assert_eq!(file.content().len(), 42);
    }

    #[test]
    fn identity_uses_name_size_and_mtime() {
        let a = FileHandle::new("a.pdf", KIND_PDF, vec![1u8; 10]).with_last_modified_ms(1_700_000_000_000);
        let b = FileHandle::new("a.pdf", KIND_PDF, vec![2u8; 10]).with_last_modified_ms(1_700_000_000_000);
        let c = FileHandle::new("a.pdf", KIND_PDF, vec![1u8; 10]).with_last_modified_ms(1_700_000_000_001);

        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
    }

    #[test]
    fn octet_stream_falls_back_to_magic_bytes() {
        let file = FileHandle::new("blob", KIND_OCTET_STREAM, b"%PDF-1.4 ...".to_vec());
        assert!(file.is_pdf());

        let png = FileHandle::new("scan.png", KIND_PNG, b"%PDF-1.4 ...".to_vec());
        assert!(!png.is_pdf());
    }

    #[test]
    fn sniffs_pdf_and_png() {
        assert_eq!(sniff_kind(b"%PDF-1.7"), Some(KIND_PDF));
        let png_header = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(sniff_kind(&png_header), Some(KIND_PNG));
        assert_eq!(sniff_kind(b"hello"), None);
    }

    #[tokio::test]
    async fn loads_from_disk() {
        use std::io::Write;

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.4 test").unwrap();

        let file = FileHandle::from_path(tmp.path(), KIND_PDF).await.unwrap();
        assert_eq!(file.size, 13);
        assert!(file.is_pdf());
    }
}

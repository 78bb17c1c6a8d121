use crate::error::{AppError, AppResult};
use crate::models::{FileHandle, KIND_JPEG, KIND_PDF, KIND_PNG};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Accepts or rejects a file by declared kind and size. Never reads content.
#[derive(Debug, Clone)]
pub struct FileValidator {
    accepted_kinds: Vec<String>,
    max_size_bytes: u64,
}

impl FileValidator {
    pub fn new(max_size_bytes: u64) -> Self {
        Self {
            accepted_kinds: vec![KIND_PDF.to_string(), KIND_PNG.to_string(), KIND_JPEG.to_string()],
            max_size_bytes,
        }
    }

    pub fn with_accepted_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted_kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn is_valid(&self, file: &FileHandle) -> bool {
        self.validate(file).is_ok()
    }

    /// Same verdict as [`is_valid`](Self::is_valid), with the reason on rejection.
    pub fn validate(&self, file: &FileHandle) -> AppResult<()> {
        if !self.accepted_kinds.iter().any(|k| k == &file.kind) {
            return Err(AppError::UnsupportedKind {
                kind: file.kind.clone(),
            });
        }
        if file.size > self.max_size_bytes {
            return Err(AppError::FileTooLarge {
                size: file.size.div_ceil(1024 * 1024),
                limit: self.max_size_bytes / (1024 * 1024),
            });
        }
        Ok(())
    }
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_SIZE)
    }
}

use std::time::Instant;

use crate::models::{FileHandle, InstantPreview, Stage, StageTiming};
use crate::services::validator::FileValidator;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Builds the instant preview from file attributes only.
pub fn instant_preview(file: &FileHandle, validator: &FileValidator) -> InstantPreview {
    let start = Instant::now();

    let is_valid = validator.is_valid(file);
    let size_label = format_file_size(file.size);
    let last_modified_label = file.last_modified.format("%-d.%-m.%Y").to_string();

    let preview = InstantPreview {
        name: file.name.clone(),
        size_label,
        kind: file.kind.clone(),
        last_modified_label,
        is_valid,
        estimated_duration_label: estimate_duration(file.size).to_string(),
        timing: StageTiming::measure(Stage::Preview, start.elapsed()),
    };

    tracing::debug!(
        file_name = %preview.name,
        is_valid = preview.is_valid,
        elapsed_ms = preview.timing.elapsed_ms,
        "Instant preview ready"
    );
    preview
}

pub fn format_file_size(bytes: u64) -> String {
    if bytes < KIB {
        format!("{} B", bytes)
    } else if bytes < MIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    }
}

/// Coarse processing-time bucket by file size.
pub fn estimate_duration(bytes: u64) -> &'static str {
    if bytes < MIB {
        "under 1s"
    } else if bytes < 5 * MIB {
        "1–3s"
    } else {
        "3–5s"
    }
}

use crate::models::Confidence;

/// Field-count boundaries between confidence tiers
pub mod thresholds {
    /// At least this many fields: low confidence.
    pub const LOW: usize = 1;

    /// At least this many fields: medium confidence.
    pub const MEDIUM: usize = 3;

    /// At least this many fields: high confidence.
    pub const HIGH: usize = 5;
}

/// Confidence tier for a number of extracted fields. Monotonic in `field_count`.
pub fn score(field_count: usize) -> Confidence {
    if field_count >= thresholds::HIGH {
        Confidence::High
    } else if field_count >= thresholds::MEDIUM {
        Confidence::Medium
    } else if field_count >= thresholds::LOW {
        Confidence::Low
    } else {
        Confidence::None
    }
}

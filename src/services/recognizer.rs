use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use crate::models::{FieldValue, RecognitionResult, Stage, StageTiming};
use crate::services::confidence;
use crate::services::patterns::{FieldKind, PatternDefinition, PatternRegistry};

/// How a document type is chosen when several definitions match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchStrategy {
    /// First definition in registry order with any keyword hit.
    #[default]
    FirstMatch,
    /// Definition with the most keyword hits; ties go to registry order.
    BestScore,
}

impl FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first-match" | "first_match" | "first" => Ok(MatchStrategy::FirstMatch),
            "best-score" | "best_score" | "best" => Ok(MatchStrategy::BestScore),
            other => Err(format!("unknown recognition strategy '{}'", other)),
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStrategy::FirstMatch => f.write_str("first-match"),
            MatchStrategy::BestScore => f.write_str("best-score"),
        }
    }
}

/// Classifies text against a pattern registry and pulls structured fields.
#[derive(Debug, Clone)]
pub struct Recognizer {
    registry: Arc<PatternRegistry>,
    strategy: MatchStrategy,
}

impl Recognizer {
    pub fn new(registry: Arc<PatternRegistry>) -> Self {
        Self {
            registry,
            strategy: MatchStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    pub fn classify(&self, text: &str) -> Option<&PatternDefinition> {
        let text_lower = text.to_lowercase();
        let definitions = self.registry.definitions();

        match self.strategy {
            MatchStrategy::FirstMatch => definitions.iter().find(|d| d.keyword_hits(&text_lower) > 0),
            MatchStrategy::BestScore => {
                let mut best: Option<(&PatternDefinition, usize)> = None;
                for definition in definitions {
                    let hits = definition.keyword_hits(&text_lower);
                    if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
                        best = Some((definition, hits));
                    }
                }
                best.map(|(definition, _)| definition)
            }
        }
    }

    /// Never fails: text without any keyword yields the unknown type.
    pub fn recognize(&self, text: &str) -> RecognitionResult {
        let start = Instant::now();

        let Some(definition) = self.classify(text) else {
            tracing::debug!("No pattern definition matched, document type unknown");
            return RecognitionResult::unknown(StageTiming::measure(Stage::Recognition, start.elapsed()));
        };

        let mut extracted_fields = BTreeMap::new();
        for rule in definition.fields() {
            let Some(raw) = rule.capture(text) else {
                continue;
            };
            let value = match rule.kind {
                FieldKind::Amount => parse_amount(Some(raw)).map(FieldValue::Amount),
                FieldKind::Text => Some(raw.trim())
                    .filter(|s| !s.is_empty())
                    .map(|s| FieldValue::Text(s.to_string())),
            };
            match value {
                Some(value) => {
                    extracted_fields.insert(rule.name.clone(), value);
                }
                None => tracing::debug!(field = %rule.name, raw = %raw, "Rejected unparsable field value"),
            }
        }

        let result = RecognitionResult {
            document_type: definition.document_type.clone(),
            confidence: confidence::score(extracted_fields.len()),
            extracted_fields,
            degraded: false,
            timing: StageTiming::measure(Stage::Recognition, start.elapsed()),
        };

        tracing::debug!(
            document_type = %result.document_type,
            fields = result.extracted_fields.len(),
            confidence = result.confidence.value(),
            "Document recognized"
        );
        result
    }
}

/// Parses a German-formatted amount: `.` groups thousands, `,` marks decimals.
///
/// Empty, malformed and non-finite inputs are rejected with `None`.
pub fn parse_amount(raw: Option<&str>) -> Option<f64> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    let normalized = raw.replace('.', "").replacen(',', ".", 1);
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

impl Default for Recognizer {
    fn default() -> Self {
        Self::new(Arc::new(PatternRegistry::default()))
    }
}

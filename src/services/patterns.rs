//! Document-type definitions used by the recognizer.
//!
//! A definition is data: a keyword set that identifies the document type and
//! an ordered list of field rules. Each rule is a case-insensitive regex with
//! exactly one capture group. Definitions are kept in registration order,
//! which is also the order the recognizer tries them in.

use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Locale-formatted decimal amount (`1.234,56`).
    #[default]
    Amount,
    /// Kept verbatim after trimming.
    Text,
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: String,
    pub kind: FieldKind,
    regex: Regex,
}

impl FieldRule {
    pub fn new(name: impl Into<String>, pattern: &str, kind: FieldKind) -> AppResult<Self> {
        let name = name.into();
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        // captures_len counts the implicit whole-match group.
        if regex.captures_len() != 2 {
            return Err(AppError::pattern(format!(
                "field '{}' must have exactly one capture group, found {}",
                name,
                regex.captures_len() - 1
            )));
        }
        Ok(Self { name, kind, regex })
    }

    /// The captured substring of the first match, if any.
    pub fn capture<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

#[derive(Debug, Clone)]
pub struct PatternDefinition {
    pub document_type: String,
    keywords: Vec<String>,
    keywords_lower: Vec<String>,
    fields: Vec<FieldRule>,
}

impl PatternDefinition {
    pub fn new(document_type: impl Into<String>) -> Self {
        Self {
            document_type: document_type.into(),
            keywords: Vec::new(),
            keywords_lower: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        let keyword = keyword.into();
        self.keywords_lower.push(keyword.to_lowercase());
        self.keywords.push(keyword);
        self
    }

    pub fn field(mut self, name: impl Into<String>, pattern: &str, kind: FieldKind) -> AppResult<Self> {
        self.fields.push(FieldRule::new(name, pattern, kind)?);
        Ok(self)
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn fields(&self) -> &[FieldRule] {
        &self.fields
    }

    /// Number of keywords occurring in `text_lower`, which must already be lowercased.
    pub fn keyword_hits(&self, text_lower: &str) -> usize {
        self.keywords_lower
            .iter()
            .filter(|kw| text_lower.contains(kw.as_str()))
            .count()
    }

    fn to_entry(&self) -> PatternEntry {
        PatternEntry {
            document_type: self.document_type.clone(),
            keywords: self.keywords.clone(),
            fields: self
                .fields
                .iter()
                .map(|f| FieldEntry {
                    name: f.name.clone(),
                    pattern: f.pattern().to_string(),
                    kind: f.kind,
                })
                .collect(),
        }
    }
}

/// Serialized form of a [`PatternDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternEntry {
    pub document_type: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FieldEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldEntry {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub kind: FieldKind,
}

impl TryFrom<PatternEntry> for PatternDefinition {
    type Error = AppError;

    fn try_from(entry: PatternEntry) -> AppResult<Self> {
        let mut definition = entry
            .keywords
            .into_iter()
            .fold(PatternDefinition::new(entry.document_type), |d, kw| d.keyword(kw));
        for field in entry.fields {
            definition = definition.field(field.name, &field.pattern, field.kind)?;
        }
        Ok(definition)
    }
}

type BuiltinField = (&'static str, &'static str, FieldKind);

const BUILTIN: &[(&str, &[&str], &[BuiltinField])] = &[
    (
        "nebenkostenabrechnung",
        &["Nebenkostenabrechnung", "Betriebskostenabrechnung", "Heizkosten"],
        &[
            (
                "zeitraum",
                r"(?:Abrechnungszeitraum|Zeitraum|Periode)[:\s]*([0-9.]+[\s-]+[0-9.]+)",
                FieldKind::Text,
            ),
            ("gesamtkosten", r"(?:Gesamtkosten|Summe|Gesamt)[:\s]*([0-9.,]+)\s*€", FieldKind::Amount),
            ("nachzahlung", r"(?:Nachzahlung|Nachforderung)[:\s]*([0-9.,]+)\s*€", FieldKind::Amount),
            ("guthaben", r"(?:Guthaben|Erstattung)[:\s]*([0-9.,]+)\s*€", FieldKind::Amount),
        ],
    ),
    (
        "mietvertrag",
        &["Mietvertrag", "Mietsache", "Vermieter", "Mieter"],
        &[
            ("miete", r"(?:Kaltmiete|Grundmiete)[:\s]*([0-9.,]+)\s*€", FieldKind::Amount),
            ("nebenkosten", r"(?:Nebenkosten|Betriebskosten)[:\s]*([0-9.,]+)\s*€", FieldKind::Amount),
            ("kaution", r"(?:Kaution|Sicherheit)[:\s]*([0-9.,]+)\s*€", FieldKind::Amount),
        ],
    ),
];

/// Ordered, read-only-at-scan-time table of document types.
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    definitions: Vec<PatternDefinition>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Utility statements first, then rental contracts.
    pub fn builtin() -> AppResult<Self> {
        let mut registry = Self::new();
        for (document_type, keywords, fields) in BUILTIN {
            let mut definition = keywords
                .iter()
                .fold(PatternDefinition::new(*document_type), |d, kw| d.keyword(*kw));
            for (name, pattern, kind) in fields.iter() {
                definition = definition.field(*name, pattern, *kind)?;
            }
            registry.register(definition)?;
        }
        Ok(registry)
    }

    pub fn from_json(json: &str) -> AppResult<Self> {
        let entries: Vec<PatternEntry> = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for entry in entries {
            registry.register(PatternDefinition::try_from(entry)?)?;
        }
        Ok(registry)
    }

    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("Failed to read patterns file {}: {}", path.display(), e))
        })?;
        let registry = Self::from_json(&json)?;
        tracing::info!(
            path = %path.display(),
            document_types = registry.len(),
            "Loaded pattern definitions"
        );
        Ok(registry)
    }

    /// Appends a definition. Later registrations are tried after earlier ones.
    pub fn register(&mut self, definition: PatternDefinition) -> AppResult<()> {
        if definition.keywords.is_empty() {
            return Err(AppError::pattern(format!(
                "document type '{}' has no keywords",
                definition.document_type
            )));
        }
        if self
            .definitions
            .iter()
            .any(|d| d.document_type == definition.document_type)
        {
            return Err(AppError::pattern(format!(
                "document type '{}' is already registered",
                definition.document_type
            )));
        }
        self.definitions.push(definition);
        Ok(())
    }

    pub fn definitions(&self) -> &[PatternDefinition] {
        &self.definitions
    }

    pub fn document_types(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.document_type.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn to_json(&self) -> AppResult<String> {
        let entries: Vec<PatternEntry> = self.definitions.iter().map(PatternDefinition::to_entry).collect();
        Ok(serde_json::to_string_pretty(&entries)?)
    }
}

//! Rendered document model.
//!
//! A [`Document`] is an ordered sequence of titled sections, produced by the
//! [`DocumentAssembler`] and consumed by the sinks in [`crate::export`].

mod assembler;

pub use assembler::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Section identity, in the fixed rendering order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SectionKind {
    Header,
    Subjective,
    Objective,
    Assessment,
    Plan,
    LifestyleRecommendations,
    AdditionalNotes,
    SafetyAlert,
    Footer,
}

/// Visual treatment of a section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SectionStyle {
    /// Document title block
    Title,
    /// Regular boxed section header
    Standard,
    /// High-contrast callout
    Alert,
    /// Small centered print
    Footer,
}

/// A label/value row of a two-column table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableRow {
    pub label: String,
    pub value: String,
}

impl TableRow {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Content inside a section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Block {
    Subheading(String),
    Paragraph(String),
    /// Bold inline label followed by text
    Labeled { label: String, text: String },
    Table(Vec<TableRow>),
    /// Small italic print
    Note(String),
}

/// One titled section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub kind: SectionKind,
    pub title: String,
    pub style: SectionStyle,
    pub blocks: Vec<Block>,
}

/// A rendered SOAP document ready for pagination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<Section>,
}

impl Document {
    /// First section of the given kind.
    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn has_section(&self, kind: SectionKind) -> bool {
        self.section(kind).is_some()
    }

    /// Sections other than Header and Footer; these carry no timestamps.
    pub fn body_sections(&self) -> impl Iterator<Item = &Section> {
        self.sections
            .iter()
            .filter(|s| !matches!(s.kind, SectionKind::Header | SectionKind::Footer))
    }

    /// SHA-256 (hex) of the body sections.
    ///
    /// Identical records render to identical fingerprints regardless of when
    /// they were rendered.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for section in self.body_sections() {
            let bytes = serde_json::to_vec(section).unwrap_or_default();
            hasher.update(&bytes);
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(kind: SectionKind, text: &str) -> Section {
        Section {
            kind,
            title: format!("{:?}", kind),
            style: SectionStyle::Standard,
            blocks: vec![Block::Paragraph(text.to_string())],
        }
    }

    #[test]
    fn test_fingerprint_ignores_header_and_footer() {
        let mut a = Document {
            title: "MedFlow AI".into(),
            generated_at: Utc::now(),
            sections: vec![
                section(SectionKind::Header, "Date: January 01, 2024"),
                section(SectionKind::Assessment, "Stable"),
                section(SectionKind::Footer, "Generated at 10:00"),
            ],
        };
        let fp_a = a.fingerprint();

        a.sections[0] = section(SectionKind::Header, "Date: February 02, 2025");
        a.sections[2] = section(SectionKind::Footer, "Generated at 11:00");
        assert_eq!(a.fingerprint(), fp_a);

        a.sections[1] = section(SectionKind::Assessment, "Worsening");
        assert_ne!(a.fingerprint(), fp_a);
        assert_eq!(fp_a.len(), 64);
    }

    #[test]
    fn test_section_lookup() {
        let doc = Document {
            title: "MedFlow AI".into(),
            generated_at: Utc::now(),
            sections: vec![section(SectionKind::Plan, "CBC")],
        };
        assert!(doc.has_section(SectionKind::Plan));
        assert!(!doc.has_section(SectionKind::SafetyAlert));
    }
}

//! Document assembler: turns a final record into ordered sections.
//!
//! Section order is fixed: Header, Subjective, Objective, Assessment, Plan,
//! Lifestyle Recommendations, Additional Notes, Safety Alert, Footer.
//! Every optional piece is gated by [`present`]; required pieces that are
//! absent render as [`MISSING`] rather than failing the document.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{Block, Document, Section, SectionKind, SectionStyle, TableRow};
use crate::models::{
    display_value, is_sentinel, present, ClinicalField, FinalRecord, LifestyleRecommendations,
    MedicationReview, TestValidation, MISSING,
};

/// Shown in the header when an identification field is unknown.
pub const UNKNOWN_VALUE: &str = "[Not recorded]";

pub const DOCUMENT_TITLE: &str = "MedFlow AI";

pub const DISCLAIMER: &str = "This SOAP note is for medical documentation purposes. \
All information should be verified and supplemented with complete clinical assessment.";

const VITAL_SIGNS: [(&str, &str); 5] = [
    ("blood_pressure", "Blood Pressure"),
    ("heart_rate", "Heart Rate"),
    ("respiratory_rate", "Respiratory Rate"),
    ("temperature", "Temperature"),
    ("oxygen_saturation", "Oxygen Saturation"),
];

const IMAGING: [(&str, &str); 2] = [("chest_xray", "Chest X-Ray"), ("other_imaging", "Other Imaging")];

/// Renders final records into documents.
#[derive(Debug, Clone, Default)]
pub struct DocumentAssembler {
    provider_name: Option<String>,
}

impl DocumentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider shown in the header.
    pub fn with_provider(mut self, provider_name: Option<String>) -> Self {
        self.provider_name = provider_name;
        self
    }

    /// Render a record, stamped with the current time.
    pub fn render(&self, record: &FinalRecord) -> Document {
        self.render_at(record, Utc::now())
    }

    /// Render a record with an explicit generation time.
    pub fn render_at(&self, record: &FinalRecord, generated_at: DateTime<Utc>) -> Document {
        let note = &record.soap_note;
        let mut sections = vec![
            self.header(record, generated_at),
            subjective_section(&note.subjective),
            objective_section(&note.objective),
            text_section(
                SectionKind::Assessment,
                "A: ASSESSMENT",
                required_text(&note.assessment),
            ),
            plan_section(record),
        ];

        if let Some(lifestyle) = &record.lifestyle_recommendations {
            sections.push(lifestyle_section(lifestyle));
        }

        if present(&record.additional_notes) {
            sections.push(text_section(
                SectionKind::AdditionalNotes,
                "Additional Notes",
                record.additional_notes.clone(),
            ));
        }

        if present(&record.safety_notice) {
            sections.push(Section {
                kind: SectionKind::SafetyAlert,
                title: "SAFETY ALERT".into(),
                style: SectionStyle::Alert,
                blocks: vec![Block::Paragraph(record.safety_notice.clone())],
            });
        }

        sections.push(footer(generated_at));

        Document {
            title: DOCUMENT_TITLE.into(),
            generated_at,
            sections,
        }
    }

    fn header(&self, record: &FinalRecord, generated_at: DateTime<Utc>) -> Section {
        let known = |value: Option<&String>| {
            value
                .filter(|v| present(*v))
                .cloned()
                .unwrap_or_else(|| UNKNOWN_VALUE.to_string())
        };

        Section {
            kind: SectionKind::Header,
            title: "SOAP NOTE".into(),
            style: SectionStyle::Title,
            blocks: vec![Block::Table(vec![
                TableRow::new("Date:", generated_at.format("%B %d, %Y").to_string()),
                TableRow::new("Patient:", known(record.patient_name.as_ref())),
                TableRow::new("Patient ID:", known(record.patient_id.as_ref())),
                TableRow::new("Provider:", known(self.provider_name.as_ref())),
            ])],
        }
    }
}

fn subjective_section(subjective: &ClinicalField) -> Section {
    let mut blocks = narrative(subjective);

    field(&mut blocks, "Chief Complaint", entry_or(subjective, "chief_complaint", MISSING));
    field(
        &mut blocks,
        "History of Present Illness",
        entry_or(subjective, "history_of_present_illness", MISSING),
    );
    field(
        &mut blocks,
        "Past Medical History",
        entry_or(subjective, "past_medical_history", MISSING),
    );
    field(
        &mut blocks,
        "Current Medications",
        listed_or(subjective, "medications", "None reported"),
    );
    field(
        &mut blocks,
        "Allergies",
        listed_or(subjective, "allergies", "No known drug allergies (NKDA)"),
    );

    // Collected-but-empty and not-asked both stay out of the document.
    for (key, label) in [
        ("social_history", "Social History"),
        ("family_history", "Family History"),
        ("review_of_systems", "Review of Systems"),
    ] {
        if let Some(value) = present_entry(subjective, key) {
            field(&mut blocks, label, display_value(value));
        }
    }

    Section {
        kind: SectionKind::Subjective,
        title: "S: SUBJECTIVE".into(),
        style: SectionStyle::Standard,
        blocks,
    }
}

fn objective_section(objective: &ClinicalField) -> Section {
    let mut blocks = narrative(objective);

    let rows = vital_sign_rows(objective.get("vital_signs"));
    if !rows.is_empty() {
        blocks.push(Block::Subheading("Vital Signs".into()));
        blocks.push(Block::Table(rows));
    }

    if let Some(exam) = present_entry(objective, "physical_exam") {
        field(&mut blocks, "Physical Examination", display_value(exam));
    }

    let imaging: Vec<Block> = objective
        .get("imaging")
        .map(|imaging| {
            IMAGING
                .iter()
                .filter_map(|(key, label)| {
                    imaging.get(*key).filter(|v| present(*v)).map(|v| Block::Labeled {
                        label: (*label).to_string(),
                        text: display_value(v),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    if !imaging.is_empty() {
        blocks.push(Block::Subheading("Imaging Studies".into()));
        blocks.extend(imaging);
    }

    if let Some(labs) = present_entry(objective, "laboratory_results") {
        field(&mut blocks, "Laboratory Results", display_value(labs));
    }

    Section {
        kind: SectionKind::Objective,
        title: "O: OBJECTIVE".into(),
        style: SectionStyle::Standard,
        blocks,
    }
}

/// Vital sign rows, each filtered independently.
pub fn vital_sign_rows(vitals: Option<&Value>) -> Vec<TableRow> {
    let Some(vitals) = vitals else {
        return Vec::new();
    };
    VITAL_SIGNS
        .iter()
        .filter_map(|(key, label)| {
            vitals
                .get(*key)
                .filter(|v| present(*v))
                .map(|v| TableRow::new(format!("{}:", label), display_value(v)))
        })
        .collect()
}

fn plan_section(record: &FinalRecord) -> Section {
    let plan_text = record
        .soap_note
        .plan
        .as_ref()
        .map(|plan| plan.to_display())
        .unwrap_or_else(|| MISSING.to_string());

    let mut section = text_section(SectionKind::Plan, "P: PLAN", plan_text);
    section
        .blocks
        .extend(medication_review_blocks(&record.medication_review));
    section
        .blocks
        .extend(test_validation_blocks(&record.test_validation));
    section
}

fn medication_review_blocks(review: &MedicationReview) -> Vec<Block> {
    if review.confidence_score.is_none() && !present(&review.rationale) {
        return Vec::new();
    }
    let mut blocks = vec![Block::Subheading("Medication Review".into())];
    if let Some(score) = review.confidence_score {
        blocks.push(Block::Labeled {
            label: "Confidence Score".into(),
            text: format!("{}/100", format_score(score)),
        });
    }
    if present(&review.rationale) {
        blocks.push(Block::Labeled {
            label: "Rationale".into(),
            text: review.rationale.clone(),
        });
    }
    blocks
}

fn test_validation_blocks(validations: &[TestValidation]) -> Vec<Block> {
    if validations.is_empty() {
        return Vec::new();
    }
    let mut blocks = vec![Block::Subheading("Test Validation".into())];
    for validation in validations {
        let relevance = match validation.relevance_score {
            Some(score) => format!("Relevance {}/100.", format_score(score)),
            None => "Relevance not scored.".to_string(),
        };
        let text = if present(&validation.rationale) {
            format!("{} {}", relevance, validation.rationale)
        } else {
            relevance
        };
        blocks.push(Block::Labeled {
            label: validation.test.clone(),
            text,
        });
    }
    blocks
}

fn lifestyle_section(lifestyle: &LifestyleRecommendations) -> Section {
    let blocks = lifestyle
        .categories()
        .into_iter()
        .filter(|(_, text)| present(*text))
        .map(|(label, text)| Block::Labeled {
            label: label.to_string(),
            text: text.to_string(),
        })
        .collect();

    Section {
        kind: SectionKind::LifestyleRecommendations,
        title: "Lifestyle Recommendations".into(),
        style: SectionStyle::Standard,
        blocks,
    }
}

fn footer(generated_at: DateTime<Utc>) -> Section {
    Section {
        kind: SectionKind::Footer,
        title: String::new(),
        style: SectionStyle::Footer,
        blocks: vec![
            Block::Note(DISCLAIMER.into()),
            Block::Note(format!(
                "Document generated on: {}",
                generated_at.format("%B %d, %Y at %H:%M")
            )),
        ],
    }
}

fn text_section(kind: SectionKind, title: &str, text: String) -> Section {
    Section {
        kind,
        title: title.into(),
        style: SectionStyle::Standard,
        blocks: vec![Block::Paragraph(text)],
    }
}

/// Displayable text of an always-rendered field, or the sentinel.
fn required_text(value: &ClinicalField) -> String {
    if present(value) {
        value.to_display()
    } else {
        MISSING.to_string()
    }
}

/// Free-text S/O content, shown ahead of any structured entries.
fn narrative(value: &ClinicalField) -> Vec<Block> {
    match value.as_text() {
        Some(text) if present(text) => vec![Block::Paragraph(text.to_string())],
        _ => Vec::new(),
    }
}

fn present_entry<'a>(value: &'a ClinicalField, key: &str) -> Option<&'a Value> {
    value.get(key).filter(|v| present(*v))
}

fn entry_or(value: &ClinicalField, key: &str, fallback: &str) -> String {
    present_entry(value, key)
        .map(display_value)
        .unwrap_or_else(|| fallback.to_string())
}

/// List fields where "none" is itself a finding. Only an absent or empty
/// entry reads as `when_empty`; the sentinel stays [`MISSING`].
fn listed_or(value: &ClinicalField, key: &str, when_empty: &str) -> String {
    match value.get(key) {
        Some(entry) if present(entry) => display_value(entry),
        Some(entry) if mentions_sentinel(entry) => MISSING.to_string(),
        _ => when_empty.to_string(),
    }
}

fn mentions_sentinel(value: &Value) -> bool {
    match value {
        Value::String(s) => is_sentinel(s),
        Value::Array(items) => items.iter().any(mentions_sentinel),
        _ => false,
    }
}

fn field(blocks: &mut Vec<Block>, label: &str, text: String) {
    blocks.push(Block::Subheading(format!("{}:", label)));
    blocks.push(Block::Paragraph(text));
}

fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{:.0}", score)
    } else {
        format!("{:.1}", score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DoctorPlan, SoapNote};
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 8, 14, 30, 0).unwrap()
    }

    fn record_with_objective(objective: Value) -> FinalRecord {
        FinalRecord {
            soap_note: SoapNote {
                objective: ClinicalField::from_value(objective),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn blocks_of(doc: &Document, kind: SectionKind) -> Vec<Block> {
        doc.section(kind).map(|s| s.blocks.clone()).unwrap_or_default()
    }

    #[test]
    fn test_all_sentinel_vitals_suppress_table() {
        let record = record_with_objective(json!({
            "vital_signs": {
                "blood_pressure": "Missing",
                "heart_rate": "Missing",
                "respiratory_rate": "Missing",
                "temperature": "Missing",
                "oxygen_saturation": "Missing"
            }
        }));
        let doc = DocumentAssembler::new().render_at(&record, fixed_time());
        let blocks = blocks_of(&doc, SectionKind::Objective);

        assert!(!blocks.iter().any(|b| matches!(b, Block::Table(_))));
        assert!(!blocks.contains(&Block::Subheading("Vital Signs".into())));
    }

    #[test]
    fn test_single_vital_gives_single_row() {
        let record = record_with_objective(json!({
            "vital_signs": {
                "blood_pressure": "120/80",
                "heart_rate": "Missing",
                "respiratory_rate": "",
                "temperature": "Missing",
                "oxygen_saturation": "Missing"
            }
        }));
        let doc = DocumentAssembler::new().render_at(&record, fixed_time());
        let tables: Vec<&Vec<TableRow>> = doc
            .section(SectionKind::Objective)
            .unwrap()
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Table(rows) => Some(rows),
                _ => None,
            })
            .collect();

        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0], &vec![TableRow::new("Blood Pressure:", "120/80")]);
    }

    #[test]
    fn test_imaging_items_filtered_individually() {
        let record = record_with_objective(json!({
            "imaging": {"chest_xray": "Missing", "other_imaging": "CT unremarkable"}
        }));
        let doc = DocumentAssembler::new().render_at(&record, fixed_time());
        let blocks = blocks_of(&doc, SectionKind::Objective);

        assert!(blocks.contains(&Block::Subheading("Imaging Studies".into())));
        assert!(blocks.contains(&Block::Labeled {
            label: "Other Imaging".into(),
            text: "CT unremarkable".into()
        }));
        assert!(!blocks.iter().any(|b| matches!(b, Block::Labeled { label, .. } if label == "Chest X-Ray")));
    }

    #[test]
    fn test_all_sentinel_imaging_has_no_subsection() {
        let record = record_with_objective(json!({
            "imaging": {"chest_xray": "Missing", "other_imaging": "Missing"},
            "physical_exam": "Missing",
            "laboratory_results": ""
        }));
        let doc = DocumentAssembler::new().render_at(&record, fixed_time());
        assert!(blocks_of(&doc, SectionKind::Objective).is_empty());
    }

    #[test]
    fn test_subjective_required_and_conditional_fields() {
        let record = FinalRecord {
            soap_note: SoapNote {
                subjective: ClinicalField::from_value(json!({
                    "chief_complaint": "Chest discomfort",
                    "medications": [],
                    "allergies": ["Penicillin", "Latex"],
                    "social_history": "Missing",
                    "family_history": "",
                    "review_of_systems": "Positive for fatigue"
                })),
                ..Default::default()
            },
            ..Default::default()
        };
        let doc = DocumentAssembler::new().render_at(&record, fixed_time());
        let blocks = blocks_of(&doc, SectionKind::Subjective);

        let after = |label: &str| {
            let pos = blocks
                .iter()
                .position(|b| *b == Block::Subheading(format!("{}:", label)))?;
            blocks.get(pos + 1).cloned()
        };
        assert_eq!(after("Chief Complaint"), Some(Block::Paragraph("Chest discomfort".into())));
        assert_eq!(after("History of Present Illness"), Some(Block::Paragraph("Missing".into())));
        assert_eq!(after("Current Medications"), Some(Block::Paragraph("None reported".into())));
        assert_eq!(after("Allergies"), Some(Block::Paragraph("Penicillin, Latex".into())));
        assert_eq!(after("Social History"), None);
        assert_eq!(after("Family History"), None);
        assert_eq!(after("Review of Systems"), Some(Block::Paragraph("Positive for fatigue".into())));
    }

    #[test]
    fn test_uncollected_lists_are_not_reported_as_none() {
        let record = FinalRecord {
            soap_note: SoapNote {
                subjective: ClinicalField::from_value(json!({
                    "medications": "Missing",
                    "allergies": ["Missing"]
                })),
                ..Default::default()
            },
            ..Default::default()
        };
        let doc = DocumentAssembler::new().render_at(&record, fixed_time());
        let blocks = blocks_of(&doc, SectionKind::Subjective);

        assert!(!blocks.contains(&Block::Paragraph("None reported".into())));
        assert!(!blocks.contains(&Block::Paragraph("No known drug allergies (NKDA)".into())));
        assert_eq!(
            blocks,
            vec![
                Block::Subheading("Chief Complaint:".into()),
                Block::Paragraph(MISSING.into()),
                Block::Subheading("History of Present Illness:".into()),
                Block::Paragraph(MISSING.into()),
                Block::Subheading("Past Medical History:".into()),
                Block::Paragraph(MISSING.into()),
                Block::Subheading("Current Medications:".into()),
                Block::Paragraph(MISSING.into()),
                Block::Subheading("Allergies:".into()),
                Block::Paragraph(MISSING.into()),
            ]
        );
    }

    #[test]
    fn test_text_subjective_still_lists_required_fields() {
        let record = FinalRecord {
            soap_note: SoapNote {
                subjective: ClinicalField::Text("45 year old male with chest discomfort".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let doc = DocumentAssembler::new().render_at(&record, fixed_time());
        let blocks = blocks_of(&doc, SectionKind::Subjective);

        assert_eq!(
            blocks[0],
            Block::Paragraph("45 year old male with chest discomfort".into())
        );
        assert!(blocks.contains(&Block::Subheading("Allergies:".into())));
        assert!(blocks.contains(&Block::Paragraph("No known drug allergies (NKDA)".into())));
    }

    #[test]
    fn test_absent_assessment_and_plan_render_missing() {
        let doc = DocumentAssembler::new().render_at(&FinalRecord::default(), fixed_time());
        assert_eq!(
            blocks_of(&doc, SectionKind::Assessment),
            vec![Block::Paragraph(MISSING.into())]
        );
        assert_eq!(
            blocks_of(&doc, SectionKind::Plan),
            vec![Block::Paragraph(MISSING.into())]
        );
    }

    #[test]
    fn test_structured_assessment_is_serialized() {
        let record = FinalRecord {
            soap_note: SoapNote {
                assessment: ClinicalField::from_value(json!({"differential": ["GERD", "Angina"]})),
                plan: Some(DoctorPlan {
                    medications: vec!["Omeprazole 20mg once daily".into()],
                    lab_tests: vec![],
                    follow_up: "2 weeks".into(),
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        let doc = DocumentAssembler::new().render_at(&record, fixed_time());

        assert_eq!(
            blocks_of(&doc, SectionKind::Assessment),
            vec![Block::Paragraph(r#"{"differential":["GERD","Angina"]}"#.into())]
        );
        assert_eq!(
            blocks_of(&doc, SectionKind::Plan)[0],
            Block::Paragraph(
                r#"{"follow_up":"2 weeks","lab_tests":[],"medications":["Omeprazole 20mg once daily"]}"#
                    .into()
            )
        );
    }

    #[test]
    fn test_lifestyle_categories_filtered() {
        let record = FinalRecord {
            lifestyle_recommendations: Some(LifestyleRecommendations {
                dietary: "Avoid spicy food".into(),
                stress: "Missing".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let doc = DocumentAssembler::new().render_at(&record, fixed_time());

        assert_eq!(
            blocks_of(&doc, SectionKind::LifestyleRecommendations),
            vec![Block::Labeled {
                label: "Dietary".into(),
                text: "Avoid spicy food".into()
            }]
        );
    }

    #[test]
    fn test_header_placeholders() {
        let doc = DocumentAssembler::new().render_at(&FinalRecord::default(), fixed_time());
        let header = doc.section(SectionKind::Header).unwrap();

        assert_eq!(
            header.blocks,
            vec![Block::Table(vec![
                TableRow::new("Date:", "March 08, 2024"),
                TableRow::new("Patient:", UNKNOWN_VALUE),
                TableRow::new("Patient ID:", UNKNOWN_VALUE),
                TableRow::new("Provider:", UNKNOWN_VALUE),
            ])]
        );
    }

    #[test]
    fn test_header_with_identity_and_provider() {
        let record = FinalRecord {
            patient_name: Some("John Doe".into()),
            patient_id: Some("P-12345".into()),
            ..Default::default()
        };
        let doc = DocumentAssembler::new()
            .with_provider(Some("Dr. Rivera".into()))
            .render_at(&record, fixed_time());

        let Block::Table(rows) = &doc.section(SectionKind::Header).unwrap().blocks[0] else {
            panic!("header should be a table");
        };
        assert_eq!(rows[1].value, "John Doe");
        assert_eq!(rows[2].value, "P-12345");
        assert_eq!(rows[3].value, "Dr. Rivera");
    }

    #[test]
    fn test_plan_review_blocks() {
        let record = FinalRecord {
            medication_review: MedicationReview {
                confidence_score: Some(95.0),
                rationale: "Aligned with GERD differential.".into(),
            },
            test_validation: vec![
                TestValidation {
                    test: "CBC".into(),
                    relevance_score: Some(87.5),
                    rationale: "Baseline.".into(),
                },
                TestValidation {
                    test: "H. pylori test".into(),
                    relevance_score: None,
                    rationale: String::new(),
                },
            ],
            ..Default::default()
        };
        let doc = DocumentAssembler::new().render_at(&record, fixed_time());
        let blocks = blocks_of(&doc, SectionKind::Plan);

        assert!(blocks.contains(&Block::Labeled {
            label: "Confidence Score".into(),
            text: "95/100".into()
        }));
        assert!(blocks.contains(&Block::Labeled {
            label: "CBC".into(),
            text: "Relevance 87.5/100. Baseline.".into()
        }));
        assert!(blocks.contains(&Block::Labeled {
            label: "H. pylori test".into(),
            text: "Relevance not scored.".into()
        }));
    }

    #[test]
    fn test_footer_timestamp() {
        let doc = DocumentAssembler::new().render_at(&FinalRecord::default(), fixed_time());
        let footer = doc.sections.last().unwrap();

        assert_eq!(footer.kind, SectionKind::Footer);
        assert!(footer
            .blocks
            .contains(&Block::Note("Document generated on: March 08, 2024 at 14:30".into())));
    }
}

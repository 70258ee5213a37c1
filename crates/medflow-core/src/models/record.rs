//! Clinical record schema: the partial (draft) record and the final record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::presence::Presence;

/// A Subjective, Objective or Assessment value: free text or a nested mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged, from = "Value")]
pub enum ClinicalField {
    Text(String),
    Structured(Map<String, Value>),
}

impl Default for ClinicalField {
    fn default() -> Self {
        ClinicalField::Text(String::new())
    }
}

impl ClinicalField {
    /// Convert loosely-typed model output into a field.
    ///
    /// `null` becomes empty text; scalars and arrays become their display text.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => ClinicalField::default(),
            Value::String(s) => ClinicalField::Text(s),
            Value::Object(map) => ClinicalField::Structured(map),
            other => ClinicalField::Text(display_value(&other)),
        }
    }

    /// Look up a named entry of a structured field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            ClinicalField::Structured(map) => map.get(key),
            ClinicalField::Text(_) => None,
        }
    }

    /// Free text, if this field is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ClinicalField::Text(s) => Some(s),
            ClinicalField::Structured(_) => None,
        }
    }

    /// Displayable text; mappings are serialized rather than rejected.
    pub fn to_display(&self) -> String {
        match self {
            ClinicalField::Text(s) => s.clone(),
            ClinicalField::Structured(map) => {
                serde_json::to_string(map).unwrap_or_default()
            }
        }
    }
}

impl From<Value> for ClinicalField {
    fn from(value: Value) -> Self {
        ClinicalField::from_value(value)
    }
}

impl Presence for ClinicalField {
    fn is_present(&self) -> bool {
        match self {
            ClinicalField::Text(s) => s.is_present(),
            ClinicalField::Structured(map) => map.values().any(Presence::is_present),
        }
    }
}

/// Render any JSON value as display text.
///
/// Strings are used verbatim, arrays are joined with ", ", mappings are
/// serialized as compact JSON (keys sorted, so the output is stable).
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Output of the draft stage: Subjective, Objective and Assessment only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PartialRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub subjective: ClinicalField,
    #[serde(default)]
    pub objective: ClinicalField,
    #[serde(default)]
    pub assessment: ClinicalField,
    /// Data points the model flagged as missing or ambiguous
    #[serde(default)]
    pub missing_information: Vec<String>,
    #[serde(default)]
    pub safety_notice: String,
}

impl PartialRecord {
    /// Attach patient identity carried over from intake.
    pub fn with_identity(mut self, name: Option<String>, id: Option<String>) -> Self {
        self.patient_name = name;
        self.patient_id = id;
        self
    }

    /// Serialize to the interchange format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from the interchange format.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Clinician-supplied plan. Never altered by the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DoctorPlan {
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub lab_tests: Vec<String>,
    #[serde(default)]
    pub follow_up: String,
}

impl DoctorPlan {
    /// Display text for the Plan section.
    pub fn to_display(&self) -> String {
        serde_json::to_value(self)
            .map(|v| display_value(&v))
            .unwrap_or_default()
    }
}

/// The four-part SOAP note inside a final record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SoapNote {
    #[serde(default)]
    pub subjective: ClinicalField,
    #[serde(default)]
    pub objective: ClinicalField,
    #[serde(default)]
    pub assessment: ClinicalField,
    /// `None` only for records loaded from elsewhere without a plan
    #[serde(default)]
    pub plan: Option<DoctorPlan>,
}

/// Medication/plan alignment check against the assessment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MedicationReview {
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub rationale: String,
}

/// Relevance of one requested lab test.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TestValidation {
    pub test: String,
    #[serde(default)]
    pub relevance_score: Option<f64>,
    #[serde(default)]
    pub rationale: String,
}

/// Lifestyle guidance by category.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LifestyleRecommendations {
    #[serde(default, alias = "food")]
    pub dietary: String,
    #[serde(default)]
    pub exercise: String,
    #[serde(default)]
    pub clothing: String,
    #[serde(default, alias = "music")]
    pub stress: String,
    #[serde(default, alias = "fragrance")]
    pub environment: String,
}

impl LifestyleRecommendations {
    /// Categories in display order with their labels.
    pub fn categories(&self) -> [(&'static str, &str); 5] {
        [
            ("Dietary", self.dietary.as_str()),
            ("Exercise", self.exercise.as_str()),
            ("Clothing", self.clothing.as_str()),
            ("Stress Management", self.stress.as_str()),
            ("Environmental", self.environment.as_str()),
        ]
    }
}

/// Output of the finalization stage; terminal input to the document assembler.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FinalRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub soap_note: SoapNote,
    #[serde(default)]
    pub medication_review: MedicationReview,
    #[serde(default)]
    pub test_validation: Vec<TestValidation>,
    /// Absent entirely when the model produced no lifestyle guidance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifestyle_recommendations: Option<LifestyleRecommendations>,
    #[serde(default)]
    pub additional_notes: String,
    #[serde(default)]
    pub missing_information: Vec<String>,
    #[serde(default)]
    pub safety_notice: String,
}

impl FinalRecord {
    /// Serialize to the interchange format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from the interchange format.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

//! Offline generation backend.
//!
//! [`SimulatedGenerator`] answers without a model by reading the JSON payload
//! that the stage prompts embed after their markers. Draft requests get a
//! structured S/O/A note built from the intake; finalization requests get a
//! fixed-score review of the clinician's plan. Anything else gets prose, which
//! the normalizer turns into its fallback record.

use medflow_core::models::{display_value, PatientInput, MISSING};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::generator::{GenerationRequest, GenerationResult, Generator, Turn};
use crate::prompts::{DOCTOR_PLAN_MARKER, DRAFT_RECORD_MARKER, ETHNICITY_MARKER, PATIENT_DATA_MARKER};

const DRAFT_SAFETY_NOTICE: &str = "Seek immediate emergency care if symptoms worsen or include \
crushing chest pain, radiating pain, or severe diaphoresis.";

const DEFAULT_SAFETY_NOTICE: &str = "Consult your physician immediately.";

const UNRECOGNIZED_REPLY: &str =
    "I can only structure patient data supplied after a recognized marker.";

/// Deterministic stand-in for the generative model.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedGenerator;

impl SimulatedGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Raw response text for a request, before it is appended to the transcript.
    pub fn respond(&self, request: &GenerationRequest) -> String {
        let text = request.user_text().unwrap_or_default();

        if text.contains(DOCTOR_PLAN_MARKER) {
            let draft = payload_after(text, DRAFT_RECORD_MARKER).unwrap_or(Value::Null);
            let plan = payload_after(text, DOCTOR_PLAN_MARKER).unwrap_or(Value::Null);
            let ethnicity = ethnicity(text);
            debug!("simulating finalization response");
            return fenced(&finalization_response(&draft, &plan, &ethnicity));
        }

        if let Some(patient) = payload_after(text, PATIENT_DATA_MARKER) {
            match serde_json::from_value::<PatientInput>(patient) {
                Ok(input) => {
                    debug!(images = request.image_count(), "simulating draft response");
                    return fenced(&draft_response(&input, request.image_count() > 0));
                }
                Err(e) => debug!(error = %e, "simulated draft payload unreadable"),
            }
        }

        UNRECOGNIZED_REPLY.to_string()
    }
}

impl Generator for SimulatedGenerator {
    fn generate(&self, request: &GenerationRequest) -> GenerationResult<Vec<Turn>> {
        let mut transcript = request.turns.clone();
        transcript.push(Turn::assistant(self.respond(request)));
        Ok(transcript)
    }
}

/// First JSON value following `marker`.
fn payload_after(text: &str, marker: &str) -> Option<Value> {
    let start = text.find(marker)? + marker.len();
    serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Value>()
        .next()?
        .ok()
}

fn ethnicity(text: &str) -> String {
    text.find(ETHNICITY_MARKER)
        .map(|i| text[i + ETHNICITY_MARKER.len()..].lines().next().unwrap_or_default())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn fenced(value: &Value) -> String {
    let body = serde_json::to_string_pretty(value).unwrap_or_default();
    format!("```json\n{}\n```", body)
}

fn or_missing(value: &str) -> Value {
    if value.trim().is_empty() {
        Value::String(MISSING.to_string())
    } else {
        Value::String(value.trim().to_string())
    }
}

fn draft_response(input: &PatientInput, has_images: bool) -> Value {
    let symptoms = input.symptoms.join(", ");
    let history = if input.medical_history.is_empty() {
        "no reported history".to_string()
    } else {
        input.medical_history.join(", ")
    };
    let descriptor: Vec<String> = input
        .age
        .map(|a| format!("{} year old", a))
        .into_iter()
        .chain(Some(input.gender.trim().to_lowercase()))
        .filter(|s| !s.is_empty())
        .collect();
    let subject = if descriptor.is_empty() {
        "Patient".to_string()
    } else {
        format!("Patient is a {}", descriptor.join(" "))
    };

    let mut missing = Vec::new();
    if input.medical_history.is_empty() {
        missing.push("Past medical history");
    }
    if input.vitals.blood_pressure.trim().is_empty() || input.vitals.heart_rate.trim().is_empty() {
        missing.push("Complete vital signs");
    }
    missing.push("Complete laboratory workup");
    missing.push("Detail family history");

    json!({
        "S": {
            "chief_complaint": input.symptoms.first().map(String::as_str).unwrap_or(MISSING),
            "history_of_present_illness": format!(
                "{} presenting with {} for {}. Severity is {}.",
                subject,
                if symptoms.is_empty() { "unspecified symptoms" } else { symptoms.as_str() },
                if input.duration.trim().is_empty() { "an unstated duration" } else { input.duration.trim() },
                if input.severity.trim().is_empty() { "not stated" } else { input.severity.trim() },
            ),
            "past_medical_history": input.medical_history,
            "medications": input.medications,
            "allergies": MISSING,
            "social_history": MISSING,
            "family_history": MISSING,
            "review_of_systems": if symptoms.is_empty() {
                MISSING.to_string()
            } else {
                format!("Positive for: {}.", symptoms)
            },
        },
        "O": {
            "vital_signs": {
                "blood_pressure": or_missing(&input.vitals.blood_pressure),
                "heart_rate": or_missing(&input.vitals.heart_rate),
                "respiratory_rate": MISSING,
                "temperature": MISSING,
                "oxygen_saturation": MISSING,
            },
            "physical_exam": MISSING,
            "imaging": {
                "chest_xray": if has_images { "Imaging provided for review" } else { MISSING },
            },
            "laboratory_results": "Pending",
        },
        "A": format!(
            "The presence of {} in the context of {} requires further evaluation.",
            if symptoms.is_empty() { "the reported complaints" } else { symptoms.as_str() },
            history
        ),
        "missing_information": missing,
        "safety_notice": DRAFT_SAFETY_NOTICE,
    })
}

fn finalization_response(draft: &Value, plan: &Value, ethnicity: &str) -> Value {
    let lab_tests: Vec<String> = plan
        .get("lab_tests")
        .and_then(Value::as_array)
        .map(|tests| tests.iter().map(display_value).filter(|t| !t.is_empty()).collect())
        .unwrap_or_default();

    let validations: Vec<Value> = lab_tests
        .iter()
        .map(|test| {
            json!({
                "test": test,
                "relevance_score": 90,
                "rationale": "Essential for rule-out process.",
            })
        })
        .collect();

    let mut soap = Map::new();
    for key in ["subjective", "objective", "assessment"] {
        if let Some(value) = draft.get(key) {
            soap.insert(key.to_string(), value.clone());
        }
    }

    let notice = draft
        .get("safety_notice")
        .map(display_value)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SAFETY_NOTICE.to_string());

    let ethnicity = if ethnicity.is_empty() { "not stated" } else { ethnicity };

    json!({
        "soap_note": soap,
        "medication_review": {
            "confidence_score": 95,
            "rationale": "Medications align with the documented assessment.",
        },
        "test_validation": validations,
        "lifestyle_recommendations": {
            "food": "Avoid spicy food and caffeine. Focus on small, frequent meals.",
            "exercise": "Gentle walking allowed. Avoid strenuous activity until cleared.",
            "clothing": "Loose-fitting clothing to avoid abdominal pressure.",
            "music": "Relaxing music to manage stress.",
            "fragrance": "Lavender for a calming environment.",
        },
        "additional_notes": format!(
            "Patient ethnicity: {}. Tailor dietary advice accordingly.",
            ethnicity
        ),
        "safety_notice": notice,
    })
}

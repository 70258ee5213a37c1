//! Patient intake models.

use serde::{Deserialize, Serialize};

/// Vitals captured at intake, kept as display strings ("145/90", "92 bpm").
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IntakeVitals {
    #[serde(default, alias = "bp")]
    pub blood_pressure: String,
    #[serde(default, alias = "hr")]
    pub heart_rate: String,
}

/// Free-form patient intake, submitted once to the draft stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientInput {
    /// Display name, used for the document header and filename
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    /// Clinic-assigned identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default, alias = "history")]
    pub medical_history: Vec<String>,
    /// Current medications
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub vitals: IntakeVitals,
}

/// Raw intake form values; list fields are comma separated.
#[derive(Debug, Clone, Default)]
pub struct IntakeForm<'a> {
    pub patient_name: &'a str,
    pub patient_id: &'a str,
    pub age: Option<u32>,
    pub gender: &'a str,
    pub symptoms: &'a str,
    pub duration: &'a str,
    pub severity: &'a str,
    pub medical_history: &'a str,
    pub medications: &'a str,
    pub blood_pressure: &'a str,
    pub heart_rate: &'a str,
}

impl PatientInput {
    /// Build an input from form values, splitting list fields on commas.
    pub fn from_form(form: &IntakeForm<'_>) -> Self {
        Self {
            patient_name: non_empty(form.patient_name),
            patient_id: non_empty(form.patient_id),
            age: form.age,
            gender: form.gender.trim().to_string(),
            symptoms: split_list(form.symptoms),
            duration: form.duration.trim().to_string(),
            severity: form.severity.trim().to_string(),
            medical_history: split_list(form.medical_history),
            medications: split_list(form.medications),
            vitals: IntakeVitals {
                blood_pressure: form.blood_pressure.trim().to_string(),
                heart_rate: form.heart_rate.trim().to_string(),
            },
        }
    }
}

/// Split a comma separated form value, dropping blank entries.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

//! Response normalizer: raw model text to canonical records.
//!
//! Parsing is strict. Fences are stripped, then the remainder must be a
//! single JSON object. [`parse_response`] reports why it failed;
//! [`normalize`] and [`normalize_final`] always turn that failure into the
//! fixed fallback record, so nothing past this module ever sees a parse
//! error.

use medflow_core::models::{
    display_value, present, ClinicalField, DoctorPlan, FinalRecord, LifestyleRecommendations,
    MedicationReview, PartialRecord, SoapNote, TestValidation,
};
use serde_json::{Map, Value};
use strsim::jaro_winkler;
use thiserror::Error;
use tracing::{debug, warn};

/// Diagnostic entry placed in `missing_information` by the fallback record.
pub const FALLBACK_MISSING_INFORMATION: &str = "Patient vitals or history may be incomplete.";

/// Caution placed in `safety_notice` by the fallback record.
pub const FALLBACK_SAFETY_NOTICE: &str =
    "Unable to generate full SOAP note. Please verify patient data.";

/// Rationale for a requested test the model did not score.
pub const UNASSESSED_RATIONALE: &str = "Not assessed by the model.";

/// Minimum Jaro-Winkler similarity for matching a model test name to a requested one.
pub const TEST_MATCH_THRESHOLD: f64 = 0.85;

/// Accepted keys per canonical field, in preference order.
pub const SUBJECTIVE_KEYS: &[&str] = &["subjective", "S"];
pub const OBJECTIVE_KEYS: &[&str] = &["objective", "O"];
pub const ASSESSMENT_KEYS: &[&str] = &["assessment", "A"];

const CONFIDENCE_KEYS: &[&str] = &["confidence_score", "score"];
const TEST_NAME_KEYS: &[&str] = &["test", "test_name", "name"];
const RELEVANCE_KEYS: &[&str] = &["relevance_score", "score"];
const DIETARY_KEYS: &[&str] = &["dietary", "food", "diet"];
const EXERCISE_KEYS: &[&str] = &["exercise"];
const CLOTHING_KEYS: &[&str] = &["clothing"];
const STRESS_KEYS: &[&str] = &["stress", "music", "stress_management"];
const ENVIRONMENT_KEYS: &[&str] = &["environment", "fragrance", "environmental"];

/// Why raw text could not be read as a record.
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("response is empty")]
    NoContent,

    #[error("response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("response is not a JSON object")]
    NotAnObject,
}

/// Remove markdown code-fence markers anywhere in the text.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Strictly parse raw model text into a JSON object.
pub fn parse_response(raw: &str) -> Result<Map<String, Value>, NormalizeError> {
    let stripped = strip_code_fences(raw);
    if stripped.is_empty() {
        return Err(NormalizeError::NoContent);
    }
    match serde_json::from_str::<Value>(&stripped)? {
        Value::Object(map) => Ok(map),
        _ => Err(NormalizeError::NotAnObject),
    }
}

/// First alias whose value is present and not `null`.
pub fn resolve_alias<'a>(map: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|key| map.get(*key))
        .find(|value| !value.is_null())
}

/// The fixed record returned for unparsable draft output.
pub fn fallback_partial() -> PartialRecord {
    PartialRecord {
        subjective: ClinicalField::default(),
        objective: ClinicalField::default(),
        assessment: ClinicalField::default(),
        missing_information: vec![FALLBACK_MISSING_INFORMATION.to_string()],
        safety_notice: FALLBACK_SAFETY_NOTICE.to_string(),
        ..Default::default()
    }
}

/// Normalize draft-stage output. Never fails.
pub fn normalize(raw: &str) -> PartialRecord {
    match parse_response(raw) {
        Ok(map) => partial_from_map(&map),
        Err(e) => {
            warn!(error = %e, "draft response unparsable, using fallback record");
            fallback_partial()
        }
    }
}

/// Canonicalize a parsed draft response.
pub fn partial_from_map(map: &Map<String, Value>) -> PartialRecord {
    PartialRecord {
        subjective: clinical_field(resolve_alias(map, SUBJECTIVE_KEYS)),
        objective: clinical_field(resolve_alias(map, OBJECTIVE_KEYS)),
        assessment: clinical_field(resolve_alias(map, ASSESSMENT_KEYS)),
        missing_information: string_list(map.get("missing_information")),
        safety_notice: text(map.get("safety_notice")),
        ..Default::default()
    }
}

/// Final record used when finalization output is unparsable.
///
/// Clinical fields and identity come from the draft, the plan is the
/// clinician's, analysis fields are empty and lifestyle guidance is absent.
pub fn fallback_final(partial: &PartialRecord, plan: &DoctorPlan) -> FinalRecord {
    let mut missing = partial.missing_information.clone();
    missing.push(FALLBACK_MISSING_INFORMATION.to_string());

    FinalRecord {
        patient_name: partial.patient_name.clone(),
        patient_id: partial.patient_id.clone(),
        soap_note: soap_from_partial(partial, plan),
        medication_review: MedicationReview::default(),
        test_validation: Vec::new(),
        lifestyle_recommendations: None,
        additional_notes: String::new(),
        missing_information: dedup(missing),
        safety_notice: FALLBACK_SAFETY_NOTICE.to_string(),
    }
}

/// Normalize finalization output against the draft and plan it was built from. Never fails.
pub fn normalize_final(raw: &str, partial: &PartialRecord, plan: &DoctorPlan) -> FinalRecord {
    match parse_response(raw) {
        Ok(map) => final_from_map(&map, partial, plan),
        Err(e) => {
            warn!(error = %e, "finalization response unparsable, using fallback record");
            fallback_final(partial, plan)
        }
    }
}

/// Canonicalize a parsed finalization response.
///
/// The plan is always the clinician's. Clinical fields the model leaves out
/// or blanks keep the draft's values.
pub fn final_from_map(
    map: &Map<String, Value>,
    partial: &PartialRecord,
    plan: &DoctorPlan,
) -> FinalRecord {
    let soap = map.get("soap_note").and_then(Value::as_object);
    let field = |aliases: &[&str], inherited: &ClinicalField| {
        let from_model = soap
            .and_then(|s| resolve_alias(s, aliases))
            .or_else(|| resolve_alias(map, aliases))
            .map(|v| ClinicalField::from_value(v.clone()));
        match from_model {
            Some(value) if present(&value) => value,
            _ => inherited.clone(),
        }
    };

    let mut missing = partial.missing_information.clone();
    missing.extend(string_list(map.get("missing_information")));

    let model_notice = text(map.get("safety_notice"));
    let safety_notice = if present(&model_notice) {
        model_notice
    } else {
        partial.safety_notice.clone()
    };

    let entries = map
        .get("test_validation")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(test_validation_entry)
                .collect()
        })
        .unwrap_or_default();

    FinalRecord {
        patient_name: partial.patient_name.clone(),
        patient_id: partial.patient_id.clone(),
        soap_note: SoapNote {
            subjective: field(SUBJECTIVE_KEYS, &partial.subjective),
            objective: field(OBJECTIVE_KEYS, &partial.objective),
            assessment: field(ASSESSMENT_KEYS, &partial.assessment),
            plan: Some(plan.clone()),
        },
        medication_review: map
            .get("medication_review")
            .and_then(Value::as_object)
            .map(medication_review)
            .unwrap_or_default(),
        test_validation: align_test_validation(&plan.lab_tests, entries),
        lifestyle_recommendations: map
            .get("lifestyle_recommendations")
            .and_then(Value::as_object)
            .map(lifestyle),
        additional_notes: text(map.get("additional_notes")),
        missing_information: dedup(missing),
        safety_notice,
    }
}

/// One entry per requested test, in request order.
///
/// Names are compared after [`test_key`] normalization: equal keys match
/// first, then Jaro-Winkler similarity at or above [`TEST_MATCH_THRESHOLD`],
/// but only between names whose [`marker_tokens`] agree, so "Vitamin D"
/// never takes the entry for "Vitamin B12". Each model entry is used at most
/// once; unmatched requests are reported as not assessed.
pub fn align_test_validation(
    requested: &[String],
    model: Vec<TestValidation>,
) -> Vec<TestValidation> {
    let keys: Vec<String> = model.iter().map(|m| test_key(&m.test)).collect();
    let mut used = vec![false; model.len()];
    let mut assigned: Vec<Option<usize>> = vec![None; requested.len()];

    for (slot, test) in requested.iter().enumerate() {
        let wanted = test_key(test);
        if let Some(index) = (0..model.len()).find(|&i| !used[i] && keys[i] == wanted) {
            used[index] = true;
            assigned[slot] = Some(index);
        }
    }

    for (slot, test) in requested.iter().enumerate() {
        if assigned[slot].is_some() {
            continue;
        }
        let wanted = test_key(test);
        let markers = marker_tokens(&wanted);
        let best = (0..model.len())
            .filter(|&i| !used[i] && marker_tokens(&keys[i]) == markers)
            .map(|i| (i, jaro_winkler(&keys[i], &wanted)))
            .filter(|(_, similarity)| *similarity >= TEST_MATCH_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((index, similarity)) = best {
            debug!(requested = %test, matched = %model[index].test, similarity, "fuzzy test match");
            used[index] = true;
            assigned[slot] = Some(index);
        }
    }

    requested
        .iter()
        .zip(assigned)
        .map(|(test, index)| match index {
            Some(i) => TestValidation {
                test: test.clone(),
                relevance_score: model[i].relevance_score,
                rationale: model[i].rationale.clone(),
            },
            None => TestValidation {
                test: test.clone(),
                relevance_score: None,
                rationale: UNASSESSED_RATIONALE.to_string(),
            },
        })
        .collect()
}

/// Lowercased test name with punctuation folded into single spaces.
pub fn test_key(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tokens that tell otherwise similar tests apart: anything carrying a digit
/// (`b12`, `t4`, `hba1c`) and single letters (`d`, `b`).
pub fn marker_tokens(key: &str) -> Vec<&str> {
    key.split(' ')
        .filter(|word| word.chars().count() == 1 || word.chars().any(|c| c.is_ascii_digit()))
        .collect()
}

fn soap_from_partial(partial: &PartialRecord, plan: &DoctorPlan) -> SoapNote {
    SoapNote {
        subjective: partial.subjective.clone(),
        objective: partial.objective.clone(),
        assessment: partial.assessment.clone(),
        plan: Some(plan.clone()),
    }
}

fn medication_review(map: &Map<String, Value>) -> MedicationReview {
    MedicationReview {
        confidence_score: resolve_alias(map, CONFIDENCE_KEYS).and_then(score),
        rationale: text(map.get("rationale")),
    }
}

fn test_validation_entry(map: &Map<String, Value>) -> TestValidation {
    TestValidation {
        test: text(resolve_alias(map, TEST_NAME_KEYS)),
        relevance_score: resolve_alias(map, RELEVANCE_KEYS).and_then(score),
        rationale: text(map.get("rationale")),
    }
}

fn lifestyle(map: &Map<String, Value>) -> LifestyleRecommendations {
    let category = |keys: &[&str]| text(resolve_alias(map, keys));
    LifestyleRecommendations {
        dietary: category(DIETARY_KEYS),
        exercise: category(EXERCISE_KEYS),
        clothing: category(CLOTHING_KEYS),
        stress: category(STRESS_KEYS),
        environment: category(ENVIRONMENT_KEYS),
    }
}

fn clinical_field(value: Option<&Value>) -> ClinicalField {
    value
        .cloned()
        .map(ClinicalField::from_value)
        .unwrap_or_default()
}

/// Numeric score from a number or a numeric string ("90", "87.5%").
fn score(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

fn text(value: Option<&Value>) -> String {
    value.map(display_value).unwrap_or_default()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(display_value)
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            let single = display_value(other);
            if single.trim().is_empty() {
                Vec::new()
            } else {
                vec![single]
            }
        }
    }
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}

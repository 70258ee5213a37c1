//! Prompts for the draft and finalization stages.
//!
//! User turns embed their structured payloads after fixed markers
//! ([`PATIENT_DATA_MARKER`], [`DRAFT_RECORD_MARKER`], [`DOCTOR_PLAN_MARKER`]),
//! each followed by a JSON document on the next line.

/// Precedes the patient intake JSON in the draft request.
pub const PATIENT_DATA_MARKER: &str = "Patient data:";

/// Precedes the partial record JSON in the finalization request.
pub const DRAFT_RECORD_MARKER: &str = "Draft record:";

/// Precedes the clinician's plan JSON in the finalization request.
pub const DOCTOR_PLAN_MARKER: &str = "Doctor plan:";

/// Precedes the free-text ethnicity in the finalization request.
pub const ETHNICITY_MARKER: &str = "Patient ethnicity:";

/// System prompt for the draft stage: structuring only.
pub const DRAFT_SYSTEM_PROMPT: &str = r#"You are the intake agent of a clinical documentation system.

Your role is to collect, validate, clean and structure raw patient input before it is passed to the clinician.

Responsibilities:
- Detect missing, unclear or conflicting information
- Normalize language, spelling and formatting
- Extract the clinically relevant facts
- Convert unstructured input into clean, structured JSON

Rules:
- Stay strictly within data processing and structuring
- Do NOT make diagnoses or recommendations
- Do not infer beyond the provided input
- If information is missing, flag it explicitly
- Preserve the original meaning of the input

Output:
- Return only a single valid JSON object
- Use exactly the keys "subjective", "objective", "assessment", "missing_information" and "safety_notice"
- Never include plan, diagnosis or medication recommendation fields"#;

/// System prompt for the finalization stage.
pub const FINALIZE_SYSTEM_PROMPT: &str = r#"You are the review agent of a clinical documentation system.

You receive a structured draft note, the clinician's plan and the patient's ethnicity.

Responsibilities:
- Check whether the prescribed medications and plan align with the assessment
- Score the relevance of every requested laboratory test independently (0-100)
- Suggest lifestyle guidance (dietary, exercise, clothing, stress, environment) appropriate to the patient's background
- Preserve the safety notice, updating it only if the plan introduces new risks

Rules:
- Never change the clinician's plan
- Do not add laboratory tests that were not requested
- Return only a single valid JSON object with the keys "soap_note", "medication_review", "test_validation", "lifestyle_recommendations", "additional_notes", "missing_information" and "safety_notice""#;

/// User prompt for the draft stage.
pub fn make_draft_prompt(patient_json: &str) -> String {
    format!(
        "Generate a structured SOAP note in JSON format containing ONLY \
Subjective (S), Objective (O), and Assessment (A). \
Do NOT include Plan, Diagnosis, or Medications. \
Use neutral clinical language. \
If any information is missing, list it under 'missing_information'. \
Add a 'safety_notice' field with precautions.\n\n{}\n{}",
        PATIENT_DATA_MARKER, patient_json
    )
}

/// User prompt for the finalization stage.
pub fn make_finalize_prompt(partial_json: &str, plan_json: &str, ethnicity: &str) -> String {
    format!(
        "Review the draft SOAP note against the clinician's plan.\n\
Return \"medication_review\" as {{\"confidence_score\": 0-100, \"rationale\": string}}, \
\"test_validation\" as one {{\"test\", \"relevance_score\", \"rationale\"}} entry per requested lab test, \
\"lifestyle_recommendations\" with the keys dietary, exercise, clothing, stress and environment, \
and \"additional_notes\".\n\n\
{}\n{}\n\n{}\n{}\n\n{} {}",
        DRAFT_RECORD_MARKER,
        partial_json,
        DOCTOR_PLAN_MARKER,
        plan_json,
        ETHNICITY_MARKER,
        ethnicity.trim()
    )
}

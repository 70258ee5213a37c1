//! Draft and finalization stages.
//!
//! Each stage builds one request, makes exactly one blocking call to the
//! generator it borrows, and normalizes the newest turn of the transcript.
//! Generator failures propagate tagged with the stage; unparsable text never
//! does, since the normalizer absorbs it.

use std::fmt;

use medflow_core::models::{DoctorPlan, FinalRecord, PartialRecord, PatientInput};
use thiserror::Error;
use tracing::{debug, info};

use crate::generator::{GenerationError, GenerationRequest, Generator, ImageAttachment, Turn};
use crate::normalize::{normalize, normalize_final};
use crate::prompts::{
    make_draft_prompt, make_finalize_prompt, DRAFT_SYSTEM_PROMPT, FINALIZE_SYSTEM_PROMPT,
};

/// Default generation budget per stage.
pub const DEFAULT_MAX_NEW_TOKENS: u32 = 800;

/// Pipeline stage, for error reporting and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Draft,
    Finalization,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Draft => write!(f, "draft"),
            Stage::Finalization => write!(f, "finalization"),
        }
    }
}

/// Stage errors.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("{stage} stage: external model failed: {source}")]
    ExternalModel {
        stage: Stage,
        #[source]
        source: GenerationError,
    },

    #[error("{stage} stage: could not serialize request payload: {source}")]
    Serialize {
        stage: Stage,
        #[source]
        source: serde_json::Error,
    },
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            StageError::ExternalModel { stage, .. } | StageError::Serialize { stage, .. } => *stage,
        }
    }
}

pub type StageResult<T> = Result<T, StageError>;

/// Run one request and return the content of the newest turn.
fn generate_last<G: Generator + ?Sized>(
    generator: &G,
    stage: Stage,
    request: &GenerationRequest,
) -> StageResult<String> {
    let transcript = generator
        .generate(request)
        .map_err(|source| StageError::ExternalModel { stage, source })?;

    transcript
        .into_iter()
        .last()
        .map(|turn| turn.content)
        .ok_or(StageError::ExternalModel {
            stage,
            source: GenerationError::EmptyTranscript,
        })
}

/// Structures patient intake into a partial record (S/O/A only).
pub struct DraftStage<'a, G: Generator + ?Sized> {
    generator: &'a G,
    max_new_tokens: u32,
}

impl<'a, G: Generator + ?Sized> DraftStage<'a, G> {
    pub fn new(generator: &'a G) -> Self {
        Self {
            generator,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
        }
    }

    pub fn with_max_new_tokens(mut self, max_new_tokens: u32) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    /// The request sent for this intake; images ride on the user turn.
    pub fn request(
        &self,
        patient: &PatientInput,
        images: Vec<ImageAttachment>,
    ) -> StageResult<GenerationRequest> {
        let patient_json = serde_json::to_string_pretty(patient).map_err(|source| {
            StageError::Serialize {
                stage: Stage::Draft,
                source,
            }
        })?;

        Ok(GenerationRequest {
            turns: vec![
                Turn::system(DRAFT_SYSTEM_PROMPT),
                Turn::user(make_draft_prompt(&patient_json)).with_images(images),
            ],
            max_new_tokens: self.max_new_tokens,
        })
    }

    pub fn draft(
        &self,
        patient: &PatientInput,
        images: Vec<ImageAttachment>,
    ) -> StageResult<PartialRecord> {
        let request = self.request(patient, images)?;
        info!(
            patient_id = patient.patient_id.as_deref().unwrap_or(""),
            images = request.image_count(),
            "draft stage started"
        );

        let raw = generate_last(self.generator, Stage::Draft, &request)?;
        debug!(chars = raw.len(), "draft response received");

        let record = normalize(&raw)
            .with_identity(patient.patient_name.clone(), patient.patient_id.clone());
        info!(
            missing = record.missing_information.len(),
            "draft stage finished"
        );
        Ok(record)
    }
}

/// Merges a partial record with the clinician's plan into a final record.
pub struct FinalizationStage<'a, G: Generator + ?Sized> {
    generator: &'a G,
    max_new_tokens: u32,
}

impl<'a, G: Generator + ?Sized> FinalizationStage<'a, G> {
    pub fn new(generator: &'a G) -> Self {
        Self {
            generator,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
        }
    }

    pub fn with_max_new_tokens(mut self, max_new_tokens: u32) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    pub fn request(
        &self,
        partial: &PartialRecord,
        plan: &DoctorPlan,
        ethnicity: &str,
    ) -> StageResult<GenerationRequest> {
        let to_json = |value: serde_json::Result<String>| {
            value.map_err(|source| StageError::Serialize {
                stage: Stage::Finalization,
                source,
            })
        };
        let partial_json = to_json(serde_json::to_string_pretty(partial))?;
        let plan_json = to_json(serde_json::to_string_pretty(plan))?;

        Ok(GenerationRequest {
            turns: vec![
                Turn::system(FINALIZE_SYSTEM_PROMPT),
                Turn::user(make_finalize_prompt(&partial_json, &plan_json, ethnicity)),
            ],
            max_new_tokens: self.max_new_tokens,
        })
    }

    pub fn finalize(
        &self,
        partial: &PartialRecord,
        plan: &DoctorPlan,
        ethnicity: &str,
    ) -> StageResult<FinalRecord> {
        let request = self.request(partial, plan, ethnicity)?;
        info!(
            patient_id = partial.patient_id.as_deref().unwrap_or(""),
            lab_tests = plan.lab_tests.len(),
            "finalization stage started"
        );

        let raw = generate_last(self.generator, Stage::Finalization, &request)?;
        debug!(chars = raw.len(), "finalization response received");

        let record = normalize_final(&raw, partial, plan);
        info!(
            validated = record.test_validation.len(),
            lifestyle = record.lifestyle_recommendations.is_some(),
            "finalization stage finished"
        );
        Ok(record)
    }
}

//! Two-stage SOAP note generation.
//!
//! The draft stage turns patient intake into a partial record (Subjective,
//! Objective, Assessment). After the clinician writes a plan, the
//! finalization stage merges it in and adds the model's review. Both stages
//! talk to a [`Generator`], either the Ollama HTTP backend or the offline
//! [`SimulatedGenerator`], and pass its raw text through the normalizer.

pub mod generator;
pub mod normalize;
pub mod ollama;
pub mod prompts;
pub mod simulation;
pub mod stages;

pub use generator::{
    GenerationError, GenerationRequest, GenerationResult, Generator, ImageAttachment,
    MockGenerator, Role, Turn,
};
pub use normalize::{fallback_final, fallback_partial, normalize, normalize_final};
pub use ollama::OllamaGenerator;
pub use simulation::SimulatedGenerator;
pub use stages::{DraftStage, FinalizationStage, Stage, StageError, StageResult};

//! MedFlow Core Library
//!
//! Structured SOAP records, the conditional document assembler, document
//! sinks and the local draft store.
//!
//! # Architecture
//!
//! ```text
//! PatientInput ──► Draft Stage (medflow-llm) ──► PartialRecord (S/O/A)
//!                                                     │
//!                                      [STAGING: soap_drafts]
//!                                                     │
//!                                         Clinician enters plan
//!                                                     │
//!                       Finalization Stage (medflow-llm) ──► FinalRecord
//!                                                     │
//!                                   ┌─────────────────▼─────────────────┐
//!                                   │        Document Assembler         │
//!                                   │  present() gates every optional   │
//!                                   │  section, row and subsection      │
//!                                   └─────────────────┬─────────────────┘
//!                                                     │
//!                                     ┌───────────────┴───────────────┐
//!                                     ▼                               ▼
//!                                 PDF (A4)                        Markdown
//! ```
//!
//! # Modules
//!
//! - [`models`]: Record schema (PatientInput, PartialRecord, FinalRecord) and the presence policy
//! - [`document`]: Document model and assembler
//! - [`export`]: PDF and Markdown sinks
//! - [`db`]: SQLite draft store
//! - [`config`]: Runtime configuration

pub mod config;
pub mod db;
pub mod document;
pub mod export;
pub mod models;

// Re-export commonly used types
pub use config::{ConfigError, GeneratorSettings, MedflowConfig};
pub use db::Database;
pub use document::{Document, DocumentAssembler};
pub use export::{document_filename, ExportError, PdfExporter};
pub use models::{
    present, ClinicalField, DoctorPlan, DraftStatus, FinalRecord, PartialRecord, PatientInput,
    StoredDraft, StoredFinalRecord, MISSING,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum MedflowError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Export error: {0}")]
    ExportError(String),
}

impl From<db::DbError> for MedflowError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => MedflowError::NotFound(what),
            other => MedflowError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for MedflowError {
    fn from(e: serde_json::Error) -> Self {
        MedflowError::SerializationError(e.to_string())
    }
}

impl From<export::ExportError> for MedflowError {
    fn from(e: export::ExportError) -> Self {
        MedflowError::ExportError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for MedflowError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        MedflowError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a draft store at `db_path`, writing documents to `output_dir`.
#[uniffi::export]
pub fn open_store(
    db_path: String,
    output_dir: String,
    provider_name: Option<String>,
) -> Result<Arc<MedflowCore>, MedflowError> {
    let db = Database::open(&db_path)?;
    Ok(Arc::new(MedflowCore::new(db, output_dir, provider_name)))
}

/// Create an in-memory draft store (for testing).
#[uniffi::export]
pub fn open_store_in_memory(
    output_dir: String,
    provider_name: Option<String>,
) -> Result<Arc<MedflowCore>, MedflowError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(MedflowCore::new(db, output_dir, provider_name)))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe store and document sink for host UIs.
#[derive(uniffi::Object)]
pub struct MedflowCore {
    db: Arc<Mutex<Database>>,
    output_dir: PathBuf,
    exporter: PdfExporter,
}

impl MedflowCore {
    fn new(db: Database, output_dir: String, provider_name: Option<String>) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            output_dir: PathBuf::from(output_dir),
            exporter: PdfExporter::new(DocumentAssembler::new().with_provider(provider_name)),
        }
    }

    fn write_document(&self, record: &FinalRecord) -> Result<String, MedflowError> {
        let path = self.exporter.render(
            record,
            &self.output_dir,
            record.patient_name.as_deref().unwrap_or_default(),
            record.patient_id.as_deref().unwrap_or_default(),
        )?;
        Ok(path.to_string_lossy().into_owned())
    }
}

#[uniffi::export]
impl MedflowCore {
    // =========================================================================
    // Draft Operations
    // =========================================================================

    /// Store a partial record (interchange JSON) and return its draft ID.
    pub fn save_draft(&self, partial_json: String) -> Result<String, MedflowError> {
        let record = PartialRecord::from_json(&partial_json)?;
        let draft = StoredDraft::new(record);
        let db = self.db.lock()?;
        db.insert_draft(&draft)?;
        Ok(draft.draft_id)
    }

    /// Get a draft by ID.
    pub fn get_draft(&self, draft_id: String) -> Result<Option<FfiDraft>, MedflowError> {
        let db = self.db.lock()?;
        let draft = db.get_draft(&draft_id)?;
        draft.map(FfiDraft::try_from).transpose()
    }

    /// List all drafts for a patient, newest first.
    pub fn list_drafts(&self, patient_id: String) -> Result<Vec<FfiDraft>, MedflowError> {
        let db = self.db.lock()?;
        let drafts = db.list_drafts_for_patient(&patient_id)?;
        drafts.into_iter().map(FfiDraft::try_from).collect()
    }

    /// Drafts still waiting for a clinician's plan, oldest first.
    pub fn list_open_drafts(&self) -> Result<Vec<FfiDraft>, MedflowError> {
        let db = self.db.lock()?;
        let drafts = db.list_open_drafts()?;
        drafts.into_iter().map(FfiDraft::try_from).collect()
    }

    // =========================================================================
    // Final Record Operations
    // =========================================================================

    /// Store a final record produced from a draft; returns the record ID.
    pub fn finalize_draft(
        &self,
        draft_id: String,
        final_json: String,
    ) -> Result<String, MedflowError> {
        let record = FinalRecord::from_json(&final_json)?;
        let stored = StoredFinalRecord::new(draft_id.clone(), record);
        let db = self.db.lock()?;
        db.insert_final_record(&stored)?;
        db.mark_draft_finalized(&draft_id)?;
        Ok(stored.record_id)
    }

    /// Render a stored final record to PDF and remember where it went.
    pub fn render_stored_record(&self, record_id: String) -> Result<String, MedflowError> {
        let db = self.db.lock()?;
        let stored = db
            .get_final_record(&record_id)?
            .ok_or_else(|| MedflowError::NotFound(format!("final record {}", record_id)))?;
        let path = self.write_document(&stored.record)?;
        db.set_document_path(&record_id, &path)?;
        Ok(path)
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Render a final record (interchange JSON) to PDF; returns the file path.
    pub fn render_final_record(&self, final_json: String) -> Result<String, MedflowError> {
        let record = FinalRecord::from_json(&final_json)?;
        self.write_document(&record)
    }

    /// Render a final record (interchange JSON) as Markdown.
    pub fn render_markdown(&self, final_json: String) -> Result<String, MedflowError> {
        let record = FinalRecord::from_json(&final_json)?;
        Ok(self.exporter.assembler().render(&record).to_markdown())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe stored draft.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDraft {
    pub draft_id: String,
    pub patient_id: String,
    pub status: String,
    /// Partial record in interchange JSON
    pub record_json: String,
    pub created_at: String,
}

impl TryFrom<StoredDraft> for FfiDraft {
    type Error = MedflowError;

    fn try_from(draft: StoredDraft) -> Result<Self, Self::Error> {
        Ok(Self {
            record_json: draft.record.to_json()?,
            draft_id: draft.draft_id,
            patient_id: draft.patient_id,
            status: format!("{:?}", draft.status),
            created_at: draft.created_at,
        })
    }
}

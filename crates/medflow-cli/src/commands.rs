//! Command implementations. Each returns the JSON value printed on stdout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use medflow_core::models::{DoctorPlan, FinalRecord, PartialRecord, PatientInput};
use medflow_core::{
    document_filename, open_store, DocumentAssembler, MedflowConfig, MedflowCore, PdfExporter,
};
use medflow_llm::{DraftStage, FinalizationStage, Generator};
use serde_json::{json, Value};
use tracing::info;

use crate::input::{read_images, read_json, CliError};

/// Output format of the `render` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Pdf,
    Markdown,
}

/// Where the partial record for `finalize` comes from.
pub enum DraftSource {
    File(PathBuf),
    Stored(String),
}

/// Where the patient intake comes from.
pub enum PatientSource {
    File(PathBuf),
    Form(PatientInput),
}

impl PatientSource {
    fn load(&self) -> Result<PatientInput, CliError> {
        match self {
            PatientSource::File(path) => read_json(path),
            PatientSource::Form(input) => Ok(input.clone()),
        }
    }
}

/// Wired collaborators for one invocation.
pub struct App {
    config: MedflowConfig,
    generator: Box<dyn Generator>,
    store: Option<Arc<MedflowCore>>,
    exporter: PdfExporter,
}

impl App {
    pub fn new(config: MedflowConfig, generator: Box<dyn Generator>) -> Result<Self> {
        let store = match config.database_path() {
            Some(db_path) => Some(open_store(
                db_path.to_string_lossy().into_owned(),
                config.output_dir().to_string_lossy().into_owned(),
                config.provider_name().map(String::from),
            )?),
            None => None,
        };
        let exporter = PdfExporter::new(
            DocumentAssembler::new().with_provider(config.provider_name().map(String::from)),
        );

        Ok(Self {
            config,
            generator,
            store,
            exporter,
        })
    }

    fn store(&self) -> Result<&MedflowCore, CliError> {
        self.store.as_deref().ok_or(CliError::StoreNotConfigured)
    }

    fn draft_stage(&self) -> DraftStage<'_, dyn Generator> {
        DraftStage::new(self.generator.as_ref())
            .with_max_new_tokens(self.config.generator().max_new_tokens)
    }

    fn finalization_stage(&self) -> FinalizationStage<'_, dyn Generator> {
        FinalizationStage::new(self.generator.as_ref())
            .with_max_new_tokens(self.config.generator().max_new_tokens)
    }

    /// `draft`: intake to partial record, optionally saved to the store.
    pub fn draft(&self, patient: &PatientSource, images: &[PathBuf], save: bool) -> Result<Value> {
        let input = patient.load()?;
        let partial = self.draft_stage().draft(&input, read_images(images)?)?;

        let mut output = json!({ "record": partial });
        if save {
            let draft_id = self.store()?.save_draft(partial.to_json()?)?;
            info!(%draft_id, "draft saved");
            output["draft_id"] = json!(draft_id);
        }
        Ok(output)
    }

    /// `finalize`: partial record and plan to final record.
    pub fn finalize(&self, source: &DraftSource, plan: &Path, ethnicity: &str) -> Result<Value> {
        let plan: DoctorPlan = read_json(plan)?;
        let partial = match source {
            DraftSource::File(path) => read_json::<PartialRecord>(path)?,
            DraftSource::Stored(draft_id) => {
                let draft = self.store()?.get_draft(draft_id.clone())?.ok_or_else(|| {
                    medflow_core::MedflowError::NotFound(format!("draft {}", draft_id))
                })?;
                PartialRecord::from_json(&draft.record_json)?
            }
        };

        let record = self.finalization_stage().finalize(&partial, &plan, ethnicity)?;

        let mut output = json!({ "record": record });
        if let DraftSource::Stored(draft_id) = source {
            let record_id = self.store()?.finalize_draft(draft_id.clone(), record.to_json()?)?;
            output["record_id"] = json!(record_id);
        }
        Ok(output)
    }

    /// `render`: final record file to PDF path or Markdown text.
    pub fn render(&self, record: &Path, format: Format) -> Result<Value> {
        let record: FinalRecord = read_json(record)?;
        match format {
            Format::Markdown => Ok(Value::String(
                self.exporter.assembler().render(&record).to_markdown(),
            )),
            Format::Pdf => {
                let (path, _) = self.write_document(&record)?;
                Ok(json!({ "document": path }))
            }
        }
    }

    /// `run`: the whole pipeline in one call.
    pub fn run(
        &self,
        patient: &PatientSource,
        images: &[PathBuf],
        plan: &Path,
        ethnicity: &str,
    ) -> Result<Value> {
        let input = patient.load()?;
        let plan: DoctorPlan = read_json(plan)?;

        let partial = self.draft_stage().draft(&input, read_images(images)?)?;
        let record = self.finalization_stage().finalize(&partial, &plan, ethnicity)?;

        if let Some(store) = self.store.as_deref() {
            let draft_id = store.save_draft(partial.to_json()?)?;
            let record_id = store.finalize_draft(draft_id, record.to_json()?)?;
            let path = store.render_stored_record(record_id.clone())?;
            let fingerprint = self.exporter.assembler().render(&record).fingerprint();
            return Ok(json!({ "document": path, "fingerprint": fingerprint, "record_id": record_id }));
        }

        let (path, fingerprint) = self.write_document(&record)?;
        Ok(json!({ "document": path, "fingerprint": fingerprint }))
    }

    fn write_document(&self, record: &FinalRecord) -> Result<(String, String)> {
        let document = self.exporter.assembler().render(record);
        let path = self.config.output_dir().join(document_filename(
            record.patient_name.as_deref().unwrap_or_default(),
            record.patient_id.as_deref().unwrap_or_default(),
        ));
        self.exporter.write(&document, &path)?;
        Ok((path.to_string_lossy().into_owned(), document.fingerprint()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medflow_core::models::IntakeForm;
    use medflow_llm::{MockGenerator, SimulatedGenerator};

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(
                dir.path().join("patient.json"),
                r#"{"patient_name": "Jane Smith", "patient_id": "P-67890", "age": 30,
                    "gender": "Female", "symptoms": ["Sore throat", "Fever"],
                    "vitals": {"bp": "120/80", "hr": "72 bpm"}}"#,
            )
            .unwrap();
            std::fs::write(
                dir.path().join("plan.json"),
                r#"{"medications": ["Paracetamol"], "lab_tests": ["Throat swab"], "follow_up": "1 week"}"#,
            )
            .unwrap();
            Self { dir }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn patient(&self) -> PatientSource {
            PatientSource::File(self.path("patient.json"))
        }

        fn app(&self, generator: Box<dyn Generator>, with_store: bool) -> App {
            let mut config = MedflowConfig::default().with_output_dir(self.path("pdfs"));
            if with_store {
                config = config.with_database_path(self.path("medflow.db"));
            }
            App::new(config, generator).unwrap()
        }
    }

    #[test]
    fn test_run_without_store_writes_pdf() {
        let fx = Fixture::new();
        let app = fx.app(Box::new(SimulatedGenerator::new()), false);

        let out = app
            .run(&fx.patient(), &[], &fx.path("plan.json"), "Hispanic")
            .unwrap();

        let document = PathBuf::from(out["document"].as_str().unwrap());
        assert_eq!(document, fx.path("pdfs").join("soap_note_Jane_Smith_P-67890.pdf"));
        assert!(document.exists());
        assert_eq!(out["fingerprint"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn test_draft_then_finalize_through_store() {
        let fx = Fixture::new();
        let app = fx.app(Box::new(SimulatedGenerator::new()), true);

        let drafted = app.draft(&fx.patient(), &[], true).unwrap();
        let draft_id = drafted["draft_id"].as_str().unwrap().to_string();
        assert_eq!(drafted["record"]["patient_id"], "P-67890");

        let finalized = app
            .finalize(&DraftSource::Stored(draft_id), &fx.path("plan.json"), "Hispanic")
            .unwrap();
        assert!(finalized["record_id"].is_string());
        assert_eq!(
            finalized["record"]["test_validation"][0]["test"],
            "Throat swab"
        );
    }

    #[test]
    fn test_draft_from_form_fields() {
        let fx = Fixture::new();
        let app = fx.app(Box::new(SimulatedGenerator::new()), false);
        let input = PatientInput::from_form(&IntakeForm {
            patient_name: "Jane Smith",
            patient_id: "P-67890",
            symptoms: "Sore throat, Fever",
            blood_pressure: "120/80",
            ..Default::default()
        });

        let out = app.draft(&PatientSource::Form(input), &[], false).unwrap();

        assert_eq!(out["record"]["patient_name"], "Jane Smith");
        assert_eq!(out["record"]["subjective"]["chief_complaint"], "Sore throat");
        assert_eq!(
            out["record"]["objective"]["vital_signs"]["blood_pressure"],
            "120/80"
        );
        assert!(out.get("draft_id").is_none());
    }

    #[test]
    fn test_save_without_store_is_rejected() {
        let fx = Fixture::new();
        let app = fx.app(Box::new(SimulatedGenerator::new()), false);

        let err = app.draft(&fx.patient(), &[], true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::StoreNotConfigured)
        ));
    }

    #[test]
    fn test_render_markdown_from_file() {
        let fx = Fixture::new();
        let app = fx.app(Box::new(MockGenerator::new("{}")), false);
        std::fs::write(
            fx.path("final.json"),
            r#"{"patient_name": "Jane Smith", "soap_note": {"assessment": "Viral pharyngitis"},
                "safety_notice": "Return if breathing becomes difficult."}"#,
        )
        .unwrap();

        let out = app.render(&fx.path("final.json"), Format::Markdown).unwrap();
        let md = out.as_str().unwrap();
        assert!(md.contains("Viral pharyngitis"));
        assert!(md.contains("SAFETY ALERT"));
    }

    #[test]
    fn test_missing_patient_file() {
        let fx = Fixture::new();
        let app = fx.app(Box::new(MockGenerator::new("{}")), false);

        let err = app.draft(&PatientSource::File(fx.path("nobody.json")), &[], false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::InputNotFound(_))
        ));
    }
}

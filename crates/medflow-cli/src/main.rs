//! `medflow`: command-line host for the SOAP note pipeline.
//!
//! Results go to stdout as JSON (or Markdown for `render --format
//! markdown`); logs go to stderr. Failures print `{"error", "kind"}` and
//! exit with status 1.

mod commands;
mod input;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use medflow_core::models::{IntakeForm, PatientInput};
use medflow_core::MedflowConfig;
use medflow_llm::{Generator, OllamaGenerator, SimulatedGenerator};
use serde_json::Value;
use tracing::info;

use commands::{App, DraftSource, Format, PatientSource};
use input::CliError;

#[derive(Parser)]
#[command(name = "medflow")]
#[command(about = "Draft, finalize and render SOAP notes")]
struct Cli {
    /// Use the offline simulated model instead of Ollama
    #[arg(long, global = true)]
    simulate: bool,

    /// Directory for rendered documents (overrides MEDFLOW_OUTPUT_DIR)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// SQLite draft store (overrides MEDFLOW_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Intake form fields, accepted instead of `--patient`.
/// List fields are comma separated.
#[derive(Args, Debug, Default)]
#[group(id = "form", multiple = true)]
struct IntakeArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    patient_id: Option<String>,
    #[arg(long)]
    age: Option<u32>,
    #[arg(long)]
    gender: Option<String>,
    /// e.g. "Chest discomfort, Fatigue"
    #[arg(long)]
    symptoms: Option<String>,
    #[arg(long)]
    duration: Option<String>,
    #[arg(long)]
    severity: Option<String>,
    /// Past medical history
    #[arg(long)]
    history: Option<String>,
    #[arg(long)]
    medications: Option<String>,
    /// Blood pressure, e.g. 145/90
    #[arg(long)]
    bp: Option<String>,
    /// Heart rate, e.g. "92 bpm"
    #[arg(long)]
    hr: Option<String>,
}

impl IntakeArgs {
    fn is_empty(&self) -> bool {
        self.age.is_none()
            && [
                &self.name,
                &self.patient_id,
                &self.gender,
                &self.symptoms,
                &self.duration,
                &self.severity,
                &self.history,
                &self.medications,
                &self.bp,
                &self.hr,
            ]
            .iter()
            .all(|field| field.is_none())
    }

    fn to_input(&self) -> PatientInput {
        fn text(field: &Option<String>) -> &str {
            field.as_deref().unwrap_or_default()
        }
        PatientInput::from_form(&IntakeForm {
            patient_name: text(&self.name),
            patient_id: text(&self.patient_id),
            age: self.age,
            gender: text(&self.gender),
            symptoms: text(&self.symptoms),
            duration: text(&self.duration),
            severity: text(&self.severity),
            medical_history: text(&self.history),
            medications: text(&self.medications),
            blood_pressure: text(&self.bp),
            heart_rate: text(&self.hr),
        })
    }
}

fn patient_source(patient: Option<PathBuf>, form: &IntakeArgs) -> Result<PatientSource, CliError> {
    match patient {
        Some(path) => Ok(PatientSource::File(path)),
        None if form.is_empty() => Err(CliError::NoIntake),
        None => Ok(PatientSource::Form(form.to_input())),
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Structure patient intake into a draft (S/O/A)
    Draft {
        /// Patient intake JSON
        #[arg(long, conflicts_with = "form")]
        patient: Option<PathBuf>,
        #[command(flatten)]
        form: IntakeArgs,
        /// Medical image to attach (repeatable)
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        /// Save the draft to the store and print its ID
        #[arg(long)]
        save: bool,
    },
    /// Merge a draft with the clinician's plan
    Finalize {
        /// Partial record JSON
        #[arg(long, conflicts_with = "draft_id", required_unless_present = "draft_id")]
        draft: Option<PathBuf>,
        /// ID of a stored draft
        #[arg(long)]
        draft_id: Option<String>,
        /// Doctor plan JSON
        #[arg(long)]
        plan: PathBuf,
        /// Patient ethnicity, used for lifestyle guidance
        #[arg(long, default_value = "")]
        ethnicity: String,
    },
    /// Render a final record
    Render {
        /// Final record JSON
        #[arg(long)]
        record: PathBuf,
        #[arg(long, value_enum, default_value = "pdf")]
        format: Format,
    },
    /// Draft, finalize and render in one step
    Run {
        #[arg(long, conflicts_with = "form")]
        patient: Option<PathBuf>,
        #[command(flatten)]
        form: IntakeArgs,
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        #[arg(long)]
        plan: PathBuf,
        #[arg(long, default_value = "")]
        ethnicity: String,
    },
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match init_tracing().and_then(|()| execute(cli)) {
        Ok(Value::String(text)) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "command failed");
            println!("{}", input::error_payload(&e));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("medflow=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn execute(cli: Cli) -> Result<Value> {
    let mut config = MedflowConfig::from_env()?;
    if let Some(dir) = cli.output_dir {
        config = config.with_output_dir(dir);
    }
    if let Some(db) = cli.db {
        config = config.with_database_path(db);
    }

    let generator: Box<dyn Generator> = if cli.simulate {
        info!("using simulated model");
        Box::new(SimulatedGenerator::new())
    } else {
        let settings = config.generator();
        info!(url = %settings.base_url, model = %settings.model, "using Ollama backend");
        Box::new(OllamaGenerator::new(settings)?)
    };
    let app = App::new(config, generator)?;

    match cli.command {
        Commands::Draft {
            patient,
            form,
            images,
            save,
        } => app.draft(&patient_source(patient, &form)?, &images, save),
        Commands::Finalize {
            draft,
            draft_id,
            plan,
            ethnicity,
        } => {
            let source = match (draft, draft_id) {
                (_, Some(id)) => DraftSource::Stored(id),
                (Some(path), None) => DraftSource::File(path),
                (None, None) => anyhow::bail!("either --draft or --draft-id is required"),
            };
            app.finalize(&source, &plan, &ethnicity)
        }
        Commands::Render { record, format } => app.render(&record, format),
        Commands::Run {
            patient,
            form,
            images,
            plan,
            ethnicity,
        } => app.run(&patient_source(patient, &form)?, &images, &plan, &ethnicity),
    }
}

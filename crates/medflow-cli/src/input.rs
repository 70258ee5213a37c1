//! Input files and CLI error reporting.

use std::path::{Path, PathBuf};

use medflow_core::{ExportError, MedflowError};
use medflow_llm::{ImageAttachment, StageError};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

/// Errors raised by the command-line host itself.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("input file {} is malformed: {reason}", .path.display())]
    InputMalformed { path: PathBuf, reason: String },

    #[error("no draft store configured; pass --db or set MEDFLOW_DB_PATH")]
    StoreNotConfigured,

    #[error("no patient intake given; pass --patient or form fields such as --symptoms")]
    NoIntake,
}

/// Read and deserialize a JSON input file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CliError::InputNotFound(path.to_path_buf()),
        _ => CliError::InputMalformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    })?;
    serde_json::from_str(&text).map_err(|e| CliError::InputMalformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Load image attachments in command-line order.
pub fn read_images(paths: &[PathBuf]) -> Result<Vec<ImageAttachment>, CliError> {
    paths
        .iter()
        .map(|path| {
            ImageAttachment::from_path(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CliError::InputNotFound(path.clone()),
                _ => CliError::InputMalformed {
                    path: path.clone(),
                    reason: e.to_string(),
                },
            })
        })
        .collect()
}

/// Structured error payload printed on failure.
pub fn error_payload(error: &anyhow::Error) -> Value {
    let kind = if let Some(e) = error.downcast_ref::<CliError>() {
        match e {
            CliError::InputNotFound(_) => "input_not_found".to_string(),
            CliError::InputMalformed { .. } => "input_malformed".to_string(),
            CliError::StoreNotConfigured => "store_not_configured".to_string(),
            CliError::NoIntake => "input_not_found".to_string(),
        }
    } else if let Some(e) = error.downcast_ref::<StageError>() {
        format!("{}_stage_failed", e.stage())
    } else if error.downcast_ref::<ExportError>().is_some() {
        "export_failed".to_string()
    } else if let Some(e) = error.downcast_ref::<MedflowError>() {
        match e {
            MedflowError::NotFound(_) => "not_found".to_string(),
            MedflowError::ExportError(_) => "export_failed".to_string(),
            _ => "store_failed".to_string(),
        }
    } else {
        "internal".to_string()
    };

    json!({ "error": format!("{:#}", error), "kind": kind })
}

#[cfg(test)]
mod tests {
    use super::*;
    use medflow_core::models::DoctorPlan;
    use medflow_llm::{GenerationError, Stage};

    #[test]
    fn test_read_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, r#"{"lab_tests": ["CBC"]}"#).unwrap();

        let plan: DoctorPlan = read_json(&path).unwrap();
        assert_eq!(plan.lab_tests, vec!["CBC".to_string()]);
    }

    #[test]
    fn test_read_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(
            read_json::<DoctorPlan>(&missing),
            Err(CliError::InputNotFound(p)) if p == missing
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ nope").unwrap();
        assert!(matches!(
            read_json::<DoctorPlan>(&bad),
            Err(CliError::InputMalformed { .. })
        ));
    }

    #[test]
    fn test_read_images_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_images(&[dir.path().join("scan.png")]).unwrap_err();
        assert!(matches!(err, CliError::InputNotFound(_)));
    }

    #[test]
    fn test_error_payload_kinds() {
        let payload = error_payload(&anyhow::Error::new(CliError::StoreNotConfigured));
        assert_eq!(payload["kind"], "store_not_configured");

        let stage = StageError::ExternalModel {
            stage: Stage::Draft,
            source: GenerationError::Unavailable("http://localhost:11434".into()),
        };
        let payload = error_payload(&anyhow::Error::new(stage));
        assert_eq!(payload["kind"], "draft_stage_failed");
        assert!(payload["error"]
            .as_str()
            .unwrap()
            .contains("http://localhost:11434"));

        let payload = error_payload(&anyhow::anyhow!("boom"));
        assert_eq!(payload["kind"], "internal");
    }
}

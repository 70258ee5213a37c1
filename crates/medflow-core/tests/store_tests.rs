//! Host handle integration tests: drafts in, documents out.

use medflow_core::models::{ClinicalField, PartialRecord};
use medflow_core::{open_store, open_store_in_memory, FinalRecord, MedflowError};

fn partial_json(patient_id: &str) -> String {
    PartialRecord {
        subjective: ClinicalField::Text("Chest discomfort for 2 weeks".into()),
        assessment: ClinicalField::Text("Further evaluation required".into()),
        safety_notice: "Seek care if pain worsens".into(),
        ..Default::default()
    }
    .with_identity(Some("John Doe".into()), Some(patient_id.into()))
    .to_json()
    .unwrap()
}

fn final_json() -> String {
    let mut record = FinalRecord::default();
    record.patient_name = Some("John Doe".into());
    record.patient_id = Some("P-1".into());
    record.safety_notice = "Seek care if pain worsens".into();
    record.to_json().unwrap()
}

#[test]
fn test_draft_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let core = open_store_in_memory(dir.path().to_string_lossy().into_owned(), None).unwrap();

    let draft_id = core.save_draft(partial_json("P-1")).unwrap();
    let draft = core.get_draft(draft_id.clone()).unwrap().unwrap();
    assert_eq!(draft.patient_id, "P-1");
    assert_eq!(draft.status, "AwaitingPlan");
    assert_eq!(
        PartialRecord::from_json(&draft.record_json).unwrap(),
        PartialRecord::from_json(&partial_json("P-1")).unwrap()
    );
    assert_eq!(core.list_open_drafts().unwrap().len(), 1);

    let record_id = core.finalize_draft(draft_id.clone(), final_json()).unwrap();
    assert!(!record_id.is_empty());
    assert!(core.list_open_drafts().unwrap().is_empty());
    assert_eq!(core.get_draft(draft_id).unwrap().unwrap().status, "Finalized");

    let path = core.render_stored_record(record_id).unwrap();
    assert!(path.ends_with("soap_note_John_Doe_P-1.pdf"));
    assert!(std::path::Path::new(&path).exists());
}

#[test]
fn test_finalize_unknown_draft() {
    let dir = tempfile::tempdir().unwrap();
    let core = open_store_in_memory(dir.path().to_string_lossy().into_owned(), None).unwrap();

    let err = core
        .finalize_draft("no-such-draft".into(), final_json())
        .unwrap_err();
    assert!(matches!(err, MedflowError::NotFound(_)));
}

#[test]
fn test_malformed_json_is_serialization_error() {
    let dir = tempfile::tempdir().unwrap();
    let core = open_store_in_memory(dir.path().to_string_lossy().into_owned(), None).unwrap();

    let err = core.save_draft("not json".into()).unwrap_err();
    assert!(matches!(err, MedflowError::SerializationError(_)));
}

#[test]
fn test_render_final_record_and_markdown() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("pdfs");
    let core = open_store_in_memory(
        out.to_string_lossy().into_owned(),
        Some("Dr. Rivera".into()),
    )
    .unwrap();

    let path = core.render_final_record(final_json()).unwrap();
    assert_eq!(
        std::path::PathBuf::from(&path),
        out.join("soap_note_John_Doe_P-1.pdf")
    );

    let md = core.render_markdown(final_json()).unwrap();
    assert!(md.contains("| Provider: | Dr. Rivera |"));
    assert!(md.contains("SAFETY ALERT"));
}

#[test]
fn test_file_store_lists_patient_drafts() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("medflow.db");
    let out = dir.path().join("pdfs");

    {
        let core = open_store(
            db_path.to_string_lossy().into_owned(),
            out.to_string_lossy().into_owned(),
            None,
        )
        .unwrap();
        core.save_draft(partial_json("P-1")).unwrap();
        core.save_draft(partial_json("P-2")).unwrap();
    }

    let core = open_store(
        db_path.to_string_lossy().into_owned(),
        out.to_string_lossy().into_owned(),
        None,
    )
    .unwrap();
    assert_eq!(core.list_drafts("P-1".into()).unwrap().len(), 1);
    assert_eq!(core.list_drafts("P-3".into()).unwrap().len(), 0);
}

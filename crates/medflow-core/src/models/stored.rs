//! Persisted drafts and final records.

use serde::{Deserialize, Serialize};

use super::record::{FinalRecord, PartialRecord};

/// Draft lifecycle status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DraftStatus {
    /// Drafted, awaiting the clinician's plan
    AwaitingPlan,
    /// A final record has been produced from this draft
    Finalized,
}

/// A stored draft: the partial record plus bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredDraft {
    /// Unique draft ID
    pub draft_id: String,
    /// Patient identifier ("Unknown" when intake had none)
    pub patient_id: String,
    /// Draft stage output
    pub record: PartialRecord,
    /// Draft status
    pub status: DraftStatus,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl StoredDraft {
    /// Wrap a freshly drafted record.
    pub fn new(record: PartialRecord) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            draft_id: uuid::Uuid::new_v4().to_string(),
            patient_id: record
                .patient_id
                .clone()
                .unwrap_or_else(|| "Unknown".into()),
            record,
            status: DraftStatus::AwaitingPlan,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// A stored final record. Re-finalization stores a new row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredFinalRecord {
    pub record_id: String,
    /// Draft this record was finalized from
    pub draft_id: String,
    pub record: FinalRecord,
    /// Rendered document location, once rendered
    pub document_path: Option<String>,
    pub created_at: String,
}

impl StoredFinalRecord {
    pub fn new(draft_id: String, record: FinalRecord) -> Self {
        Self {
            record_id: uuid::Uuid::new_v4().to_string(),
            draft_id,
            record,
            document_path: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_draft() {
        let record = PartialRecord::default().with_identity(None, Some("P-12345".into()));
        let draft = StoredDraft::new(record);
        assert_eq!(draft.patient_id, "P-12345");
        assert_eq!(draft.status, DraftStatus::AwaitingPlan);
        assert_eq!(draft.draft_id.len(), 36);
    }

    #[test]
    fn test_new_draft_without_patient_id() {
        let draft = StoredDraft::new(PartialRecord::default());
        assert_eq!(draft.patient_id, "Unknown");
    }
}

//! SOAP draft database operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::{DraftStatus, PartialRecord, StoredDraft};

const DRAFT_COLUMNS: &str = "draft_id, patient_id, partial_record, status, created_at, updated_at";

impl Database {
    /// Insert a new draft.
    pub fn insert_draft(&self, draft: &StoredDraft) -> DbResult<()> {
        let record_json = serde_json::to_string(&draft.record)?;

        self.conn.execute(
            r#"
            INSERT INTO soap_drafts (
                draft_id, patient_id, partial_record, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                draft.draft_id,
                draft.patient_id,
                record_json,
                status_to_string(&draft.status),
                draft.created_at,
                draft.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get a draft by ID.
    pub fn get_draft(&self, draft_id: &str) -> DbResult<Option<StoredDraft>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM soap_drafts WHERE draft_id = ?", DRAFT_COLUMNS),
                [draft_id],
                DraftRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List all drafts for a patient, newest first.
    pub fn list_drafts_for_patient(&self, patient_id: &str) -> DbResult<Vec<StoredDraft>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM soap_drafts WHERE patient_id = ? ORDER BY created_at DESC",
            DRAFT_COLUMNS
        ))?;

        let rows = stmt.query_map([patient_id], DraftRow::from_row)?;

        let mut drafts = Vec::new();
        for row in rows {
            drafts.push(row?.try_into()?);
        }
        Ok(drafts)
    }

    /// List drafts still awaiting a plan, oldest first.
    pub fn list_open_drafts(&self) -> DbResult<Vec<StoredDraft>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM soap_drafts WHERE status = 'awaiting_plan' ORDER BY created_at ASC",
            DRAFT_COLUMNS
        ))?;

        let rows = stmt.query_map([], DraftRow::from_row)?;

        let mut drafts = Vec::new();
        for row in rows {
            drafts.push(row?.try_into()?);
        }
        Ok(drafts)
    }

    /// Mark a draft as finalized.
    pub fn mark_draft_finalized(&self, draft_id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE soap_drafts SET status = 'finalized', updated_at = datetime('now') WHERE draft_id = ?",
            [draft_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Delete a draft and its final records.
    pub fn delete_draft(&self, draft_id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM soap_drafts WHERE draft_id = ?", [draft_id])?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct DraftRow {
    draft_id: String,
    patient_id: String,
    partial_record: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl DraftRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(DraftRow {
            draft_id: row.get(0)?,
            patient_id: row.get(1)?,
            partial_record: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl TryFrom<DraftRow> for StoredDraft {
    type Error = DbError;

    fn try_from(row: DraftRow) -> Result<Self, Self::Error> {
        let record: PartialRecord = serde_json::from_str(&row.partial_record)?;
        let status = string_to_status(&row.status)?;

        Ok(StoredDraft {
            draft_id: row.draft_id,
            patient_id: row.patient_id,
            record,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn status_to_string(status: &DraftStatus) -> &'static str {
    match status {
        DraftStatus::AwaitingPlan => "awaiting_plan",
        DraftStatus::Finalized => "finalized",
    }
}

fn string_to_status(s: &str) -> Result<DraftStatus, DbError> {
    match s {
        "awaiting_plan" => Ok(DraftStatus::AwaitingPlan),
        "finalized" => Ok(DraftStatus::Finalized),
        _ => Err(DbError::Constraint(format!("Unknown draft status: {}", s))),
    }
}

//! Final record database operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::{FinalRecord, StoredFinalRecord};

impl Database {
    /// Insert a final record. The referenced draft must exist.
    pub fn insert_final_record(&self, stored: &StoredFinalRecord) -> DbResult<()> {
        if self.get_draft(&stored.draft_id)?.is_none() {
            return Err(DbError::NotFound(format!("draft {}", stored.draft_id)));
        }
        let record_json = serde_json::to_string(&stored.record)?;

        self.conn.execute(
            r#"
            INSERT INTO final_records (record_id, draft_id, final_record, document_path, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                stored.record_id,
                stored.draft_id,
                record_json,
                stored.document_path,
                stored.created_at,
            ],
        )?;
        Ok(())
    }

    /// Get a final record by ID.
    pub fn get_final_record(&self, record_id: &str) -> DbResult<Option<StoredFinalRecord>> {
        self.conn
            .query_row(
                r#"
                SELECT record_id, draft_id, final_record, document_path, created_at
                FROM final_records
                WHERE record_id = ?
                "#,
                [record_id],
                FinalRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List every finalization of a draft, newest first.
    pub fn list_final_records_for_draft(&self, draft_id: &str) -> DbResult<Vec<StoredFinalRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT record_id, draft_id, final_record, document_path, created_at
            FROM final_records
            WHERE draft_id = ?
            ORDER BY created_at DESC
            "#,
        )?;

        let rows = stmt.query_map([draft_id], FinalRow::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.try_into()?);
        }
        Ok(records)
    }

    /// Record where a final record's document was written.
    pub fn set_document_path(&self, record_id: &str, path: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE final_records SET document_path = ?2 WHERE record_id = ?1",
            params![record_id, path],
        )?;
        Ok(rows_affected > 0)
    }
}

struct FinalRow {
    record_id: String,
    draft_id: String,
    final_record: String,
    document_path: Option<String>,
    created_at: String,
}

impl FinalRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(FinalRow {
            record_id: row.get(0)?,
            draft_id: row.get(1)?,
            final_record: row.get(2)?,
            document_path: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl TryFrom<FinalRow> for StoredFinalRecord {
    type Error = DbError;

    fn try_from(row: FinalRow) -> Result<Self, Self::Error> {
        let record: FinalRecord = serde_json::from_str(&row.final_record)?;
        Ok(StoredFinalRecord {
            record_id: row.record_id,
            draft_id: row.draft_id,
            record,
            document_path: row.document_path,
            created_at: row.created_at,
        })
    }
}

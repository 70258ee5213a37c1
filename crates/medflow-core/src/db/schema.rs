//! SQLite schema definition.

/// Bumped whenever `SCHEMA` changes shape; stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Draft store schema. Every statement is idempotent.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- SOAP Drafts (draft stage output, awaiting the clinician's plan)
-- ============================================================================

CREATE TABLE IF NOT EXISTS soap_drafts (
    draft_id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    partial_record TEXT NOT NULL,                -- JSON PartialRecord
    status TEXT NOT NULL DEFAULT 'awaiting_plan', -- awaiting_plan, finalized
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),

    CHECK (status IN ('awaiting_plan', 'finalized'))
);

CREATE INDEX IF NOT EXISTS idx_drafts_patient ON soap_drafts(patient_id);
CREATE INDEX IF NOT EXISTS idx_drafts_status ON soap_drafts(status);

-- ============================================================================
-- Final Records (one row per finalization; re-finalizing appends)
-- ============================================================================

CREATE TABLE IF NOT EXISTS final_records (
    record_id TEXT PRIMARY KEY,
    draft_id TEXT NOT NULL REFERENCES soap_drafts(draft_id) ON DELETE CASCADE,
    final_record TEXT NOT NULL,                  -- JSON FinalRecord
    document_path TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_final_records_draft ON final_records(draft_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_creates_successfully() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
    }

    #[test]
    fn test_draft_status_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO soap_drafts (draft_id, patient_id, partial_record, status) VALUES ('d1', 'p1', '{}', 'bogus')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_final_record_requires_draft() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO final_records (record_id, draft_id, final_record) VALUES ('r1', 'missing', '{}')",
            [],
        );
        assert!(result.is_err());
    }
}

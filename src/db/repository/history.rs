use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{WorkflowAction, WorkflowStatus};
use crate::models::WorkflowHistoryEntry;

/// Next sequence number for a document's trail (1 for an empty trail).
pub fn next_history_seq(conn: &Connection, document_id: &Uuid) -> Result<i64, DatabaseError> {
    let next = conn.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM workflow_history WHERE document_id = ?1",
        params![document_id.to_string()],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(next)
}

/// Append one transition. The `(document_id, seq)` unique key rejects a second
/// writer that raced for the same position.
pub fn insert_history_entry(
    conn: &Connection,
    entry: &WorkflowHistoryEntry,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO workflow_history (document_id, seq, from_status, to_status, action, actor,
         from_folder, to_folder, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.document_id.to_string(),
            entry.seq,
            entry.from_status.as_str(),
            entry.to_status.as_str(),
            entry.action.as_str(),
            entry.actor,
            entry.from_folder,
            entry.to_folder,
            entry.reason,
            entry.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_workflow_history(
    conn: &Connection,
    document_id: &Uuid,
) -> Result<Vec<WorkflowHistoryEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT seq, from_status, to_status, action, actor, from_folder, to_folder, reason,
         created_at
         FROM workflow_history WHERE document_id = ?1 ORDER BY seq ASC",
    )?;
    let rows = stmt.query_map(params![document_id.to_string()], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, Option<String>>(7)?,
            row.get::<_, chrono::DateTime<chrono::Utc>>(8)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (seq, from, to, action, actor, from_folder, to_folder, reason, created_at) = row?;
        entries.push(WorkflowHistoryEntry {
            document_id: *document_id,
            seq,
            from_status: WorkflowStatus::from_str(&from)?,
            to_status: WorkflowStatus::from_str(&to)?,
            action: WorkflowAction::from_str(&action)?,
            actor,
            from_folder,
            to_folder,
            reason,
            created_at,
        });
    }
    Ok(entries)
}

pub fn count_history_entries(conn: &Connection, document_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM workflow_history WHERE document_id = ?1",
        params![document_id.to_string()],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

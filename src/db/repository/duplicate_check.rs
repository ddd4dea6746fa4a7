use chrono::Utc;
use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::pipeline::intake::duplicate::DuplicateMatch;

/// Record the outcome of one duplicate check. Only the top-ranked match is kept.
pub fn insert_duplicate_check(
    conn: &Connection,
    file_name: &str,
    content_hash: &str,
    matches: &[DuplicateMatch],
    checked_by: &str,
) -> Result<(), DatabaseError> {
    let top = matches.first();
    conn.execute(
        "INSERT INTO duplicate_checks (file_name, content_hash, match_count, top_document_id,
         top_strategy, top_confidence, checked_by, checked_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            file_name,
            content_hash,
            matches.len() as i64,
            top.map(|m| m.document_id.to_string()),
            top.map(|m| m.strategy.as_str()),
            top.map(|m| m.confidence),
            checked_by,
            Utc::now(),
        ],
    )?;
    Ok(())
}

pub fn count_duplicate_checks(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM duplicate_checks", [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(count)
}

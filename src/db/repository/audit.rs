use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;

/// One append-only audit record, consumed by reporting outside the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub entity: String,
    pub details: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(actor: &str, action: &str, entity: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            actor: actor.to_string(),
            action: action.to_string(),
            entity: entity.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

pub fn insert_audit_event(conn: &Connection, event: &AuditEvent) -> Result<(), DatabaseError> {
    let details = event.details.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO audit_log (timestamp, actor, action, entity, details)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![event.timestamp, event.actor, event.action, event.entity, details],
    )?;
    Ok(())
}

/// Audit events recorded against one entity, oldest first.
pub fn query_audit_by_entity(
    conn: &Connection,
    entity: &str,
) -> Result<Vec<AuditEvent>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, actor, action, entity, details FROM audit_log
         WHERE entity = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map(params![entity], |row| {
            Ok((
                row.get::<_, DateTime<Utc>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(timestamp, actor, action, entity, details)| -> Result<AuditEvent, DatabaseError> {
            Ok(AuditEvent {
                timestamp,
                actor,
                action,
                entity,
                details: details.as_deref().map(serde_json::from_str).transpose()?,
            })
        })
        .collect()
}

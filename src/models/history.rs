use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{WorkflowAction, WorkflowStatus};

/// One immutable row of a document's workflow trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowHistoryEntry {
    pub document_id: Uuid,
    /// Position in the document's trail, starting at 1.
    pub seq: i64,
    pub from_status: WorkflowStatus,
    pub to_status: WorkflowStatus,
    pub action: WorkflowAction,
    pub actor: String,
    pub from_folder: Option<String>,
    pub to_folder: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

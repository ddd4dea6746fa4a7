use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{DocumentCategory, WorkflowStatus};
use super::extracted::ExtractedFields;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub content_hash: Option<String>,
    pub classification: Option<DocumentCategory>,
    pub extracted: ExtractedFields,
    pub status: WorkflowStatus,
    /// Folder the document currently lives in.
    pub folder_path: Option<String>,
    /// Suggested destination until approval, then the folder it was filed to.
    pub destination_folder: Option<String>,
    pub uploaded_by: String,
    pub version: i64,
    pub parent_document_id: Option<Uuid>,
    pub is_latest_version: bool,
    pub replaced_by: Option<Uuid>,
    pub requires_approval: bool,
    pub needs_review: bool,
    pub matched_shipment_id: Option<Uuid>,
    pub uploaded_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub archived_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped on every workflow write.
    pub row_version: i64,
}

impl Document {
    /// A fresh draft with no version chain, extraction or workflow stamps.
    pub fn new_draft(
        name: impl Into<String>,
        storage_path: impl Into<String>,
        mime_type: impl Into<String>,
        size_bytes: u64,
        uploaded_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            storage_path: storage_path.into(),
            mime_type: mime_type.into(),
            size_bytes,
            content_hash: None,
            classification: None,
            extracted: ExtractedFields::default(),
            status: WorkflowStatus::Draft,
            folder_path: None,
            destination_folder: None,
            uploaded_by: uploaded_by.into(),
            version: 1,
            parent_document_id: None,
            is_latest_version: true,
            replaced_by: None,
            requires_approval: false,
            needs_review: false,
            matched_shipment_id: None,
            uploaded_at: Utc::now(),
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            archived_at: None,
            row_version: 0,
        }
    }

    /// Root of the version chain this document belongs to.
    pub fn chain_root(&self) -> Uuid {
        self.parent_document_id.unwrap_or(self.id)
    }
}

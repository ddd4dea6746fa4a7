use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::SessionContext;
use crate::notify::Notifier;

use super::machine::approve;

/// Per-item outcome of a bulk approval. One failure never stops the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkApproveReport {
    pub succeeded: Vec<Uuid>,
    /// Document id and the reason it was not approved.
    pub failed: Vec<(Uuid, String)>,
}

impl BulkApproveReport {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }
}

/// Approve each document independently, in the order given.
pub fn bulk_approve(
    conn: &Connection,
    notifier: &dyn Notifier,
    ids: &[Uuid],
    destination_folder: Option<&str>,
    ctx: &SessionContext,
) -> BulkApproveReport {
    let mut report = BulkApproveReport::default();
    for id in ids {
        match approve(conn, notifier, id, destination_folder, ctx) {
            Ok(_) => report.succeeded.push(*id),
            Err(e) => {
                tracing::warn!(document_id = %id, error = %e, "Bulk approve item failed");
                report.failed.push((*id, e.to_string()));
            }
        }
    }
    tracing::info!(
        succeeded = report.success_count(),
        failed = report.failure_count(),
        actor = %ctx.actor(),
        "Bulk approve finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{IntakeChannel, WorkflowStatus};
    use crate::models::Document;
    use crate::notify::OutboxNotifier;
    use crate::workflow::machine::stage_for_review;

    #[test]
    fn one_bad_id_does_not_stop_the_batch() {
        let conn = open_memory_database().unwrap();
        let ctx = SessionContext::new("lead", IntakeChannel::Batch);
        let outbox = OutboxNotifier::new();

        let mut ids = Vec::new();
        for i in 0..4 {
            let doc = Document::new_draft(
                format!("doc_{i}.pdf"),
                format!("documents/{i}.pdf"),
                "application/pdf",
                10,
                "ops",
            );
            repository::insert_document(&conn, &doc).unwrap();
            stage_for_review(&conn, &doc.id, "Shipments/LOT 7/Shipping Documents", &ctx).unwrap();
            ids.push(doc.id);
        }
        let missing = Uuid::new_v4();
        ids.insert(2, missing);

        let report = bulk_approve(&conn, &outbox, &ids, None, &ctx);
        assert_eq!(report.success_count(), 4);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failed[0].0, missing);
        assert!(report.failed[0].1.contains("not found"));
        assert_eq!(outbox.len(), 4);

        for id in &report.succeeded {
            let doc = repository::get_document(&conn, id).unwrap().unwrap();
            assert_eq!(doc.status, WorkflowStatus::Approved);
        }
    }

    #[test]
    fn already_approved_items_are_reported_not_reapproved() {
        let conn = open_memory_database().unwrap();
        let ctx = SessionContext::new("lead", IntakeChannel::Upload);
        let doc = Document::new_draft("inv.pdf", "documents/inv.pdf", "application/pdf", 10, "ops");
        repository::insert_document(&conn, &doc).unwrap();

        let outbox = OutboxNotifier::new();
        let first = bulk_approve(&conn, &outbox, &[doc.id], Some("Finance"), &ctx);
        let second = bulk_approve(&conn, &outbox, &[doc.id], Some("Finance"), &ctx);

        assert_eq!(first.success_count(), 1);
        assert_eq!(second.failure_count(), 1);
        assert_eq!(repository::count_history_entries(&conn, &doc.id).unwrap(), 1);
    }
}

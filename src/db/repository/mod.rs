//! Repository layer: entity-scoped database operations.
//!
//! All public functions are re-exported here so callers can use
//! `db::repository::*` without knowing the sub-module split.

mod audit;
mod document;
mod duplicate_check;
mod file_costing;
mod history;
mod settings;
mod shipment;

pub use audit::*;
pub use document::*;
pub use duplicate_check::*;
pub use file_costing::*;
pub use history::*;
pub use settings::*;
pub use shipment::*;

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::db::DatabaseError;
    use crate::models::*;

    fn make_document(name: &str) -> Document {
        Document::new_draft(
            name,
            format!("documents/{name}"),
            "application/pdf",
            128,
            "ops@freight",
        )
    }

    #[test]
    fn insert_and_get_document_round_trip() {
        let conn = open_memory_database().unwrap();
        let mut doc = make_document("invoice_2024.pdf");
        doc.content_hash = Some("abc".into());
        doc.classification = Some(DocumentCategory::SupplierInvoice);
        doc.extracted.invoice_number = Some("INV-1".into());
        insert_document(&conn, &doc).unwrap();

        let loaded = get_document(&conn, &doc.id).unwrap().unwrap();
        assert_eq!(loaded.name, doc.name);
        assert_eq!(loaded.classification, Some(DocumentCategory::SupplierInvoice));
        assert_eq!(loaded.extracted.invoice_number.as_deref(), Some("INV-1"));
        assert_eq!(loaded.status, WorkflowStatus::Draft);
        assert!(loaded.is_latest_version);
        assert_eq!(loaded.uploaded_at, doc.uploaded_at);
    }

    #[test]
    fn get_missing_document_is_none() {
        let conn = open_memory_database().unwrap();
        assert!(get_document(&conn, &Uuid::new_v4()).unwrap().is_none());
        assert!(matches!(
            require_document(&conn, &Uuid::new_v4()),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn lookback_window_excludes_old_uploads() {
        let conn = open_memory_database().unwrap();
        let recent = make_document("recent.pdf");
        let mut old = make_document("old.pdf");
        old.uploaded_at = Utc::now() - Duration::days(200);
        insert_document(&conn, &recent).unwrap();
        insert_document(&conn, &old).unwrap();

        let since = Some(Utc::now() - Duration::days(90));
        let window = list_documents_uploaded_since(&conn, since).unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].id, recent.id);

        let all = list_documents_uploaded_since(&conn, None).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn invoice_number_and_field_tuple_queries() {
        let conn = open_memory_database().unwrap();
        let mut doc = make_document("acme.pdf");
        doc.extracted.invoice_number = Some("INV-42".into());
        doc.extracted.total_amount = Some(1500.0);
        doc.extracted.invoice_date = NaiveDate::from_ymd_opt(2024, 5, 1);
        doc.extracted.supplier_name = Some("ACME CO".into());
        insert_document(&conn, &doc).unwrap();
        insert_document(&conn, &make_document("other.pdf")).unwrap();

        let by_invoice = get_documents_by_invoice_number(&conn, " INV-42 ").unwrap();
        assert_eq!(by_invoice.len(), 1);

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let by_tuple = get_documents_by_field_tuple(&conn, 1500.0, date, "acme co").unwrap();
        assert_eq!(by_tuple.len(), 1);
        assert_eq!(by_tuple[0].id, doc.id);

        let miss = get_documents_by_field_tuple(&conn, 1500.01, date, "ACME CO").unwrap();
        assert!(miss.is_empty());
    }

    #[test]
    fn workflow_update_rejects_stale_row_version() {
        let conn = open_memory_database().unwrap();
        let mut doc = make_document("bl.pdf");
        insert_document(&conn, &doc).unwrap();

        doc.status = WorkflowStatus::PendingReview;
        update_document_workflow(&conn, &doc, 0).unwrap();

        doc.status = WorkflowStatus::Approved;
        let stale = update_document_workflow(&conn, &doc, 0);
        assert!(matches!(stale, Err(DatabaseError::Conflict { expected: 0, .. })));

        let stored = get_document(&conn, &doc.id).unwrap().unwrap();
        assert_eq!(stored.status, WorkflowStatus::PendingReview);
        assert_eq!(stored.row_version, 1);
    }

    #[test]
    fn workflow_update_on_missing_row_is_not_found() {
        let conn = open_memory_database().unwrap();
        let doc = make_document("ghost.pdf");
        assert!(matches!(
            update_document_workflow(&conn, &doc, 0),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn version_chain_tracks_latest() {
        let conn = open_memory_database().unwrap();
        let root = make_document("costing.xlsx");
        insert_document(&conn, &root).unwrap();

        clear_latest_in_chain(&conn, &root.id).unwrap();
        let mut v2 = make_document("costing.xlsx");
        v2.parent_document_id = Some(root.id);
        v2.version = max_version_in_chain(&conn, &root.id).unwrap() + 1;
        insert_document(&conn, &v2).unwrap();

        let chain = get_version_chain(&conn, &root.id).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].version, 2);
        assert_eq!(chain.iter().filter(|d| d.is_latest_version).count(), 1);
        assert!(chain[1].is_latest_version);
    }

    #[test]
    fn history_sequence_starts_at_one() {
        let conn = open_memory_database().unwrap();
        let doc = make_document("inv.pdf");
        insert_document(&conn, &doc).unwrap();
        assert_eq!(next_history_seq(&conn, &doc.id).unwrap(), 1);

        let entry = WorkflowHistoryEntry {
            document_id: doc.id,
            seq: 1,
            from_status: WorkflowStatus::Draft,
            to_status: WorkflowStatus::PendingReview,
            action: WorkflowAction::StagedForReview,
            actor: "ops".into(),
            from_folder: None,
            to_folder: Some("Documents/New Documents".into()),
            reason: None,
            created_at: Utc::now(),
        };
        insert_history_entry(&conn, &entry).unwrap();
        assert_eq!(next_history_seq(&conn, &doc.id).unwrap(), 2);

        // Same position twice violates the unique key
        assert!(insert_history_entry(&conn, &entry).is_err());
        assert_eq!(get_workflow_history(&conn, &doc.id).unwrap(), vec![entry]);
    }

    #[test]
    fn audit_events_round_trip_with_details() {
        let conn = open_memory_database().unwrap();
        let event = AuditEvent::new("ops", "document_approved", "document:1")
            .with_details(serde_json::json!({ "to_folder": "Shipments/LOT 100" }));
        insert_audit_event(&conn, &event).unwrap();

        let events = query_audit_by_entity(&conn, "document:1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "document_approved");
        assert_eq!(events[0].details, event.details);
    }

    #[test]
    fn shipment_lookup_by_lot() {
        let conn = open_memory_database().unwrap();
        let shipment = Shipment {
            id: Uuid::new_v4(),
            lot_number: "100".into(),
            supplier_name: Some("ACME CO".into()),
            client_name: None,
            created_at: Utc::now(),
        };
        insert_shipment(&conn, &shipment).unwrap();

        assert_eq!(find_shipment_by_lot(&conn, " 100 ").unwrap(), Some(shipment));
        assert!(find_shipment_by_lot(&conn, "101").unwrap().is_none());
    }

    #[test]
    fn finalized_costing_rejects_updates() {
        let conn = open_memory_database().unwrap();
        let mut costing = FileCosting {
            id: Uuid::new_v4(),
            document_id: None,
            shipment_id: None,
            lot_number: Some("100".into()),
            transport_document_id: None,
            clearing_document_id: None,
            other_document_id: None,
            transport_subtotal: 10.0,
            clearing_subtotal: 20.0,
            other_subtotal: 5.0,
            grand_total: 35.0,
            status: CostingStatus::Finalized,
            created_by: "ops".into(),
            created_at: Utc::now(),
            finalized_by: Some("lead".into()),
            finalized_at: Some(Utc::now()),
        };
        insert_file_costing(&conn, &costing).unwrap();

        costing.grand_total = 99.0;
        assert!(matches!(
            update_file_costing(&conn, &costing),
            Err(DatabaseError::ConstraintViolation(_))
        ));
        let stored = get_file_costing(&conn, &costing.id).unwrap().unwrap();
        assert_eq!(stored.grand_total, 35.0);
    }
}

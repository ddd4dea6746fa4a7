//! Intake orchestrator: one call per incoming file, from any channel.
//!
//! Order of work: validate, detect format, classify, extract (costing sheets
//! only), check duplicates, store the blob, then insert and stage the
//! document in one transaction. A failed insert deletes the blob again.

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::config::{MAX_UPLOAD_BYTES, NEW_DOCUMENTS_FOLDER};
use crate::db::repository::{self, AuditEvent};
use crate::models::enums::DocumentCategory;
use crate::models::{Document, ExtractedFields, FileCosting, SessionContext};
use crate::pipeline::costing::{CostingExtractor, CostingFields};
use crate::workflow::costing::{audit_file_costing, file_costing_from_fields};
use crate::workflow::destination::suggest_destination;
use crate::workflow::machine::stage_for_review_within;

use super::blob::{blob_path_for, BlobStore};
use super::classify::classify_document;
use super::duplicate::{
    blocking_match, detect_duplicates, DuplicateCandidate, DuplicateMatch, DuplicateSettings,
};
use super::format::{detect_format, sanitize_filename, FormatDetection};
use super::IntakeError;

/// What the caller decided about known duplicates before uploading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "document_id", rename_all = "snake_case")]
pub enum DuplicateResolution {
    /// Upload alongside matches unless settings block exact duplicates.
    #[default]
    Auto,
    /// Upload alongside matches even when they are exact.
    KeepBoth,
    /// Add to the version chain of the given document.
    NewVersionOf(Uuid),
    /// New version that also supersedes the given document.
    Replace(Uuid),
}

impl DuplicateResolution {
    fn target(&self) -> Option<Uuid> {
        match self {
            Self::NewVersionOf(id) | Self::Replace(id) => Some(*id),
            Self::Auto | Self::KeepBoth => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeContext {
    pub session: SessionContext,
    pub resolution: DuplicateResolution,
    /// Fields already extracted upstream (chat parser, manual entry).
    pub extracted: Option<ExtractedFields>,
}

impl IntakeContext {
    pub fn new(session: SessionContext) -> Self {
        Self {
            session,
            resolution: DuplicateResolution::Auto,
            extracted: None,
        }
    }

    pub fn with_resolution(mut self, resolution: DuplicateResolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_extracted(mut self, extracted: ExtractedFields) -> Self {
        self.extracted = Some(extracted);
        self
    }
}

/// Intake outcome returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeResult {
    /// The persisted document, already staged for review.
    pub document: Document,
    pub format: FormatDetection,
    /// Advisory matches against existing documents, best first.
    pub duplicates: Vec<DuplicateMatch>,
    /// Draft costing created from a costing sheet.
    pub costing: Option<FileCosting>,
}

/// Ingest one file.
///
/// Returns the staged document, or an error explaining why nothing was
/// persisted. Duplicate lookups and the duplicate-check log are advisory;
/// a corrupt costing workbook is not.
pub fn intake(
    conn: &Connection,
    blobs: &dyn BlobStore,
    bytes: &[u8],
    file_name: &str,
    mime_type: Option<&str>,
    ctx: &IntakeContext,
) -> Result<IntakeResult, IntakeError> {
    let name = sanitize_filename(file_name);
    let actor = ctx.session.actor();

    tracing::info!(
        file = %name,
        size = bytes.len(),
        channel = %ctx.session.channel,
        "Starting document intake"
    );

    // Step 1: Size checks
    if bytes.is_empty() {
        return Err(IntakeError::EmptyFile);
    }
    let size = bytes.len() as u64;
    if size > MAX_UPLOAD_BYTES {
        return Err(IntakeError::FileTooLarge {
            size_mb: size as f64 / (1024.0 * 1024.0),
            max_mb: MAX_UPLOAD_BYTES / (1024 * 1024),
        });
    }

    // Step 2: Format detection and classification
    let format = detect_format(bytes, &name, mime_type);
    let classification = classify_document(&name, &format.mime_type);

    // Step 3: Costing extraction; a corrupt workbook stops here
    let costing_fields = match classification {
        Some(DocumentCategory::CostingSheet) => {
            Some(CostingExtractor::default().extract_workbook(bytes)?)
        }
        _ => None,
    };
    let extracted = combine_extracted(ctx.extracted.clone(), costing_fields.as_ref());

    // Step 4: Duplicate detection (advisory unless auto-blocking exact matches)
    let now = Utc::now();
    let settings = load_settings(conn);
    let candidate =
        DuplicateCandidate::from_bytes(&name, bytes, (!extracted.is_empty()).then_some(&extracted));
    let duplicates = detect_duplicates(conn, &candidate, &settings, now);
    let content_hash = candidate.content_hash;

    if ctx.resolution == DuplicateResolution::Auto {
        if let Some(blocking) = blocking_match(&duplicates, &settings) {
            record_check(conn, &name, &content_hash, &duplicates, actor);
            tracing::info!(
                file = %name,
                existing = %blocking.document_id,
                strategy = %blocking.strategy,
                "Intake blocked by exact duplicate"
            );
            return Err(IntakeError::DuplicateBlocked {
                existing_id: blocking.document_id,
                reason: blocking.reason.clone(),
            });
        }
    }

    // Step 5: Version target and shipment match
    let target = match ctx.resolution.target() {
        Some(id) => Some(
            repository::get_document(conn, &id)?.ok_or(IntakeError::TargetNotFound(id))?,
        ),
        None => None,
    };
    let shipment = match extracted.lot_number.as_deref() {
        Some(lot) => repository::find_shipment_by_lot(conn, lot)?,
        None => None,
    };

    // Step 6: Build the draft record
    let id = Uuid::new_v4();
    let storage_path = blob_path_for(&id, &name, now);
    let destination = suggest_destination(classification, &extracted);

    let mut doc = Document::new_draft(
        name.clone(),
        storage_path.clone(),
        format.mime_type.clone(),
        size,
        actor,
    );
    doc.id = id;
    doc.uploaded_at = now;
    doc.content_hash = Some(content_hash.clone());
    doc.classification = classification;
    doc.extracted = extracted;
    doc.folder_path = Some(NEW_DOCUMENTS_FOLDER.to_string());
    doc.matched_shipment_id = shipment.as_ref().map(|s| s.id);
    doc.needs_review = doc.matched_shipment_id.is_none();

    // Step 7: Blob first, then the row; undo the blob if the row fails
    blobs.put(&storage_path, bytes)?;
    let persisted = persist(
        conn,
        doc,
        target.as_ref(),
        matches!(ctx.resolution, DuplicateResolution::Replace(_)),
        costing_fields.as_ref(),
        &destination,
        &ctx.session,
    );
    let (document, costing) = match persisted {
        Ok(persisted) => persisted,
        Err(e) => {
            if let Err(cleanup) = blobs.delete(&storage_path) {
                tracing::warn!(
                    path = %storage_path,
                    error = %cleanup,
                    "Compensating blob delete failed, blob is orphaned"
                );
            }
            return Err(e);
        }
    };

    record_check(conn, &name, &content_hash, &duplicates, actor);

    tracing::info!(
        document_id = %document.id,
        file = %name,
        classification = ?document.classification,
        duplicates = duplicates.len(),
        needs_review = document.needs_review,
        destination = %destination,
        "Document intake complete"
    );

    Ok(IntakeResult {
        document,
        format,
        duplicates,
        costing,
    })
}

/// Costing-sheet values win; caller-supplied fields fill the gaps.
fn combine_extracted(
    supplied: Option<ExtractedFields>,
    costing: Option<&CostingFields>,
) -> ExtractedFields {
    match (costing, supplied) {
        (Some(fields), supplied) => {
            let mut extracted = fields.to_extracted();
            if let Some(supplied) = supplied {
                extracted.merge_missing(supplied);
            }
            extracted
        }
        (None, supplied) => supplied.unwrap_or_default(),
    }
}

fn load_settings(conn: &Connection) -> DuplicateSettings {
    repository::get_duplicate_settings(conn).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Could not load duplicate settings, using defaults");
        DuplicateSettings::default()
    })
}

fn record_check(
    conn: &Connection,
    name: &str,
    hash: &str,
    matches: &[DuplicateMatch],
    actor: &str,
) {
    if let Err(e) = repository::insert_duplicate_check(conn, name, hash, matches, actor) {
        tracing::warn!(file = %name, error = %e, "Failed to record duplicate check");
    }
}

/// Insert, link into a version chain, seed the costing and stage, atomically.
fn persist(
    conn: &Connection,
    mut doc: Document,
    target: Option<&Document>,
    replace: bool,
    costing_fields: Option<&CostingFields>,
    destination: &str,
    session: &SessionContext,
) -> Result<(Document, Option<FileCosting>), IntakeError> {
    let actor = session.actor();
    let tx = conn.unchecked_transaction()?;

    if let Some(target) = target {
        let root = target.chain_root();
        repository::clear_latest_in_chain(&tx, &root)?;
        doc.parent_document_id = Some(root);
        doc.version = repository::max_version_in_chain(&tx, &root)? + 1;
    }
    repository::insert_document(&tx, &doc)?;

    let uploaded = AuditEvent::new(actor, "document_uploaded", format!("document:{}", doc.id))
        .with_details(json!({
            "file_name": doc.name,
            "mime_type": doc.mime_type,
            "size_bytes": doc.size_bytes,
            "classification": doc.classification.map(|c| c.as_str()),
            "channel": session.channel.as_str(),
        }));
    repository::insert_audit_event(&tx, &uploaded)?;

    if let Some(target) = target {
        let action = if replace {
            repository::mark_replaced(&tx, &target.id, &doc.id)?;
            "document_replaced"
        } else {
            "document_version_uploaded"
        };
        let event = AuditEvent::new(actor, action, format!("document:{}", target.id))
            .with_details(json!({
                "new_document_id": doc.id.to_string(),
                "version": doc.version,
            }));
        repository::insert_audit_event(&tx, &event)?;
    }

    let costing = match costing_fields {
        Some(fields) => {
            let costing =
                file_costing_from_fields(fields, Some(doc.id), doc.matched_shipment_id, actor);
            repository::insert_file_costing(&tx, &costing)?;
            audit_file_costing(&tx, session, "file_costing_created", &costing)?;
            Some(costing)
        }
        None => None,
    };

    let staged = stage_for_review_within(&tx, &doc.id, destination, session)?;
    tx.commit()?;
    Ok((staged, costing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{IntakeChannel, MatchStrategy, WorkflowStatus};
    use crate::models::Shipment;
    use crate::pipeline::costing::{build_costing_sheet, generate_workbook, CostingInput};
    use crate::pipeline::intake::blob::{BlobError, MemoryBlobStore};

    fn ctx() -> IntakeContext {
        IntakeContext::new(SessionContext::new("ops@freight", IntakeChannel::Upload))
    }

    fn lot_100_workbook() -> Vec<u8> {
        let sheet = build_costing_sheet(&CostingInput {
            lot_number: "100".into(),
            supplier_name: "ACME CO".into(),
            client_name: "Beta Ltd".into(),
            fob_amount: Some(5000.0),
            roe_ours: Some(18.5),
            clearing: vec![("customs_duty".into(), 1000.0)],
            ocean_freight: Some(2000.0),
            ..Default::default()
        })
        .unwrap();
        generate_workbook(&[sheet], None).unwrap()
    }

    fn add_shipment(conn: &Connection, lot: &str) -> Shipment {
        let shipment = Shipment {
            id: Uuid::new_v4(),
            lot_number: lot.into(),
            supplier_name: None,
            client_name: None,
            created_at: Utc::now(),
        };
        repository::insert_shipment(conn, &shipment).unwrap();
        shipment
    }

    fn all_documents(conn: &Connection) -> Vec<Document> {
        repository::list_documents_uploaded_since(conn, None).unwrap()
    }

    struct RefusingBlobStore;

    impl BlobStore for RefusingBlobStore {
        fn put(&self, path: &str, _: &[u8]) -> Result<(), BlobError> {
            Err(BlobError::InvalidPath(path.to_string()))
        }
        fn get(&self, path: &str) -> Result<Vec<u8>, BlobError> {
            Err(BlobError::NotFound(path.to_string()))
        }
        fn delete(&self, path: &str) -> Result<(), BlobError> {
            Err(BlobError::NotFound(path.to_string()))
        }
    }

    #[test]
    fn lot_100_costing_sheet_with_known_shipment() {
        let conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        let shipment = add_shipment(&conn, "100");
        let bytes = lot_100_workbook();

        let result =
            intake(&conn, &blobs, &bytes, "LOT_100_FILE_COSTING.xlsx", None, &ctx()).unwrap();
        let doc = &result.document;

        assert!(result.format.is_spreadsheet());
        assert_eq!(doc.classification, Some(DocumentCategory::CostingSheet));
        assert_eq!(doc.extracted.lot_number.as_deref(), Some("100"));
        assert_eq!(doc.extracted.supplier_name.as_deref(), Some("ACME CO"));
        assert_eq!(doc.extracted.client_name.as_deref(), Some("Beta Ltd"));
        assert_eq!(doc.extracted.fob_amount, Some(5000.0));
        assert_eq!(doc.extracted.roe_ours, Some(18.5));
        assert_eq!(doc.matched_shipment_id, Some(shipment.id));
        assert!(!doc.needs_review);

        assert_eq!(doc.status, WorkflowStatus::PendingReview);
        assert!(doc.requires_approval);
        assert_eq!(doc.folder_path.as_deref(), Some(NEW_DOCUMENTS_FOLDER));
        assert_eq!(doc.destination_folder.as_deref(), Some("Shipments/LOT 100/Costing"));
        assert_eq!(repository::count_history_entries(&conn, &doc.id).unwrap(), 1);

        let costing = result.costing.as_ref().unwrap();
        assert_eq!(costing.document_id, Some(doc.id));
        assert_eq!(costing.shipment_id, Some(shipment.id));
        assert_eq!(costing.grand_total, 5000.0 * 18.5 + 1000.0 + 2000.0);

        assert_eq!(blobs.get(&doc.storage_path).unwrap(), bytes);
        assert_eq!(repository::get_document(&conn, &doc.id).unwrap().as_ref(), Some(doc));
        assert_eq!(repository::count_duplicate_checks(&conn).unwrap(), 1);
    }

    #[test]
    fn unknown_lot_needs_review() {
        let conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        add_shipment(&conn, "200");

        let result = intake(
            &conn,
            &blobs,
            &lot_100_workbook(),
            "LOT_100_FILE_COSTING.xlsx",
            None,
            &ctx(),
        )
        .unwrap();
        assert_eq!(result.document.matched_shipment_id, None);
        assert!(result.document.needs_review);
        assert_eq!(result.document.status, WorkflowStatus::PendingReview);
    }

    #[test]
    fn supplied_fields_route_shipping_documents() {
        let conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        let ctx = ctx().with_extracted(ExtractedFields {
            lot_number: Some("100".into()),
            ..Default::default()
        });

        let result = intake(
            &conn,
            &blobs,
            b"%PDF-1.7 bill",
            "BL_100.pdf",
            Some("application/pdf"),
            &ctx,
        )
        .unwrap();
        assert_eq!(result.document.classification, Some(DocumentCategory::BillOfLading));
        assert_eq!(
            result.document.destination_folder.as_deref(),
            Some("Shipments/LOT 100/Shipping Documents")
        );
        assert!(result.costing.is_none());
    }

    #[test]
    fn empty_and_corrupt_files_persist_nothing() {
        let conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();

        assert!(matches!(
            intake(&conn, &blobs, b"", "empty.pdf", None, &ctx()),
            Err(IntakeError::EmptyFile)
        ));
        assert!(matches!(
            intake(&conn, &blobs, b"PK\x03\x04not a workbook", "LOT_1_costing.xlsx", None, &ctx()),
            Err(IntakeError::Costing(_))
        ));
        assert!(blobs.is_empty());
        assert!(all_documents(&conn).is_empty());
    }

    #[test]
    fn failed_insert_deletes_the_blob() {
        let conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        conn.execute_batch("DROP TABLE audit_log").unwrap();

        let result = intake(&conn, &blobs, b"%PDF-1.7 invoice", "invoice_2024.pdf", None, &ctx());
        assert!(matches!(result, Err(IntakeError::Database(_))));
        assert!(blobs.is_empty());
        assert!(all_documents(&conn).is_empty());
    }

    #[test]
    fn failed_blob_write_creates_no_row() {
        let conn = open_memory_database().unwrap();
        let result =
            intake(&conn, &RefusingBlobStore, b"%PDF-1.7 invoice", "invoice.pdf", None, &ctx());
        assert!(matches!(result, Err(IntakeError::Blob(_))));
        assert!(all_documents(&conn).is_empty());
    }

    #[test]
    fn exact_duplicate_is_advisory_by_default() {
        let conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        let first = intake(&conn, &blobs, b"%PDF-1.7 same", "statement.pdf", None, &ctx()).unwrap();
        let second = intake(&conn, &blobs, b"%PDF-1.7 same", "renamed.pdf", None, &ctx()).unwrap();

        assert_eq!(second.duplicates.len(), 1);
        assert_eq!(second.duplicates[0].strategy, MatchStrategy::ContentHash);
        assert_eq!(second.duplicates[0].confidence, 1.0);
        assert_eq!(second.duplicates[0].document_id, first.document.id);
        assert_eq!(blobs.len(), 2);
    }

    #[test]
    fn auto_block_stops_exact_duplicates_unless_kept() {
        let conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        repository::set_duplicate_settings(
            &conn,
            &DuplicateSettings {
                auto_block_exact: true,
                ..Default::default()
            },
        )
        .unwrap();

        let first = intake(&conn, &blobs, b"%PDF-1.7 same", "statement.pdf", None, &ctx()).unwrap();
        let blocked = intake(&conn, &blobs, b"%PDF-1.7 same", "statement.pdf", None, &ctx());
        match blocked {
            Err(IntakeError::DuplicateBlocked { existing_id, .. }) => {
                assert_eq!(existing_id, first.document.id)
            }
            other => panic!("expected DuplicateBlocked, got {other:?}"),
        }
        assert_eq!(blobs.len(), 1);
        assert_eq!(repository::count_duplicate_checks(&conn).unwrap(), 2);

        let kept = ctx().with_resolution(DuplicateResolution::KeepBoth);
        let second = intake(&conn, &blobs, b"%PDF-1.7 same", "statement.pdf", None, &kept).unwrap();
        assert_ne!(second.document.id, first.document.id);
        assert_eq!(all_documents(&conn).len(), 2);
    }

    #[test]
    fn new_version_joins_the_chain() {
        let conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        let v1 = intake(&conn, &blobs, b"%PDF-1.7 v1", "packing_list.pdf", None, &ctx()).unwrap();

        let as_version = ctx().with_resolution(DuplicateResolution::NewVersionOf(v1.document.id));
        let v2 =
            intake(&conn, &blobs, b"%PDF-1.7 v2", "packing_list.pdf", None, &as_version).unwrap();
        assert_eq!(v2.document.version, 2);
        assert_eq!(v2.document.parent_document_id, Some(v1.document.id));

        let v3 =
            intake(&conn, &blobs, b"%PDF-1.7 v3", "packing_list.pdf", None, &as_version).unwrap();
        assert_eq!(v3.document.version, 3);

        let chain = repository::get_version_chain(&conn, &v1.document.id).unwrap();
        assert_eq!(chain.len(), 3);
        let latest: Vec<_> = chain.iter().filter(|d| d.is_latest_version).map(|d| d.id).collect();
        assert_eq!(latest, vec![v3.document.id]);

        let audit = repository::query_audit_by_entity(
            &conn,
            &format!("document:{}", v1.document.id),
        )
        .unwrap();
        assert_eq!(
            audit.iter().filter(|e| e.action == "document_version_uploaded").count(),
            2
        );
    }

    #[test]
    fn replace_marks_the_superseded_document() {
        let conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        let old = intake(&conn, &blobs, b"%PDF-1.7 old", "invoice_acme.pdf", None, &ctx()).unwrap();

        let replacing = ctx().with_resolution(DuplicateResolution::Replace(old.document.id));
        let new =
            intake(&conn, &blobs, b"%PDF-1.7 new", "invoice_acme.pdf", None, &replacing).unwrap();

        let stored_old = repository::get_document(&conn, &old.document.id).unwrap().unwrap();
        assert_eq!(stored_old.replaced_by, Some(new.document.id));
        assert!(!stored_old.is_latest_version);
        assert!(new.document.is_latest_version);

        let audit = repository::query_audit_by_entity(
            &conn,
            &format!("document:{}", old.document.id),
        )
        .unwrap();
        assert!(audit.iter().any(|e| e.action == "document_replaced"));
    }

    #[test]
    fn missing_version_target_fails_before_storing() {
        let conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        let ghost = Uuid::new_v4();
        let ctx = ctx().with_resolution(DuplicateResolution::NewVersionOf(ghost));

        let result = intake(&conn, &blobs, b"%PDF-1.7", "a.pdf", None, &ctx);
        assert!(matches!(result, Err(IntakeError::TargetNotFound(id)) if id == ghost));
        assert!(blobs.is_empty());
    }

    #[test]
    fn display_name_is_sanitized() {
        let conn = open_memory_database().unwrap();
        let blobs = MemoryBlobStore::new();
        let result =
            intake(&conn, &blobs, b"%PDF-1.7", "../../etc/invoice.pdf", None, &ctx()).unwrap();
        assert_eq!(result.document.name, "invoice.pdf");
        assert!(result.document.storage_path.starts_with("documents/"));
    }
}

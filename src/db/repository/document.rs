use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::*;

const DOCUMENT_COLUMNS: &str = "id, name, storage_path, mime_type, size_bytes, content_hash,
    classification, extracted_data, status, folder_path, destination_folder, uploaded_by,
    version, parent_document_id, is_latest_version, replaced_by, requires_approval,
    needs_review, matched_shipment_id, uploaded_at, approved_by, approved_at, rejected_by,
    rejected_at, rejection_reason, archived_at, row_version";

pub fn insert_document(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    let extracted = serde_json::to_string(&doc.extracted)?;
    conn.execute(
        "INSERT INTO documents (id, name, storage_path, mime_type, size_bytes, content_hash,
         classification, extracted_data, status, folder_path, destination_folder, uploaded_by,
         version, parent_document_id, is_latest_version, replaced_by, requires_approval,
         needs_review, matched_shipment_id, uploaded_at, approved_by, approved_at, rejected_by,
         rejected_at, rejection_reason, archived_at, row_version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                 ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)",
        params![
            doc.id.to_string(),
            doc.name,
            doc.storage_path,
            doc.mime_type,
            doc.size_bytes as i64,
            doc.content_hash,
            doc.classification.map(|c| c.as_str()),
            extracted,
            doc.status.as_str(),
            doc.folder_path,
            doc.destination_folder,
            doc.uploaded_by,
            doc.version,
            doc.parent_document_id.map(|id| id.to_string()),
            doc.is_latest_version as i32,
            doc.replaced_by.map(|id| id.to_string()),
            doc.requires_approval as i32,
            doc.needs_review as i32,
            doc.matched_shipment_id.map(|id| id.to_string()),
            doc.uploaded_at,
            doc.approved_by,
            doc.approved_at,
            doc.rejected_by,
            doc.rejected_at,
            doc.rejection_reason,
            doc.archived_at,
            doc.row_version,
        ],
    )?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], read_document_row)
        .optional()?;
    row.map(document_from_row).transpose()
}

/// Like [`get_document`] but a missing row is an error.
pub fn require_document(conn: &Connection, id: &Uuid) -> Result<Document, DatabaseError> {
    get_document(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "Document".into(),
        id: id.to_string(),
    })
}

/// Documents uploaded at or after `since`; every document when `since` is `None`.
pub fn list_documents_uploaded_since(
    conn: &Connection,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<Document>, DatabaseError> {
    match since {
        Some(since) => query_documents(
            conn,
            "WHERE uploaded_at >= ?1 ORDER BY uploaded_at DESC",
            params![since],
        ),
        None => query_documents(conn, "ORDER BY uploaded_at DESC", params![]),
    }
}

pub fn get_documents_by_hash(
    conn: &Connection,
    hash: &str,
) -> Result<Vec<Document>, DatabaseError> {
    query_documents(
        conn,
        "WHERE content_hash = ?1 ORDER BY uploaded_at DESC",
        params![hash],
    )
}

pub fn get_documents_by_invoice_number(
    conn: &Connection,
    invoice_number: &str,
) -> Result<Vec<Document>, DatabaseError> {
    query_documents(
        conn,
        "WHERE json_extract(extracted_data, '$.invoice_number') = ?1
         ORDER BY uploaded_at DESC",
        params![invoice_number.trim()],
    )
}

/// Documents whose extracted amount, invoice date and supplier all equal the given triple.
pub fn get_documents_by_field_tuple(
    conn: &Connection,
    total_amount: f64,
    invoice_date: NaiveDate,
    supplier_name: &str,
) -> Result<Vec<Document>, DatabaseError> {
    query_documents(
        conn,
        "WHERE json_extract(extracted_data, '$.invoice_date') = ?2
           AND LOWER(TRIM(json_extract(extracted_data, '$.supplier_name'))) = LOWER(TRIM(?3))
           AND ABS(json_extract(extracted_data, '$.total_amount') - ?1) < 0.005
         ORDER BY uploaded_at DESC",
        params![
            total_amount,
            invoice_date.format("%Y-%m-%d").to_string(),
            supplier_name
        ],
    )
}

/// Every document sharing `root` as its chain root, oldest version first.
pub fn get_version_chain(conn: &Connection, root: &Uuid) -> Result<Vec<Document>, DatabaseError> {
    query_documents(
        conn,
        "WHERE id = ?1 OR parent_document_id = ?1 ORDER BY version ASC",
        params![root.to_string()],
    )
}

/// Clear the latest-version flag across a chain before a new version is inserted.
pub fn clear_latest_in_chain(conn: &Connection, root: &Uuid) -> Result<usize, DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET is_latest_version = 0
         WHERE (id = ?1 OR parent_document_id = ?1) AND is_latest_version = 1",
        params![root.to_string()],
    )?;
    Ok(rows)
}

pub fn max_version_in_chain(conn: &Connection, root: &Uuid) -> Result<i64, DatabaseError> {
    let max = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM documents WHERE id = ?1 OR parent_document_id = ?1",
        params![root.to_string()],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(max)
}

/// Point a superseded document at its replacement.
pub fn mark_replaced(conn: &Connection, old_id: &Uuid, new_id: &Uuid) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET replaced_by = ?2, is_latest_version = 0 WHERE id = ?1",
        params![old_id.to_string(), new_id.to_string()],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Document".into(),
            id: old_id.to_string(),
        });
    }
    Ok(())
}

/// Persist the workflow-owned columns of `doc` if nobody else wrote the row since
/// it was read at `expected_row_version`. The stored row version is bumped by one.
pub fn update_document_workflow(
    conn: &Connection,
    doc: &Document,
    expected_row_version: i64,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET status = ?3, folder_path = ?4, destination_folder = ?5,
         requires_approval = ?6, approved_by = ?7, approved_at = ?8, rejected_by = ?9,
         rejected_at = ?10, rejection_reason = ?11, archived_at = ?12,
         row_version = row_version + 1
         WHERE id = ?1 AND row_version = ?2",
        params![
            doc.id.to_string(),
            expected_row_version,
            doc.status.as_str(),
            doc.folder_path,
            doc.destination_folder,
            doc.requires_approval as i32,
            doc.approved_by,
            doc.approved_at,
            doc.rejected_by,
            doc.rejected_at,
            doc.rejection_reason,
            doc.archived_at,
        ],
    )?;
    if rows == 1 {
        return Ok(());
    }

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM documents WHERE id = ?1)",
        params![doc.id.to_string()],
        |row| row.get(0),
    )?;
    if exists {
        Err(DatabaseError::Conflict {
            entity_type: "Document".into(),
            id: doc.id.to_string(),
            expected: expected_row_version,
        })
    } else {
        Err(DatabaseError::NotFound {
            entity_type: "Document".into(),
            id: doc.id.to_string(),
        })
    }
}

fn query_documents(
    conn: &Connection,
    clause: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Document>, DatabaseError> {
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents {clause}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, read_document_row)?;

    let mut docs = Vec::new();
    for row in rows {
        docs.push(document_from_row(row?)?);
    }
    Ok(docs)
}

// Internal row type for Document mapping
struct DocumentRow {
    id: String,
    name: String,
    storage_path: String,
    mime_type: String,
    size_bytes: i64,
    content_hash: Option<String>,
    classification: Option<String>,
    extracted_data: String,
    status: String,
    folder_path: Option<String>,
    destination_folder: Option<String>,
    uploaded_by: String,
    version: i64,
    parent_document_id: Option<String>,
    is_latest_version: i32,
    replaced_by: Option<String>,
    requires_approval: i32,
    needs_review: i32,
    matched_shipment_id: Option<String>,
    uploaded_at: DateTime<Utc>,
    approved_by: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    rejected_by: Option<String>,
    rejected_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    archived_at: Option<DateTime<Utc>>,
    row_version: i64,
}

fn read_document_row(row: &Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        name: row.get(1)?,
        storage_path: row.get(2)?,
        mime_type: row.get(3)?,
        size_bytes: row.get(4)?,
        content_hash: row.get(5)?,
        classification: row.get(6)?,
        extracted_data: row.get(7)?,
        status: row.get(8)?,
        folder_path: row.get(9)?,
        destination_folder: row.get(10)?,
        uploaded_by: row.get(11)?,
        version: row.get(12)?,
        parent_document_id: row.get(13)?,
        is_latest_version: row.get(14)?,
        replaced_by: row.get(15)?,
        requires_approval: row.get(16)?,
        needs_review: row.get(17)?,
        matched_shipment_id: row.get(18)?,
        uploaded_at: row.get(19)?,
        approved_by: row.get(20)?,
        approved_at: row.get(21)?,
        rejected_by: row.get(22)?,
        rejected_at: row.get(23)?,
        rejection_reason: row.get(24)?,
        archived_at: row.get(25)?,
        row_version: row.get(26)?,
    })
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

fn parse_optional_uuid(value: Option<String>) -> Result<Option<Uuid>, DatabaseError> {
    value.as_deref().map(parse_uuid).transpose()
}

fn document_from_row(row: DocumentRow) -> Result<Document, DatabaseError> {
    Ok(Document {
        id: parse_uuid(&row.id)?,
        name: row.name,
        storage_path: row.storage_path,
        mime_type: row.mime_type,
        size_bytes: row.size_bytes.max(0) as u64,
        content_hash: row.content_hash,
        classification: row
            .classification
            .as_deref()
            .map(DocumentCategory::from_str)
            .transpose()?,
        extracted: serde_json::from_str(&row.extracted_data)?,
        status: WorkflowStatus::from_str(&row.status)?,
        folder_path: row.folder_path,
        destination_folder: row.destination_folder,
        uploaded_by: row.uploaded_by,
        version: row.version,
        parent_document_id: parse_optional_uuid(row.parent_document_id)?,
        is_latest_version: row.is_latest_version != 0,
        replaced_by: parse_optional_uuid(row.replaced_by)?,
        requires_approval: row.requires_approval != 0,
        needs_review: row.needs_review != 0,
        matched_shipment_id: parse_optional_uuid(row.matched_shipment_id)?,
        uploaded_at: row.uploaded_at,
        approved_by: row.approved_by,
        approved_at: row.approved_at,
        rejected_by: row.rejected_by,
        rejected_at: row.rejected_at,
        rejection_reason: row.rejection_reason,
        archived_at: row.archived_at,
        row_version: row.row_version,
    })
}

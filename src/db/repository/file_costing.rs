use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::CostingStatus;
use crate::models::FileCosting;

use super::document::parse_uuid;

const FILE_COSTING_COLUMNS: &str = "id, document_id, shipment_id, lot_number,
    transport_document_id, clearing_document_id, other_document_id, transport_subtotal,
    clearing_subtotal, other_subtotal, grand_total, status, created_by, created_at,
    finalized_by, finalized_at";

pub fn insert_file_costing(conn: &Connection, costing: &FileCosting) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO file_costings (id, document_id, shipment_id, lot_number,
         transport_document_id, clearing_document_id, other_document_id, transport_subtotal,
         clearing_subtotal, other_subtotal, grand_total, status, created_by, created_at,
         finalized_by, finalized_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            costing.id.to_string(),
            costing.document_id.map(|id| id.to_string()),
            costing.shipment_id.map(|id| id.to_string()),
            costing.lot_number,
            costing.transport_document_id.map(|id| id.to_string()),
            costing.clearing_document_id.map(|id| id.to_string()),
            costing.other_document_id.map(|id| id.to_string()),
            costing.transport_subtotal,
            costing.clearing_subtotal,
            costing.other_subtotal,
            costing.grand_total,
            costing.status.as_str(),
            costing.created_by,
            costing.created_at,
            costing.finalized_by,
            costing.finalized_at,
        ],
    )?;
    Ok(())
}

pub fn get_file_costing(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<FileCosting>, DatabaseError> {
    let sql = format!("SELECT {FILE_COSTING_COLUMNS} FROM file_costings WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], read_file_costing_row)
        .optional()?;
    row.map(file_costing_from_row).transpose()
}

/// Write every mutable column of a costing that is not yet finalized.
///
/// Returns `ConstraintViolation` when the stored row is already finalized.
pub fn update_file_costing(conn: &Connection, costing: &FileCosting) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE file_costings SET shipment_id = ?2, lot_number = ?3, transport_document_id = ?4,
         clearing_document_id = ?5, other_document_id = ?6, transport_subtotal = ?7,
         clearing_subtotal = ?8, other_subtotal = ?9, grand_total = ?10, status = ?11,
         finalized_by = ?12, finalized_at = ?13
         WHERE id = ?1 AND status != 'finalized'",
        params![
            costing.id.to_string(),
            costing.shipment_id.map(|id| id.to_string()),
            costing.lot_number,
            costing.transport_document_id.map(|id| id.to_string()),
            costing.clearing_document_id.map(|id| id.to_string()),
            costing.other_document_id.map(|id| id.to_string()),
            costing.transport_subtotal,
            costing.clearing_subtotal,
            costing.other_subtotal,
            costing.grand_total,
            costing.status.as_str(),
            costing.finalized_by,
            costing.finalized_at,
        ],
    )?;
    if rows == 1 {
        return Ok(());
    }
    match get_file_costing(conn, &costing.id)? {
        Some(_) => Err(DatabaseError::ConstraintViolation(format!(
            "file costing {} is finalized",
            costing.id
        ))),
        None => Err(DatabaseError::NotFound {
            entity_type: "FileCosting".into(),
            id: costing.id.to_string(),
        }),
    }
}

struct FileCostingRow {
    id: String,
    document_id: Option<String>,
    shipment_id: Option<String>,
    lot_number: Option<String>,
    transport_document_id: Option<String>,
    clearing_document_id: Option<String>,
    other_document_id: Option<String>,
    transport_subtotal: f64,
    clearing_subtotal: f64,
    other_subtotal: f64,
    grand_total: f64,
    status: String,
    created_by: String,
    created_at: chrono::DateTime<chrono::Utc>,
    finalized_by: Option<String>,
    finalized_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn read_file_costing_row(row: &Row<'_>) -> rusqlite::Result<FileCostingRow> {
    Ok(FileCostingRow {
        id: row.get(0)?,
        document_id: row.get(1)?,
        shipment_id: row.get(2)?,
        lot_number: row.get(3)?,
        transport_document_id: row.get(4)?,
        clearing_document_id: row.get(5)?,
        other_document_id: row.get(6)?,
        transport_subtotal: row.get(7)?,
        clearing_subtotal: row.get(8)?,
        other_subtotal: row.get(9)?,
        grand_total: row.get(10)?,
        status: row.get(11)?,
        created_by: row.get(12)?,
        created_at: row.get(13)?,
        finalized_by: row.get(14)?,
        finalized_at: row.get(15)?,
    })
}

fn file_costing_from_row(row: FileCostingRow) -> Result<FileCosting, DatabaseError> {
    let opt = |value: Option<String>| value.as_deref().map(parse_uuid).transpose();
    Ok(FileCosting {
        id: parse_uuid(&row.id)?,
        document_id: opt(row.document_id)?,
        shipment_id: opt(row.shipment_id)?,
        lot_number: row.lot_number,
        transport_document_id: opt(row.transport_document_id)?,
        clearing_document_id: opt(row.clearing_document_id)?,
        other_document_id: opt(row.other_document_id)?,
        transport_subtotal: row.transport_subtotal,
        clearing_subtotal: row.clearing_subtotal,
        other_subtotal: row.other_subtotal,
        grand_total: row.grand_total,
        status: CostingStatus::from_str(&row.status)?,
        created_by: row.created_by,
        created_at: row.created_at,
        finalized_by: row.finalized_by,
        finalized_at: row.finalized_at,
    })
}

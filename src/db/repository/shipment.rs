use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::Shipment;

use super::document::parse_uuid;

pub fn insert_shipment(conn: &Connection, shipment: &Shipment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO shipments (id, lot_number, supplier_name, client_name, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            shipment.id.to_string(),
            shipment.lot_number,
            shipment.supplier_name,
            shipment.client_name,
            shipment.created_at,
        ],
    )?;
    Ok(())
}

/// Find the shipment for a lot number. Lot numbers are compared trimmed.
pub fn find_shipment_by_lot(
    conn: &Connection,
    lot_number: &str,
) -> Result<Option<Shipment>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, lot_number, supplier_name, client_name, created_at
             FROM shipments WHERE lot_number = ?1",
            params![lot_number.trim()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, chrono::DateTime<chrono::Utc>>(4)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, lot_number, supplier_name, client_name, created_at)| {
        Ok::<_, DatabaseError>(Shipment {
            id: parse_uuid(&id)?,
            lot_number,
            supplier_name,
            client_name,
            created_at,
        })
    })
    .transpose()
}

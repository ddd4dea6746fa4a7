use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::pipeline::intake::duplicate::DuplicateSettings;

/// Get the duplicate-detection settings (singleton row, id=1).
pub fn get_duplicate_settings(conn: &Connection) -> Result<DuplicateSettings, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT enabled, filename_threshold, auto_block_exact, check_invoice_numbers, lookback_days
         FROM duplicate_settings WHERE id = 1",
    )?;
    stmt.query_row([], |row| {
        let lookback: i64 = row.get(4)?;
        Ok(DuplicateSettings {
            enabled: row.get::<_, i32>(0)? != 0,
            filename_threshold: row.get(1)?,
            auto_block_exact: row.get::<_, i32>(2)? != 0,
            check_invoice_numbers: row.get::<_, i32>(3)? != 0,
            lookback_days: u32::try_from(lookback).ok().filter(|days| *days > 0),
        })
    })
    .map_err(DatabaseError::from)
}

pub fn set_duplicate_settings(
    conn: &Connection,
    settings: &DuplicateSettings,
) -> Result<(), DatabaseError> {
    if !(0.0..=1.0).contains(&settings.filename_threshold) {
        return Err(DatabaseError::ConstraintViolation(format!(
            "filename threshold {} outside [0, 1]",
            settings.filename_threshold
        )));
    }
    conn.execute(
        "UPDATE duplicate_settings SET
         enabled = ?1,
         filename_threshold = ?2,
         auto_block_exact = ?3,
         check_invoice_numbers = ?4,
         lookback_days = ?5
         WHERE id = 1",
        params![
            settings.enabled as i32,
            settings.filename_threshold,
            settings.auto_block_exact as i32,
            settings.check_invoice_numbers as i32,
            settings.lookback_days.unwrap_or(0),
        ],
    )?;
    Ok(())
}

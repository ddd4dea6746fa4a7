//! File costing lifecycle: `draft → pending_review → finalized`.
//!
//! A finalized costing is immutable; the repository refuses further writes.

use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use crate::db::repository::{self, AuditEvent};
use crate::db::DatabaseError;
use crate::models::enums::CostingStatus;
use crate::models::{FileCosting, SessionContext};
use crate::pipeline::costing::CostingFields;

use super::WorkflowError;

/// Seed a draft costing from extracted sheet fields.
pub fn file_costing_from_fields(
    fields: &CostingFields,
    document_id: Option<Uuid>,
    shipment_id: Option<Uuid>,
    created_by: &str,
) -> FileCosting {
    FileCosting {
        id: Uuid::new_v4(),
        document_id,
        shipment_id,
        lot_number: fields.lot_number.clone(),
        transport_document_id: None,
        clearing_document_id: None,
        other_document_id: None,
        transport_subtotal: fields.totals.transport_subtotal,
        clearing_subtotal: fields.totals.clearing_subtotal,
        other_subtotal: fields.totals.other_subtotal,
        grand_total: fields.totals.grand_total,
        status: CostingStatus::Draft,
        created_by: created_by.to_string(),
        created_at: Utc::now(),
        finalized_by: None,
        finalized_at: None,
    }
}

pub(crate) fn audit_file_costing(
    conn: &Connection,
    ctx: &SessionContext,
    action: &str,
    costing: &FileCosting,
) -> Result<(), DatabaseError> {
    let event = AuditEvent::new(ctx.actor(), action, format!("file_costing:{}", costing.id))
        .with_details(json!({
            "status": costing.status.as_str(),
            "lot_number": costing.lot_number,
            "grand_total": costing.grand_total,
            "document_id": costing.document_id.map(|id| id.to_string()),
        }));
    repository::insert_audit_event(conn, &event)
}

/// Persist a new draft costing for `fields`.
pub fn create_file_costing(
    conn: &Connection,
    fields: &CostingFields,
    document_id: Option<Uuid>,
    shipment_id: Option<Uuid>,
    ctx: &SessionContext,
) -> Result<FileCosting, WorkflowError> {
    let costing = file_costing_from_fields(fields, document_id, shipment_id, ctx.actor());

    let tx = conn.unchecked_transaction()?;
    repository::insert_file_costing(&tx, &costing)?;
    audit_file_costing(&tx, ctx, "file_costing_created", &costing)?;
    tx.commit()?;

    tracing::info!(
        costing_id = %costing.id,
        lot = ?costing.lot_number,
        grand_total = costing.grand_total,
        "File costing created"
    );
    Ok(costing)
}

fn advance(
    conn: &Connection,
    id: &Uuid,
    from: CostingStatus,
    to: CostingStatus,
    ctx: &SessionContext,
    audit_action: &str,
) -> Result<FileCosting, WorkflowError> {
    let tx = conn.unchecked_transaction()?;
    let mut costing =
        repository::get_file_costing(&tx, id)?.ok_or(WorkflowError::CostingNotFound(*id))?;
    if costing.status != from {
        return Err(WorkflowError::InvalidCostingTransition {
            id: *id,
            from: costing.status,
            to,
        });
    }

    costing.status = to;
    if to == CostingStatus::Finalized {
        costing.finalized_by = Some(ctx.actor().to_string());
        costing.finalized_at = Some(Utc::now());
    }
    repository::update_file_costing(&tx, &costing)?;
    audit_file_costing(&tx, ctx, audit_action, &costing)?;
    tx.commit()?;

    tracing::info!(
        costing_id = %id,
        from = %from,
        to = %to,
        actor = %ctx.actor(),
        "File costing transition"
    );
    Ok(costing)
}

/// `draft → pending_review`.
pub fn submit_file_costing(
    conn: &Connection,
    id: &Uuid,
    ctx: &SessionContext,
) -> Result<FileCosting, WorkflowError> {
    advance(
        conn,
        id,
        CostingStatus::Draft,
        CostingStatus::PendingReview,
        ctx,
        "file_costing_submitted",
    )
}

/// `pending_review → finalized`. Stamps the finalizer.
pub fn finalize_file_costing(
    conn: &Connection,
    id: &Uuid,
    ctx: &SessionContext,
) -> Result<FileCosting, WorkflowError> {
    advance(
        conn,
        id,
        CostingStatus::PendingReview,
        CostingStatus::Finalized,
        ctx,
        "file_costing_finalized",
    )
}

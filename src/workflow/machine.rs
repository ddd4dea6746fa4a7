use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use crate::db::repository::{self, AuditEvent};
use crate::models::enums::{WorkflowAction, WorkflowStatus};
use crate::models::{Document, SessionContext, WorkflowHistoryEntry};
use crate::notify::{Notification, Notifier};

use super::WorkflowError;

/// History-relevant outcome of a transition's mutation step.
struct Move {
    from_folder: Option<String>,
    to_folder: Option<String>,
    reason: Option<String>,
}

struct Transition {
    action: WorkflowAction,
    to: WorkflowStatus,
    allowed_from: &'static [WorkflowStatus],
    audit_action: &'static str,
}

const STAGE: Transition = Transition {
    action: WorkflowAction::StagedForReview,
    to: WorkflowStatus::PendingReview,
    allowed_from: &[WorkflowStatus::Draft],
    audit_action: "document_staged",
};

const APPROVE: Transition = Transition {
    action: WorkflowAction::Approved,
    to: WorkflowStatus::Approved,
    allowed_from: &[WorkflowStatus::Draft, WorkflowStatus::PendingReview],
    audit_action: "document_approved",
};

const REJECT: Transition = Transition {
    action: WorkflowAction::Rejected,
    to: WorkflowStatus::Rejected,
    allowed_from: &[WorkflowStatus::PendingReview],
    audit_action: "document_rejected",
};

const ARCHIVE: Transition = Transition {
    action: WorkflowAction::Archived,
    to: WorkflowStatus::Archived,
    allowed_from: &[WorkflowStatus::Approved],
    audit_action: "document_archived",
};

/// Read, check, mutate and persist one transition atomically.
fn apply<F>(
    conn: &Connection,
    id: &Uuid,
    ctx: &SessionContext,
    transition: &Transition,
    mutate: F,
) -> Result<Document, WorkflowError>
where
    F: FnOnce(&mut Document) -> Move,
{
    let tx = conn.unchecked_transaction()?;
    let (doc, from) = apply_within(&tx, id, ctx, transition, mutate)?;
    tx.commit()?;

    tracing::info!(
        document_id = %id,
        from = %from,
        to = %transition.to,
        actor = %ctx.actor(),
        "Workflow transition"
    );
    Ok(doc)
}

/// Transition body, run inside a transaction the caller owns.
///
/// The status check happens before any write; the update is a compare-and-swap
/// on `row_version`, so a concurrent writer makes this call fail with
/// `ConcurrentModification` and nothing is appended.
fn apply_within<F>(
    tx: &Connection,
    id: &Uuid,
    ctx: &SessionContext,
    transition: &Transition,
    mutate: F,
) -> Result<(Document, WorkflowStatus), WorkflowError>
where
    F: FnOnce(&mut Document) -> Move,
{
    let mut doc = repository::get_document(tx, id)?.ok_or(WorkflowError::NotFound(*id))?;
    let from = doc.status;
    if !transition.allowed_from.contains(&from) {
        return Err(WorkflowError::InvalidTransition {
            id: *id,
            from,
            action: transition.action,
        });
    }

    let expected = doc.row_version;
    let moved = mutate(&mut doc);
    doc.status = transition.to;
    repository::update_document_workflow(tx, &doc, expected)
        .map_err(|e| WorkflowError::from_document_write(*id, e))?;
    doc.row_version = expected + 1;

    let entry = WorkflowHistoryEntry {
        document_id: *id,
        seq: repository::next_history_seq(tx, id)?,
        from_status: from,
        to_status: transition.to,
        action: transition.action,
        actor: ctx.actor().to_string(),
        from_folder: moved.from_folder,
        to_folder: moved.to_folder,
        reason: moved.reason,
        created_at: Utc::now(),
    };
    repository::insert_history_entry(tx, &entry)?;

    let event = AuditEvent::new(ctx.actor(), transition.audit_action, format!("document:{id}"))
        .with_details(json!({
            "from_status": from.as_str(),
            "to_status": transition.to.as_str(),
            "from_folder": entry.from_folder,
            "to_folder": entry.to_folder,
            "reason": entry.reason,
            "channel": ctx.channel.as_str(),
        }));
    repository::insert_audit_event(tx, &event)?;

    Ok((doc, from))
}

/// Deliver a notification; failures are logged and swallowed.
fn send(notifier: &dyn Notifier, notification: Notification) {
    if let Err(e) = notifier.notify(&notification) {
        tracing::warn!(
            document_id = %notification.document_id,
            error = %e,
            "Notification failed"
        );
    }
}

/// `draft → pending_review`. Records the suggested destination and flags the
/// document as awaiting approval.
pub fn stage_for_review(
    conn: &Connection,
    id: &Uuid,
    destination_folder: &str,
    ctx: &SessionContext,
) -> Result<Document, WorkflowError> {
    apply(conn, id, ctx, &STAGE, staging(destination_folder))
}

/// [`stage_for_review`] inside a transaction the caller owns, so a new
/// upload is inserted and staged atomically.
pub(crate) fn stage_for_review_within(
    tx: &Connection,
    id: &Uuid,
    destination_folder: &str,
    ctx: &SessionContext,
) -> Result<Document, WorkflowError> {
    apply_within(tx, id, ctx, &STAGE, staging(destination_folder)).map(|(doc, _)| doc)
}

fn staging(destination_folder: &str) -> impl FnOnce(&mut Document) -> Move {
    let destination = destination_folder.trim().to_string();
    move |doc| {
        doc.requires_approval = true;
        doc.destination_folder = Some(destination.clone());
        Move {
            from_folder: doc.folder_path.clone(),
            to_folder: Some(destination),
            reason: None,
        }
    }
}

/// `pending_review | draft → approved`.
///
/// The document is filed to `destination_folder`, else its stored suggestion,
/// else the folder it is already in. Re-approving an approved or archived
/// document is an invalid transition and appends nothing.
pub fn approve(
    conn: &Connection,
    notifier: &dyn Notifier,
    id: &Uuid,
    destination_folder: Option<&str>,
    ctx: &SessionContext,
) -> Result<Document, WorkflowError> {
    let requested = destination_folder
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string);

    let doc = apply(conn, id, ctx, &APPROVE, |doc| {
        let target = requested
            .or_else(|| doc.destination_folder.clone())
            .or_else(|| doc.folder_path.clone());
        let from_folder = doc.folder_path.clone();

        doc.folder_path = target.clone();
        doc.destination_folder = target.clone();
        doc.requires_approval = false;
        doc.approved_by = Some(ctx.actor().to_string());
        doc.approved_at = Some(Utc::now());
        Move {
            from_folder,
            to_folder: target,
            reason: None,
        }
    })?;

    send(
        notifier,
        Notification::approved(&doc.uploaded_by, doc.id, &doc.name, doc.folder_path.as_deref()),
    );
    Ok(doc)
}

/// `pending_review → rejected`. An empty or blank reason is refused before
/// anything is read.
pub fn reject(
    conn: &Connection,
    notifier: &dyn Notifier,
    id: &Uuid,
    reason: &str,
    ctx: &SessionContext,
) -> Result<Document, WorkflowError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(WorkflowError::MissingReason);
    }

    let doc = apply(conn, id, ctx, &REJECT, |doc| {
        doc.requires_approval = false;
        doc.rejected_by = Some(ctx.actor().to_string());
        doc.rejected_at = Some(Utc::now());
        doc.rejection_reason = Some(reason.to_string());
        Move {
            from_folder: doc.folder_path.clone(),
            to_folder: None,
            reason: Some(reason.to_string()),
        }
    })?;

    send(
        notifier,
        Notification::rejected(&doc.uploaded_by, doc.id, &doc.name, reason),
    );
    Ok(doc)
}

/// `approved → archived`. Terminal; the document stays where it was filed.
pub fn archive(
    conn: &Connection,
    id: &Uuid,
    ctx: &SessionContext,
) -> Result<Document, WorkflowError> {
    apply(conn, id, ctx, &ARCHIVE, |doc| {
        doc.archived_at = Some(Utc::now());
        Move {
            from_folder: doc.folder_path.clone(),
            to_folder: doc.folder_path.clone(),
            reason: None,
        }
    })
}

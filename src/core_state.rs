//! Async entry points over the blocking pipeline.
//!
//! `IntakeService` is shared behind `Arc` by every transport that feeds
//! documents in (upload UI, chat webhooks, batch jobs). Each call opens its
//! own connection on a blocking thread, so the database stays the single
//! source of truth and no mutable state lives in the service.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::config;
use crate::db::{self, DatabaseError};
use crate::models::{Document, SessionContext};
use crate::notify::{LogNotifier, Notifier};
use crate::pipeline::costing::{self, CellValue, CostingError, CostingStructure, FormatMetadata};
use crate::pipeline::intake::{
    self, BlobStore, FsBlobStore, IntakeContext, IntakeError, IntakeResult,
};
use crate::workflow::{self, BulkApproveReport, WorkflowError};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Background task failed: {0}")]
    Task(String),
}

// ═══════════════════════════════════════════════════════════
// IntakeService
// ═══════════════════════════════════════════════════════════

pub struct IntakeService {
    db_path: PathBuf,
    blobs: Arc<dyn BlobStore>,
    notifier: Arc<dyn Notifier>,
}

impl IntakeService {
    pub fn new(
        db_path: impl Into<PathBuf>,
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            blobs,
            notifier,
        }
    }

    /// Database and blobs under `data_dir` (normally [`config::app_data_dir`]);
    /// notifications go to the log.
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(
            config::database_path(data_dir),
            Arc::new(FsBlobStore::new(config::blobs_dir(data_dir))),
            Arc::new(LogNotifier),
        )
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Open a migrated connection, creating the data directory if needed.
    pub fn open_db(&self) -> Result<Connection, CoreError> {
        open_at(&self.db_path)
    }

    /// Run `work` on a blocking thread with a fresh connection.
    async fn with_connection<T, F>(&self, work: F) -> Result<T, CoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, CoreError> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open_at(&path)?;
            work(&conn)
        })
        .await
        .map_err(|e| CoreError::Task(e.to_string()))?
    }

    pub async fn intake(
        &self,
        bytes: Vec<u8>,
        file_name: String,
        mime_type: Option<String>,
        ctx: IntakeContext,
    ) -> Result<IntakeResult, CoreError> {
        let blobs = Arc::clone(&self.blobs);
        self.with_connection(move |conn| {
            Ok(intake::intake(
                conn,
                blobs.as_ref(),
                &bytes,
                &file_name,
                mime_type.as_deref(),
                &ctx,
            )?)
        })
        .await
    }

    pub async fn stage_for_review(
        &self,
        id: Uuid,
        destination_folder: String,
        session: SessionContext,
    ) -> Result<Document, CoreError> {
        self.with_connection(move |conn| {
            Ok(workflow::stage_for_review(conn, &id, &destination_folder, &session)?)
        })
        .await
    }

    pub async fn approve(
        &self,
        id: Uuid,
        destination_folder: Option<String>,
        session: SessionContext,
    ) -> Result<Document, CoreError> {
        let notifier = Arc::clone(&self.notifier);
        self.with_connection(move |conn| {
            Ok(workflow::approve(
                conn,
                notifier.as_ref(),
                &id,
                destination_folder.as_deref(),
                &session,
            )?)
        })
        .await
    }

    pub async fn reject(
        &self,
        id: Uuid,
        reason: String,
        session: SessionContext,
    ) -> Result<Document, CoreError> {
        let notifier = Arc::clone(&self.notifier);
        self.with_connection(move |conn| {
            Ok(workflow::reject(conn, notifier.as_ref(), &id, &reason, &session)?)
        })
        .await
    }

    pub async fn archive(&self, id: Uuid, session: SessionContext) -> Result<Document, CoreError> {
        self.with_connection(move |conn| Ok(workflow::archive(conn, &id, &session)?))
            .await
    }

    /// Per-item failures land in the report; only a connection or task
    /// failure fails the whole call.
    pub async fn bulk_approve(
        &self,
        ids: Vec<Uuid>,
        destination_folder: Option<String>,
        session: SessionContext,
    ) -> Result<BulkApproveReport, CoreError> {
        let notifier = Arc::clone(&self.notifier);
        self.with_connection(move |conn| {
            Ok(workflow::bulk_approve(
                conn,
                notifier.as_ref(),
                &ids,
                destination_folder.as_deref(),
                &session,
            ))
        })
        .await
    }
}

fn open_at(path: &Path) -> Result<Connection, CoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(db::open_database(path)?)
}

// ═══════════════════════════════════════════════════════════
// Workbook codec off the async runtime
// ═══════════════════════════════════════════════════════════

pub async fn parse_workbook(
    bytes: Vec<u8>,
) -> Result<(Vec<CostingStructure>, FormatMetadata), CostingError> {
    tokio::task::spawn_blocking(move || costing::parse_workbook(&bytes))
        .await
        .map_err(|e| CostingError::Task(e.to_string()))?
}

pub async fn generate_workbook(
    structures: Vec<CostingStructure>,
    substitutions: Option<HashMap<String, CellValue>>,
) -> Result<Vec<u8>, CostingError> {
    tokio::task::spawn_blocking(move || {
        costing::generate_workbook(&structures, substitutions.as_ref())
    })
    .await
    .map_err(|e| CostingError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{IntakeChannel, WorkflowStatus};
    use crate::notify::OutboxNotifier;
    use crate::pipeline::costing::{build_costing_sheet, CostingInput};
    use crate::pipeline::intake::MemoryBlobStore;

    fn session() -> SessionContext {
        SessionContext::new("ops@freight", IntakeChannel::Chat).with_token("tok-1")
    }

    fn service(dir: &Path) -> (IntakeService, Arc<MemoryBlobStore>, Arc<OutboxNotifier>) {
        let blobs = Arc::new(MemoryBlobStore::new());
        let outbox = Arc::new(OutboxNotifier::new());
        let service = IntakeService::new(
            dir.join("data").join("freightdesk.db"),
            blobs.clone(),
            outbox.clone(),
        );
        (service, blobs, outbox)
    }

    #[tokio::test]
    async fn intake_then_approve_through_the_service() {
        let dir = tempfile::tempdir().unwrap();
        let (service, blobs, outbox) = service(dir.path());

        let result = service
            .intake(
                b"%PDF-1.7 invoice".to_vec(),
                "invoice_acme.pdf".into(),
                None,
                IntakeContext::new(session()),
            )
            .await
            .unwrap();
        assert_eq!(result.document.status, WorkflowStatus::PendingReview);
        assert_eq!(blobs.len(), 1);
        assert!(service.db_path().exists());

        let approved = service
            .approve(result.document.id, Some("Finance/Statements".into()), session())
            .await
            .unwrap();
        assert_eq!(approved.folder_path.as_deref(), Some("Finance/Statements"));
        assert_eq!(outbox.len(), 1);

        let archived = service.archive(result.document.id, session()).await.unwrap();
        assert_eq!(archived.status, WorkflowStatus::Archived);
    }

    #[tokio::test]
    async fn data_dir_service_stores_blobs_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let service = IntakeService::in_data_dir(dir.path());

        let result = service
            .intake(
                b"%PDF-1.7 bl".to_vec(),
                "bl_100.pdf".into(),
                None,
                IntakeContext::new(session()),
            )
            .await
            .unwrap();

        assert_eq!(service.db_path(), config::database_path(dir.path()).as_path());
        let stored = config::blobs_dir(dir.path()).join(&result.document.storage_path);
        assert_eq!(std::fs::read(stored).unwrap(), b"%PDF-1.7 bl");

        let approved = service.approve(result.document.id, None, session()).await.unwrap();
        assert_eq!(approved.status, WorkflowStatus::Approved);
    }

    #[tokio::test]
    async fn workflow_errors_surface_through_the_service() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _, _) = service(dir.path());

        let result = service
            .intake(b"%PDF-1.7".to_vec(), "bl_7.pdf".into(), None, IntakeContext::new(session()))
            .await
            .unwrap();

        let missing_reason = service.reject(result.document.id, " ".into(), session()).await;
        assert!(matches!(missing_reason, Err(CoreError::Workflow(WorkflowError::MissingReason))));

        let restage = service
            .stage_for_review(result.document.id, "Elsewhere".into(), session())
            .await;
        assert!(matches!(
            restage,
            Err(CoreError::Workflow(WorkflowError::InvalidTransition { .. }))
        ));

        let empty = service
            .intake(Vec::new(), "empty.pdf".into(), None, IntakeContext::new(session()))
            .await;
        assert!(matches!(empty, Err(CoreError::Intake(IntakeError::EmptyFile))));
    }

    #[tokio::test]
    async fn bulk_approve_reports_per_item() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _, outbox) = service(dir.path());

        let mut ids = Vec::new();
        for i in 0..3 {
            let result = service
                .intake(
                    format!("%PDF-1.7 {i}").into_bytes(),
                    format!("packing_{i}.pdf"),
                    None,
                    IntakeContext::new(session()),
                )
                .await
                .unwrap();
            ids.push(result.document.id);
        }
        ids.push(Uuid::new_v4());

        let report = service.bulk_approve(ids, None, session()).await.unwrap();
        assert_eq!(report.success_count(), 3);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(outbox.len(), 3);
    }

    #[tokio::test]
    async fn workbook_codec_runs_off_the_runtime() {
        let sheet = build_costing_sheet(&CostingInput {
            lot_number: "42".into(),
            supplier_name: "ACME CO".into(),
            client_name: "Beta Ltd".into(),
            fob_amount: Some(100.0),
            ..Default::default()
        })
        .unwrap();

        let bytes = generate_workbook(vec![sheet.clone()], None).await.unwrap();
        let (parsed, metadata) = parse_workbook(bytes).await.unwrap();
        assert_eq!(parsed, vec![sheet]);
        assert_eq!(metadata.sheet_count, 1);

        assert!(matches!(parse_workbook(b"junk".to_vec()).await, Err(CostingError::Corrupt(_))));
    }
}

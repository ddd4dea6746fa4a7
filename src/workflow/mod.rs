//! Document review workflow.
//!
//! `draft → pending_review → {approved, rejected}`, `approved → archived`.
//! Every transition is one SQLite transaction: compare-and-swap on the
//! document's `row_version`, one `workflow_history` insert, one audit event.
//! Notifications go out only after commit.

pub mod bulk;
pub mod costing;
pub mod destination;
pub mod machine;

pub use bulk::*;
pub use costing::*;
pub use destination::*;
pub use machine::*;

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{CostingStatus, WorkflowAction, WorkflowStatus};

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Document not found: {0}")]
    NotFound(Uuid),

    #[error("Cannot apply '{action}' to document {id} in status '{from}'")]
    InvalidTransition {
        id: Uuid,
        from: WorkflowStatus,
        action: WorkflowAction,
    },

    #[error("A non-empty reason is required to reject a document")]
    MissingReason,

    #[error("Document {0} was changed by someone else; reload and retry")]
    ConcurrentModification(Uuid),

    #[error("File costing not found: {0}")]
    CostingNotFound(Uuid),

    #[error("File costing {id} cannot move from '{from}' to '{to}'")]
    InvalidCostingTransition {
        id: Uuid,
        from: CostingStatus,
        to: CostingStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl WorkflowError {
    /// Map a document write failure, surfacing conflicts and missing rows by id.
    ///
    /// A WAL reader whose snapshot went stale before its first write gets
    /// `SQLITE_BUSY_SNAPSHOT`; that is the same lost race as a row-version miss.
    pub(crate) fn from_document_write(id: Uuid, err: DatabaseError) -> Self {
        match err {
            DatabaseError::Conflict { .. } => WorkflowError::ConcurrentModification(id),
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_BUSY_SNAPSHOT =>
            {
                WorkflowError::ConcurrentModification(id)
            }
            DatabaseError::NotFound { .. } => WorkflowError::NotFound(id),
            other => WorkflowError::Database(other),
        }
    }
}

impl From<rusqlite::Error> for WorkflowError {
    fn from(err: rusqlite::Error) -> Self {
        WorkflowError::Database(DatabaseError::from(err))
    }
}

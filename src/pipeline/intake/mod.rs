pub mod blob;
pub mod classify;
pub mod duplicate;
pub mod format;
pub mod hash;
pub mod orchestrator;
pub mod similarity;

pub use blob::*;
pub use classify::*;
pub use duplicate::*;
pub use format::*;
pub use hash::*;
pub use orchestrator::*;
pub use similarity::*;

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::pipeline::costing::CostingError;
use crate::workflow::WorkflowError;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("File is empty")]
    EmptyFile,

    #[error("File too large: {size_mb:.1}MB exceeds {max_mb}MB limit")]
    FileTooLarge { size_mb: f64, max_mb: u64 },

    #[error("Duplicate of existing document {existing_id}: {reason}")]
    DuplicateBlocked { existing_id: Uuid, reason: String },

    #[error("Document to version or replace not found: {0}")]
    TargetNotFound(Uuid),

    #[error("Costing sheet could not be read: {0}")]
    Costing(#[from] CostingError),

    #[error("Blob storage error: {0}")]
    Blob(#[from] BlobError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}

impl From<rusqlite::Error> for IntakeError {
    fn from(err: rusqlite::Error) -> Self {
        IntakeError::Database(DatabaseError::from(err))
    }
}

pub mod structure;
pub mod codec;
pub mod locator;
pub mod extractor;
pub mod template;

pub use structure::*;
pub use codec::*;
pub use locator::*;
pub use extractor::*;
pub use template::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CostingError {
    #[error("Workbook is missing or corrupt: {0}")]
    Corrupt(String),

    #[error("Invalid costing structure: {0}")]
    InvalidStructure(String),

    #[error("Workbook write failed: {0}")]
    Write(String),

    #[error("Workbook task failed: {0}")]
    Task(String),
}

pub mod document;
pub mod enums;
pub mod extracted;
pub mod file_costing;
pub mod history;
pub mod session;

pub use document::Document;
pub use enums::*;
pub use extracted::ExtractedFields;
pub use file_costing::{FileCosting, Shipment};
pub use history::WorkflowHistoryEntry;
pub use session::SessionContext;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::CostingStatus;

/// Cost breakdown for one shipment lot, downstream of costing-sheet extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCosting {
    pub id: Uuid,
    /// The costing sheet this record was extracted from, if any.
    pub document_id: Option<Uuid>,
    pub shipment_id: Option<Uuid>,
    pub lot_number: Option<String>,
    pub transport_document_id: Option<Uuid>,
    pub clearing_document_id: Option<Uuid>,
    pub other_document_id: Option<Uuid>,
    pub transport_subtotal: f64,
    pub clearing_subtotal: f64,
    pub other_subtotal: f64,
    pub grand_total: f64,
    pub status: CostingStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub finalized_by: Option<String>,
    pub finalized_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: Uuid,
    pub lot_number: String,
    pub supplier_name: Option<String>,
    pub client_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

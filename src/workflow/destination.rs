use crate::config::NEW_DOCUMENTS_FOLDER;
use crate::models::enums::DocumentCategory;
use crate::models::ExtractedFields;

/// Propose a destination folder from a document's classification and
/// extracted fields. Never touches storage.
///
/// Falls back to the generic new-documents folder when the classification is
/// missing or the field the route depends on was not extracted.
pub fn suggest_destination(
    classification: Option<DocumentCategory>,
    extracted: &ExtractedFields,
) -> String {
    let supplier = extracted.supplier_name.as_deref().and_then(folder_segment);
    let lot = extracted.lot_number.as_deref().and_then(folder_segment);

    let suggestion = match (classification, supplier, lot) {
        (Some(DocumentCategory::SupplierInvoice), Some(supplier), _) => {
            Some(format!("Suppliers/{supplier}/Statements"))
        }
        (Some(DocumentCategory::BillOfLading | DocumentCategory::PackingList), _, Some(lot)) => {
            Some(format!("Shipments/LOT {lot}/Shipping Documents"))
        }
        (Some(DocumentCategory::CostingSheet), _, Some(lot)) => {
            Some(format!("Shipments/LOT {lot}/Costing"))
        }
        _ => None,
    };
    suggestion.unwrap_or_else(|| NEW_DOCUMENTS_FOLDER.to_string())
}

// One path segment: no separators, no surrounding whitespace
fn folder_segment(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '-' } else { c })
        .filter(|c| !c.is_control())
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim().to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

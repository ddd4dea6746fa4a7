use crate::models::enums::DocumentCategory;

use super::format::XLSX_MIME;

/// Classify a document from its filename and detected MIME type.
///
/// Returns `None` when nothing in the name identifies the document; routing
/// then falls back to the generic intake folder.
pub fn classify_document(file_name: &str, mime_type: &str) -> Option<DocumentCategory> {
    let lower = file_name.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let has = |word: &str| tokens.iter().any(|t| *t == word);

    if mime_type == XLSX_MIME && lower.contains("costing") {
        return Some(DocumentCategory::CostingSheet);
    }
    if lower.contains("bill of lading")
        || lower.contains("bill_of_lading")
        || lower.contains("b/l")
        || has("bl")
        || has("bol")
    {
        return Some(DocumentCategory::BillOfLading);
    }
    if lower.contains("packing") {
        return Some(DocumentCategory::PackingList);
    }
    if lower.contains("invoice") || has("inv") {
        return Some(DocumentCategory::SupplierInvoice);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn costing_workbook() {
        assert_eq!(
            classify_document("LOT_100_FILE_COSTING.xlsx", XLSX_MIME),
            Some(DocumentCategory::CostingSheet)
        );
    }

    #[test]
    fn costing_name_without_workbook_is_not_costing() {
        assert_eq!(classify_document("costing notes.pdf", "application/pdf"), None);
    }

    #[test]
    fn bill_of_lading_variants() {
        for name in ["BL_MSKU123.pdf", "Bill of Lading 100.pdf", "lot-100-bol.pdf"] {
            assert_eq!(
                classify_document(name, "application/pdf"),
                Some(DocumentCategory::BillOfLading),
                "{name}"
            );
        }
    }

    #[test]
    fn bl_inside_a_word_is_not_a_bill_of_lading() {
        assert_eq!(classify_document("table.pdf", "application/pdf"), None);
    }

    #[test]
    fn invoices_and_packing_lists() {
        assert_eq!(
            classify_document("ACME invoice 2024.pdf", "application/pdf"),
            Some(DocumentCategory::SupplierInvoice)
        );
        assert_eq!(
            classify_document("INV-0042.pdf", "application/pdf"),
            Some(DocumentCategory::SupplierInvoice)
        );
        assert_eq!(
            classify_document("packing_list.pdf", "application/pdf"),
            Some(DocumentCategory::PackingList)
        );
    }
}

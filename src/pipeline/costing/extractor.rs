//! Costing field extraction.
//!
//! Locators supply raw fields; totals are always recomputed here from the
//! line items instead of being read from the sheet's cached formula results.

use serde::{Deserialize, Serialize};

use crate::models::ExtractedFields;

use super::codec::parse_workbook;
use super::locator::{CoordinateLocator, CostLine, FieldLocator, LabelScanLocator, LocatedFields};
use super::structure::CostingStructure;
use super::CostingError;

/// Business fields of one costing sheet plus derived totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostingFields {
    pub sheet_name: String,
    pub lot_number: Option<String>,
    pub supplier_name: Option<String>,
    pub client_name: Option<String>,
    pub fob_amount: Option<f64>,
    pub roe_ours: Option<f64>,
    pub roe_client: Option<f64>,
    pub clearing: Vec<CostLine>,
    pub carrier: Option<String>,
    pub ocean_freight: Option<f64>,
    pub transport: Option<f64>,
    pub bank_charges: Option<f64>,
    pub fx_commission: Option<f64>,
    pub totals: CostingTotals,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostingTotals {
    /// FOB converted at our rate; FOB itself when no rate was found.
    pub fob_local: f64,
    pub clearing_subtotal: f64,
    /// Ocean freight plus inland transport.
    pub transport_subtotal: f64,
    /// Bank charges plus FX commission.
    pub other_subtotal: f64,
    pub grand_total: f64,
}

fn sum(values: impl IntoIterator<Item = Option<f64>>) -> f64 {
    values.into_iter().flatten().sum()
}

impl CostingTotals {
    /// Missing amounts count as zero in the sums only.
    pub fn compute(fields: &CostingFields) -> Self {
        let fob_local = match (fields.fob_amount, fields.roe_ours) {
            (Some(fob), Some(rate)) => fob * rate,
            (Some(fob), None) => fob,
            (None, _) => 0.0,
        };
        let clearing_subtotal = sum(fields.clearing.iter().map(|line| line.amount));
        let transport_subtotal = sum([fields.ocean_freight, fields.transport]);
        let other_subtotal = sum([fields.bank_charges, fields.fx_commission]);
        Self {
            fob_local,
            clearing_subtotal,
            transport_subtotal,
            other_subtotal,
            grand_total: fob_local + clearing_subtotal + transport_subtotal + other_subtotal,
        }
    }
}

impl CostingFields {
    /// The stable keys stored on the document record.
    pub fn to_extracted(&self) -> ExtractedFields {
        let mut extracted = ExtractedFields {
            lot_number: self.lot_number.clone(),
            supplier_name: self.supplier_name.clone(),
            client_name: self.client_name.clone(),
            fob_amount: self.fob_amount,
            roe_ours: self.roe_ours,
            roe_client: self.roe_client,
            total_amount: Some(self.totals.grand_total),
            ..Default::default()
        };
        for line in &self.clearing {
            if let Some(amount) = line.amount {
                extracted.insert_other(line.key.clone(), amount);
            }
        }
        if let Some(carrier) = &self.carrier {
            extracted.insert_other("carrier", carrier.clone());
        }
        for (key, value) in [
            ("ocean_freight", self.ocean_freight),
            ("transport", self.transport),
            ("bank_charges", self.bank_charges),
            ("fx_commission", self.fx_commission),
        ] {
            if let Some(value) = value {
                extracted.insert_other(key, value);
            }
        }
        extracted.insert_other("clearing_subtotal", self.totals.clearing_subtotal);
        extracted.insert_other("transport_subtotal", self.totals.transport_subtotal);
        extracted.insert_other("other_subtotal", self.totals.other_subtotal);
        extracted
    }
}

/// Runs locators in priority order over a sheet.
pub struct CostingExtractor {
    locators: Vec<Box<dyn FieldLocator>>,
}

impl Default for CostingExtractor {
    fn default() -> Self {
        Self::new(vec![
            Box::new(CoordinateLocator::default()),
            Box::new(LabelScanLocator),
        ])
    }
}

impl CostingExtractor {
    pub fn new(locators: Vec<Box<dyn FieldLocator>>) -> Self {
        Self { locators }
    }

    pub fn extract_sheet(&self, sheet: &CostingStructure) -> CostingFields {
        let mut located = LocatedFields::default();
        for locator in &self.locators {
            located.merge_missing(locator.locate(sheet));
        }

        let mut fields = CostingFields {
            sheet_name: sheet.name.clone(),
            lot_number: located.lot_number,
            supplier_name: located.supplier_name,
            client_name: located.client_name,
            fob_amount: located.fob_amount,
            roe_ours: located.roe_ours,
            roe_client: located.roe_client,
            clearing: located.clearing,
            carrier: located.carrier,
            ocean_freight: located.ocean_freight,
            transport: located.transport,
            bank_charges: located.bank_charges,
            fx_commission: located.fx_commission,
            totals: CostingTotals::default(),
        };
        fields.totals = CostingTotals::compute(&fields);
        fields
    }

    /// Parse workbook bytes and extract from the first sheet. A corrupt
    /// workbook fails; missing fields do not.
    pub fn extract_workbook(&self, bytes: &[u8]) -> Result<CostingFields, CostingError> {
        let (structures, _) = parse_workbook(bytes)?;
        let sheet = structures
            .first()
            .ok_or_else(|| CostingError::Corrupt("workbook has no worksheets".into()))?;
        let fields = self.extract_sheet(sheet);
        tracing::debug!(
            sheet = %fields.sheet_name,
            lot = ?fields.lot_number,
            grand_total = fields.totals.grand_total,
            "Costing fields extracted"
        );
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::costing::codec::generate_workbook;
    use crate::pipeline::costing::structure::{CellFormat, CellValue};
    use crate::pipeline::costing::template::{build_costing_sheet, CostingInput};

    fn lot_100_input() -> CostingInput {
        CostingInput {
            lot_number: "100".into(),
            supplier_name: "ACME CO".into(),
            client_name: "Beta Ltd".into(),
            fob_amount: Some(5000.0),
            roe_ours: Some(18.5),
            roe_client: Some(18.9),
            clearing: vec![("customs_duty".into(), 1200.0), ("vat".into(), 900.0)],
            carrier: Some("MAERSK".into()),
            ocean_freight: Some(3000.0),
            transport: Some(800.0),
            bank_charges: Some(150.0),
            fx_commission: None,
        }
    }

    #[test]
    fn lot_100_example_end_to_end_through_workbook_bytes() {
        let sheet = build_costing_sheet(&lot_100_input()).unwrap();
        let bytes = generate_workbook(&[sheet], None).unwrap();

        let fields = CostingExtractor::default().extract_workbook(&bytes).unwrap();
        assert_eq!(fields.lot_number.as_deref(), Some("100"));
        assert_eq!(fields.supplier_name.as_deref(), Some("ACME CO"));
        assert_eq!(fields.client_name.as_deref(), Some("Beta Ltd"));
        assert_eq!(fields.fob_amount, Some(5000.0));
        assert_eq!(fields.roe_ours, Some(18.5));
        assert_eq!(fields.carrier.as_deref(), Some("MAERSK"));
        assert_eq!(fields.ocean_freight, Some(3000.0));
        assert_eq!(fields.fx_commission, None);

        let totals = fields.totals;
        assert_eq!(totals.fob_local, 92_500.0);
        assert_eq!(totals.clearing_subtotal, 2100.0);
        assert_eq!(totals.transport_subtotal, 3800.0);
        assert_eq!(totals.other_subtotal, 150.0);
        assert_eq!(totals.grand_total, 92_500.0 + 2100.0 + 3800.0 + 150.0);
    }

    #[test]
    fn blank_fob_is_null_but_counts_as_zero() {
        let input = CostingInput {
            fob_amount: None,
            ..lot_100_input()
        };
        let sheet = build_costing_sheet(&input).unwrap();
        let fields = CostingExtractor::default().extract_sheet(&sheet);

        assert_eq!(fields.fob_amount, None);
        assert_eq!(fields.totals.fob_local, 0.0);
        assert_eq!(fields.totals.grand_total, 2100.0 + 3800.0 + 150.0);

        let extracted = fields.to_extracted();
        assert_eq!(extracted.fob_amount, None);
        assert_eq!(extracted.total_amount, Some(6050.0));
    }

    #[test]
    fn stale_cached_totals_are_ignored() {
        let mut sheet = build_costing_sheet(&lot_100_input()).unwrap();
        let mut stale = CellFormat::formula("C6+C15+C21");
        stale.value = CellValue::Number(1.0);
        sheet.set_cell("C23", stale).unwrap();

        let fields = CostingExtractor::default().extract_sheet(&sheet);
        assert!(fields.totals.grand_total > 1.0);
    }

    #[test]
    fn unrelated_sheet_yields_nulls_not_errors() {
        let mut sheet = CostingStructure::new("Notes");
        sheet.set_cell("A1", CellFormat::value("Meeting notes")).unwrap();
        let fields = CostingExtractor::default().extract_sheet(&sheet);

        assert_eq!(fields.lot_number, None);
        assert_eq!(fields.fob_amount, None);
        assert!(fields.clearing.iter().all(|line| line.amount.is_none()));
        assert_eq!(fields.totals.grand_total, 0.0);
    }

    #[test]
    fn corrupt_workbook_is_a_hard_failure() {
        assert!(matches!(
            CostingExtractor::default().extract_workbook(b"PK\x03\x04broken"),
            Err(CostingError::Corrupt(_))
        ));
    }

    #[test]
    fn extracted_map_carries_line_items() {
        let sheet = build_costing_sheet(&lot_100_input()).unwrap();
        let extracted = CostingExtractor::default().extract_sheet(&sheet).to_extracted();
        assert_eq!(extracted.lot_number.as_deref(), Some("100"));
        assert_eq!(extracted.other.get("customs_duty"), Some(&serde_json::json!(1200.0)));
        assert_eq!(extracted.other.get("carrier"), Some(&serde_json::json!("MAERSK")));
        assert!(!extracted.other.contains_key("fx_commission"));
    }
}

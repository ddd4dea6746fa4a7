//! Standard costing sheet: the layout `STANDARD_LAYOUT` describes.
//!
//! Subtotals and the grand total are formulas, so the workbook recalculates
//! when opened; the extractor recomputes them independently.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::locator::STANDARD_LAYOUT;
use super::structure::*;
use super::CostingError;

const HEADER_FILL: &str = "FF1F3864";
const SECTION_FILL: &str = "FFD9E1F2";
const TOTAL_FILL: &str = "FFFFF2CC";
const AMOUNT_FORMAT: &str = "#,##0.00";
const RATE_FORMAT: &str = "0.0000";

/// Business data for a new costing sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostingInput {
    pub lot_number: String,
    pub supplier_name: String,
    pub client_name: String,
    pub fob_amount: Option<f64>,
    pub roe_ours: Option<f64>,
    pub roe_client: Option<f64>,
    /// `(key, amount)` pairs using the clearing keys of the standard layout.
    pub clearing: Vec<(String, f64)>,
    pub carrier: Option<String>,
    pub ocean_freight: Option<f64>,
    pub transport: Option<f64>,
    pub bank_charges: Option<f64>,
    pub fx_commission: Option<f64>,
}

impl CostingInput {
    pub fn header(&self) -> String {
        format!(
            "LOT {} - {} - DOC {}",
            self.lot_number.trim(),
            self.supplier_name.trim(),
            self.client_name.trim()
        )
    }

    fn clearing_amount(&self, key: &str) -> Option<f64> {
        self.clearing
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, amount)| *amount)
    }

    fn freight_label(&self) -> String {
        match self.carrier.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(carrier) => format!("OCEAN FREIGHT - {}", carrier.to_uppercase()),
            None => "OCEAN FREIGHT".to_string(),
        }
    }
}

fn bold() -> FontFormat {
    FontFormat {
        bold: true,
        ..Default::default()
    }
}

fn label(text: impl Into<String>) -> CellFormat {
    CellFormat::value(text.into())
}

fn section(text: &str) -> CellFormat {
    CellFormat::value(text)
        .with_font(bold())
        .with_fill(SECTION_FILL)
}

fn amount(value: Option<f64>) -> CellFormat {
    let cell = CellFormat {
        value: value.map(CellValue::Number).unwrap_or_default(),
        ..Default::default()
    };
    cell.with_number_format(AMOUNT_FORMAT)
}

fn total(formula: &str) -> CellFormat {
    CellFormat::formula(formula)
        .with_font(bold())
        .with_number_format(AMOUNT_FORMAT)
        .with_border(BorderFormat {
            top: Some(BorderEdge {
                style: "thin".into(),
                color: None,
            }),
            ..Default::default()
        })
}

/// Lay out the fixed part of the sheet. `value` produces each input cell.
fn layout_sheet(
    header: CellValue,
    freight_label: CellValue,
    value: &dyn Fn(&str) -> CellFormat,
) -> Result<CostingStructure, CostingError> {
    let layout = &STANDARD_LAYOUT;
    let mut sheet = CostingStructure::new("Costing");
    sheet.set_column_width(1, 34.0);
    sheet.set_column_width(2, 4.0);
    sheet.set_column_width(3, 18.0);

    sheet.set_cell(
        layout.header,
        CellFormat::value(header)
            .with_font(FontFormat {
                bold: true,
                size: Some(14.0),
                color: Some("FFFFFFFF".into()),
                ..Default::default()
            })
            .with_fill(HEADER_FILL)
            .with_alignment(AlignmentFormat {
                horizontal: Some("center".into()),
                vertical: Some("center".into()),
                wrap_text: false,
            }),
    )?;
    sheet.merges.push("A1:C1".into());
    sheet.row_mut(1).height = Some(28.0);

    sheet.set_cell("A3", section("FOB AMOUNT (USD)"))?;
    sheet.set_cell(layout.fob_amount, value("fob_amount"))?;
    sheet.set_cell("A4", label("ROE (OURS)"))?;
    sheet.set_cell(layout.roe_ours, value("roe_ours").with_number_format(RATE_FORMAT))?;
    sheet.set_cell("A5", label("ROE (CLIENT)"))?;
    sheet.set_cell(layout.roe_client, value("roe_client").with_number_format(RATE_FORMAT))?;
    sheet.set_cell("A6", label("FOB (LOCAL)"))?;
    sheet.set_cell(layout.fob_local, total("C3*C4"))?;

    sheet.set_cell("A8", section("CLEARING COSTS"))?;
    for slot in layout.clearing {
        let row = parse_cell_ref(slot.cell)
            .map(|(_, row)| row)
            .ok_or_else(|| CostingError::InvalidStructure(slot.cell.to_string()))?;
        sheet.set_cell(&format!("A{row}"), label(slot.label))?;
        sheet.set_cell(slot.cell, value(slot.key))?;
    }
    sheet.set_cell("A15", label("TOTAL CLEARING"))?;
    sheet.set_cell(layout.clearing_subtotal, total("SUM(C9:C14)"))?;

    sheet.set_cell("A17", CellFormat::value(freight_label))?;
    sheet.set_cell(layout.freight, value("ocean_freight"))?;
    sheet.set_cell("A18", label("TRANSPORT"))?;
    sheet.set_cell(layout.transport, value("transport"))?;
    sheet.set_cell("A19", label("BANK CHARGES"))?;
    sheet.set_cell(layout.bank_charges, value("bank_charges"))?;
    sheet.set_cell("A20", label("FX COMMISSION"))?;
    sheet.set_cell(layout.fx_commission, value("fx_commission"))?;
    sheet.set_cell("A21", label("TOTAL TRANSPORT & OTHER"))?;
    sheet.set_cell(layout.other_subtotal, total("SUM(C17:C20)"))?;

    sheet.set_cell(
        "A23",
        CellFormat::value("GRAND TOTAL")
            .with_font(bold())
            .with_fill(TOTAL_FILL),
    )?;
    sheet.set_cell(
        layout.grand_total,
        total("C6+C15+C21").with_fill(TOTAL_FILL),
    )?;

    sheet.fill_grid();
    Ok(sheet)
}

/// A filled-in costing sheet for `input`.
pub fn build_costing_sheet(input: &CostingInput) -> Result<CostingStructure, CostingError> {
    if input.lot_number.trim().is_empty() {
        return Err(CostingError::InvalidStructure("lot number is required".into()));
    }
    let values = substitutions_for(input);
    layout_sheet(
        CellValue::Text(input.header()),
        CellValue::Text(input.freight_label()),
        &|key| amount(values.get(key).and_then(CellValue::as_number)),
    )
}

/// The standard sheet with `{key}` markers in place of every input, for
/// [`generate_workbook`](super::codec::generate_workbook) substitutions.
pub fn build_costing_template() -> Result<CostingStructure, CostingError> {
    layout_sheet(
        CellValue::from("LOT {lot_number} - {supplier_name} - DOC {client_name}"),
        CellValue::from("{freight_label}"),
        &|key| CellFormat::value(format!("{{{key}}}")).with_number_format(AMOUNT_FORMAT),
    )
}

/// Substitution map for [`build_costing_template`]. Missing amounts map to
/// blank cells.
pub fn substitutions_for(input: &CostingInput) -> HashMap<String, CellValue> {
    let number = |v: Option<f64>| v.map(CellValue::Number).unwrap_or_default();
    let mut subs = HashMap::from([
        ("lot_number".to_string(), CellValue::from(input.lot_number.trim())),
        ("supplier_name".to_string(), CellValue::from(input.supplier_name.trim())),
        ("client_name".to_string(), CellValue::from(input.client_name.trim())),
        ("freight_label".to_string(), CellValue::Text(input.freight_label())),
        ("fob_amount".to_string(), number(input.fob_amount)),
        ("roe_ours".to_string(), number(input.roe_ours)),
        ("roe_client".to_string(), number(input.roe_client)),
        ("ocean_freight".to_string(), number(input.ocean_freight)),
        ("transport".to_string(), number(input.transport)),
        ("bank_charges".to_string(), number(input.bank_charges)),
        ("fx_commission".to_string(), number(input.fx_commission)),
    ]);
    for slot in STANDARD_LAYOUT.clearing {
        subs.insert(slot.key.to_string(), number(input.clearing_amount(slot.key)));
    }
    subs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::costing::codec::{generate_workbook, parse_workbook};
    use crate::pipeline::costing::extractor::CostingExtractor;

    fn input() -> CostingInput {
        CostingInput {
            lot_number: "100".into(),
            supplier_name: "ACME CO".into(),
            client_name: "Beta Ltd".into(),
            fob_amount: Some(5000.0),
            roe_ours: Some(18.5),
            clearing: vec![("agency_fee".into(), 450.0)],
            carrier: Some("msc".into()),
            ocean_freight: Some(2500.0),
            ..Default::default()
        }
    }

    #[test]
    fn sheet_has_formulas_merges_and_dense_grid() {
        let sheet = build_costing_sheet(&input()).unwrap();
        assert_eq!(sheet.value_at("A1"), &CellValue::from("LOT 100 - ACME CO - DOC Beta Ltd"));
        assert_eq!(sheet.value_at("A17"), &CellValue::from("OCEAN FREIGHT - MSC"));
        assert_eq!(sheet.value_at("C11"), &CellValue::Number(450.0));
        assert_eq!(sheet.cell("C23").and_then(|c| c.formula.as_deref()), Some("C6+C15+C21"));
        assert_eq!(sheet.merges, vec!["A1:C1".to_string()]);
        assert_eq!(sheet.max_row(), 23);
        assert!(sheet.rows.iter().all(|r| r.cells.len() == 3));
        sheet.validate().unwrap();
    }

    #[test]
    fn generated_sheet_round_trips_through_workbook_bytes() {
        let sheet = build_costing_sheet(&input()).unwrap();
        let bytes = generate_workbook(std::slice::from_ref(&sheet), None).unwrap();
        let (parsed, metadata) = parse_workbook(&bytes).unwrap();

        assert_eq!(parsed[0], sheet);
        assert!(metadata.fill_colors.contains(HEADER_FILL));
        assert!(metadata.fill_colors.contains(TOTAL_FILL));
    }

    #[test]
    fn template_with_substitutions_matches_direct_build() {
        let template = build_costing_template().unwrap();
        let subs = substitutions_for(&input());
        let bytes = generate_workbook(&[template], Some(&subs)).unwrap();

        let extractor = CostingExtractor::default();
        let from_template = extractor.extract_workbook(&bytes).unwrap();
        let direct = extractor.extract_sheet(&build_costing_sheet(&input()).unwrap());

        assert_eq!(from_template.lot_number, direct.lot_number);
        assert_eq!(from_template.carrier, direct.carrier);
        assert_eq!(from_template.fob_amount, Some(5000.0));
        assert_eq!(from_template.roe_client, None);
        assert_eq!(from_template.totals, direct.totals);
    }

    #[test]
    fn lot_number_is_required() {
        let missing = CostingInput {
            lot_number: "  ".into(),
            ..input()
        };
        assert!(build_costing_sheet(&missing).is_err());
    }
}

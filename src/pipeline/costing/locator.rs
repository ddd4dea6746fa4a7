//! Field locators for costing sheets.
//!
//! Each locator reads what it can from a parsed sheet and leaves the rest
//! `None`. The extractor runs them in priority order and keeps the first
//! value found for each field:
//! 1. [`CoordinateLocator`]: fixed cells of the standard costing layout
//! 2. [`LabelScanLocator`]: column-A labels anywhere on the sheet
//!
//! A new template variant is a new locator, not a change to the extractor.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::structure::{parse_cell_ref, CellValue, CostingStructure};

static HEADER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)LOT\s*(\d+)\s*-\s*(.+?)\s*-\s*DOC\s+(.+)").unwrap()
});

/// Ocean carriers recognised in freight line labels.
const CARRIERS: &[&str] = &[
    "MAERSK",
    "MSC",
    "CMA CGM",
    "HAPAG",
    "EVERGREEN",
    "COSCO",
    "ONE",
    "ZIM",
    "YANG MING",
    "HMM",
    "PIL",
    "OCEAN FREIGHT",
];

/// One clearing-cost line: its label and the cell holding the amount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearingSlot {
    pub key: &'static str,
    pub label: &'static str,
    pub cell: &'static str,
}

/// Cell coordinates of the standard costing sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct CostingLayout {
    pub header: &'static str,
    pub fob_amount: &'static str,
    pub roe_ours: &'static str,
    pub roe_client: &'static str,
    pub fob_local: &'static str,
    pub clearing: &'static [ClearingSlot],
    pub clearing_subtotal: &'static str,
    pub freight: &'static str,
    pub transport: &'static str,
    pub bank_charges: &'static str,
    pub fx_commission: &'static str,
    pub other_subtotal: &'static str,
    pub grand_total: &'static str,
}

pub const STANDARD_LAYOUT: CostingLayout = CostingLayout {
    header: "A1",
    fob_amount: "C3",
    roe_ours: "C4",
    roe_client: "C5",
    fob_local: "C6",
    clearing: &[
        ClearingSlot { key: "customs_duty", label: "CUSTOMS DUTY", cell: "C9" },
        ClearingSlot { key: "vat", label: "VAT", cell: "C10" },
        ClearingSlot { key: "agency_fee", label: "AGENCY FEE", cell: "C11" },
        ClearingSlot { key: "port_charges", label: "PORT CHARGES", cell: "C12" },
        ClearingSlot { key: "cargo_dues", label: "CARGO DUES", cell: "C13" },
        ClearingSlot { key: "documentation", label: "DOCUMENTATION", cell: "C14" },
    ],
    clearing_subtotal: "C15",
    freight: "C17",
    transport: "C18",
    bank_charges: "C19",
    fx_commission: "C20",
    other_subtotal: "C21",
    grand_total: "C23",
};

/// A clearing-cost line as read from the sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLine {
    pub key: String,
    pub amount: Option<f64>,
}

/// Fields a locator found. `None` means "not found here".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocatedFields {
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
}

impl LocatedFields {
    /// Fill every field still `None` from `other`. Clearing lines are taken
    /// from `other` only when none were located yet.
    pub fn merge_missing(&mut self, other: LocatedFields) {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }
        fill(&mut self.lot_number, other.lot_number);
        fill(&mut self.supplier_name, other.supplier_name);
        fill(&mut self.client_name, other.client_name);
        fill(&mut self.fob_amount, other.fob_amount);
        fill(&mut self.roe_ours, other.roe_ours);
        fill(&mut self.roe_client, other.roe_client);
        fill(&mut self.carrier, other.carrier);
        fill(&mut self.ocean_freight, other.ocean_freight);
        fill(&mut self.transport, other.transport);
        fill(&mut self.bank_charges, other.bank_charges);
        fill(&mut self.fx_commission, other.fx_commission);
        if self.clearing.iter().all(|line| line.amount.is_none()) && !other.clearing.is_empty() {
            self.clearing = other.clearing;
        }
    }
}

pub trait FieldLocator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Best-effort: never fails, absent fields stay `None`.
    fn locate(&self, sheet: &CostingStructure) -> LocatedFields;
}

/// Parse `LOT <n> - <supplier> - DOC <client>` into its three parts.
pub fn parse_header(text: &str) -> Option<(String, String, String)> {
    let caps = HEADER_PATTERN.captures(text.trim())?;
    let part = |i: usize| {
        caps.get(i)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    };
    Some((part(1)?, part(2)?, part(3)?))
}

/// Parse a money amount from cell text.
///
/// Currency codes and symbols, thousands separators and spaces are ignored;
/// `(1,250.00)` is negative. Anything else that does not parse is `None`.
pub fn parse_amount(text: &str) -> Option<f64> {
    let mut cleaned = text.trim().to_ascii_uppercase();
    for code in ["ZAR", "USD", "EUR", "GBP"] {
        cleaned = cleaned.replace(code, "");
    }
    let mut cleaned: String = cleaned
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ',' | ' ' | '\u{a0}'))
        .collect();
    if let Some(rest) = cleaned.strip_prefix('R') {
        cleaned = rest.to_string();
    }

    let (negative, digits) = match cleaned.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, cleaned.as_str()),
    };
    if digits.is_empty() || !digits.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: f64 = digits.parse().ok().filter(|v: &f64| v.is_finite())?;
    Some(if negative { -value } else { value })
}

/// Numeric reading of a cell value; blanks and non-numbers are `None`.
pub fn cell_amount(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Number(n) if n.is_finite() => Some(*n),
        CellValue::Text(text) => parse_amount(text),
        _ => None,
    }
}

fn cell_text(value: &CellValue) -> Option<String> {
    match value {
        CellValue::Empty => None,
        other => Some(other.to_string()).filter(|s| !s.trim().is_empty()),
    }
}

/// Reads the fixed cells of a layout.
#[derive(Debug, Clone)]
pub struct CoordinateLocator {
    layout: CostingLayout,
}

impl CoordinateLocator {
    pub fn new(layout: CostingLayout) -> Self {
        Self { layout }
    }
}

impl Default for CoordinateLocator {
    fn default() -> Self {
        Self::new(STANDARD_LAYOUT)
    }
}

impl FieldLocator for CoordinateLocator {
    fn name(&self) -> &'static str {
        "coordinate"
    }

    fn locate(&self, sheet: &CostingStructure) -> LocatedFields {
        let layout = &self.layout;
        let header = cell_text(sheet.value_at(layout.header)).and_then(|t| parse_header(&t));
        let (lot_number, supplier_name, client_name) = match header {
            Some((lot, supplier, client)) => (Some(lot), Some(supplier), Some(client)),
            None => (None, None, None),
        };

        LocatedFields {
            lot_number,
            supplier_name,
            client_name,
            fob_amount: cell_amount(sheet.value_at(layout.fob_amount)),
            roe_ours: cell_amount(sheet.value_at(layout.roe_ours)),
            roe_client: cell_amount(sheet.value_at(layout.roe_client)),
            clearing: layout
                .clearing
                .iter()
                .map(|slot| CostLine {
                    key: slot.key.to_string(),
                    amount: cell_amount(sheet.value_at(slot.cell)),
                })
                .collect(),
            ..Default::default()
        }
    }
}

/// Scans column-A labels for values that do not sit at a fixed coordinate.
#[derive(Debug, Clone, Default)]
pub struct LabelScanLocator;

#[derive(Debug, Clone, Copy, PartialEq)]
enum LabelKind {
    Freight,
    Transport,
    BankCharges,
    FxCommission,
}

fn label_words(label: &str) -> Vec<&str> {
    label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Multi-word carriers match as a phrase, single words only as whole words.
fn mentions_carrier(label: &str, words: &[&str], carrier: &str) -> bool {
    if carrier.contains(' ') {
        label.contains(carrier)
    } else {
        words.contains(&carrier)
    }
}

fn classify_label(label: &str) -> Option<LabelKind> {
    if label.contains("TOTAL") {
        return None;
    }
    let words = label_words(label);
    if CARRIERS
        .iter()
        .any(|carrier| mentions_carrier(label, &words, carrier))
    {
        Some(LabelKind::Freight)
    } else if label.contains("TRANSPORT") {
        Some(LabelKind::Transport)
    } else if label.contains("BANK") && label.contains("CHARGE") {
        Some(LabelKind::BankCharges)
    } else if words.contains(&"FX") && label.contains("COMMISSION") {
        Some(LabelKind::FxCommission)
    } else {
        None
    }
}

fn carrier_name(label: &str) -> Option<String> {
    let words = label_words(label);
    CARRIERS
        .iter()
        .find(|carrier| **carrier != "OCEAN FREIGHT" && mentions_carrier(label, &words, carrier))
        .map(|carrier| carrier.to_string())
}

impl FieldLocator for LabelScanLocator {
    fn name(&self) -> &'static str {
        "label_scan"
    }

    fn locate(&self, sheet: &CostingStructure) -> LocatedFields {
        let mut found = LocatedFields::default();
        let mut seen: Vec<LabelKind> = Vec::new();

        for row in &sheet.rows {
            let Some(text) = row
                .cells
                .get(&format!("A{}", row.index))
                .and_then(|c| cell_text(&c.value))
            else {
                continue;
            };

            if found.lot_number.is_none() {
                if let Some((lot, supplier, client)) = parse_header(&text) {
                    found.lot_number = Some(lot);
                    found.supplier_name = Some(supplier);
                    found.client_name = Some(client);
                    continue;
                }
            }

            let label = text.to_uppercase();
            let Some(kind) = classify_label(&label) else {
                continue;
            };
            // First matching row wins, even when its amount is blank
            if seen.contains(&kind) {
                continue;
            }
            seen.push(kind);

            let amount = row
                .cells
                .iter()
                .filter_map(|(reference, cell)| {
                    parse_cell_ref(reference).map(|(col, _)| (col, cell))
                })
                .filter(|(col, _)| *col > 1)
                .min_by_key(|(col, cell)| (cell_amount(&cell.value).is_none(), *col))
                .and_then(|(_, cell)| cell_amount(&cell.value));

            match kind {
                LabelKind::Freight => {
                    found.carrier = carrier_name(&label);
                    found.ocean_freight = amount;
                }
                LabelKind::Transport => found.transport = amount,
                LabelKind::BankCharges => found.bank_charges = amount,
                LabelKind::FxCommission => found.fx_commission = amount,
            }
        }
        found
    }
}

//! In-memory model of a workbook: sheets, rows, cells and their styling.
//!
//! Cells are keyed by A1 reference. Every descriptor is optional and `None`
//! means "workbook default", so a structure written and read back compares
//! equal field for field.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::CostingError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The `key` of a value written exactly as `{key}`.
    pub fn placeholder_key(&self) -> Option<&str> {
        let text = self.as_text()?.trim();
        let key = text.strip_prefix('{')?.strip_suffix('}')?;
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        valid.then_some(key)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(text) => f.write_str(text),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Bool(true) => f.write_str("TRUE"),
            CellValue::Bool(false) => f.write_str("FALSE"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FontFormat {
    pub bold: bool,
    pub italic: bool,
    pub size: Option<f64>,
    /// ARGB hex, e.g. `FFFF0000`
    pub color: Option<String>,
    pub family: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentFormat {
    /// `left`, `center`, `right`, ... (`general` is the default and stored as `None`)
    pub horizontal: Option<String>,
    /// `top`, `center`, ... (`bottom` is the default and stored as `None`)
    pub vertical: Option<String>,
    pub wrap_text: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorderEdge {
    /// `thin`, `medium`, `thick`, `double`, `dashed`, ...
    pub style: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BorderFormat {
    pub top: Option<BorderEdge>,
    pub bottom: Option<BorderEdge>,
    pub left: Option<BorderEdge>,
    pub right: Option<BorderEdge>,
}

impl BorderFormat {
    pub fn all(style: &str) -> Self {
        let edge = Some(BorderEdge {
            style: style.to_string(),
            color: None,
        });
        Self {
            top: edge.clone(),
            bottom: edge.clone(),
            left: edge.clone(),
            right: edge,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_none() && self.bottom.is_none() && self.left.is_none() && self.right.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellFormat {
    pub value: CellValue,
    /// Formula text without the leading `=`.
    pub formula: Option<String>,
    pub font: Option<FontFormat>,
    /// Solid fill colour (ARGB hex).
    pub fill: Option<String>,
    pub alignment: Option<AlignmentFormat>,
    pub border: Option<BorderFormat>,
    pub number_format: Option<String>,
}

impl CellFormat {
    pub fn value(value: impl Into<CellValue>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn formula(formula: impl Into<String>) -> Self {
        Self {
            formula: Some(formula.into()),
            ..Default::default()
        }
    }

    pub fn with_font(mut self, font: FontFormat) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_fill(mut self, argb: impl Into<String>) -> Self {
        self.fill = Some(argb.into());
        self
    }

    pub fn with_alignment(mut self, alignment: AlignmentFormat) -> Self {
        self.alignment = Some(alignment);
        self
    }

    pub fn with_border(mut self, border: BorderFormat) -> Self {
        self.border = Some(border);
        self
    }

    pub fn with_number_format(mut self, code: impl Into<String>) -> Self {
        self.number_format = Some(code.into());
        self
    }

    pub fn has_formatting(&self) -> bool {
        self.font.is_some()
            || self.fill.is_some()
            || self.alignment.is_some()
            || self.border.is_some()
            || self.number_format.is_some()
    }

    /// Blank value, no formula, no styling.
    pub fn is_blank(&self) -> bool {
        self.value.is_empty() && self.formula.is_none() && !self.has_formatting()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowStructure {
    /// 1-based row number.
    pub index: u32,
    pub height: Option<f64>,
    pub cells: BTreeMap<String, CellFormat>,
}

impl RowStructure {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            height: None,
            cells: BTreeMap::new(),
        }
    }
}

/// Width a workbook gives a column nobody sized.
pub const DEFAULT_COLUMN_WIDTH: f64 = 8.38;

pub fn is_default_width(width: f64) -> bool {
    (width - DEFAULT_COLUMN_WIDTH).abs() < 1e-6
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnWidth {
    /// 1-based column number.
    pub column: u32,
    pub width: f64,
}

/// One worksheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostingStructure {
    pub name: String,
    pub column_widths: Vec<ColumnWidth>,
    pub rows: Vec<RowStructure>,
    /// Ranges such as `A1:F1`.
    pub merges: Vec<String>,
}

impl CostingStructure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_widths: Vec::new(),
            rows: Vec::new(),
            merges: Vec::new(),
        }
    }

    pub fn cell(&self, reference: &str) -> Option<&CellFormat> {
        let (_, row) = parse_cell_ref(reference)?;
        self.rows
            .iter()
            .find(|r| r.index == row)
            .and_then(|r| r.cells.get(&reference.to_ascii_uppercase()))
    }

    /// Value at `reference`, `Empty` when the cell does not exist.
    pub fn value_at(&self, reference: &str) -> &CellValue {
        const EMPTY: &CellValue = &CellValue::Empty;
        self.cell(reference).map(|c| &c.value).unwrap_or(EMPTY)
    }

    /// Insert or replace a cell, creating its row if needed. Rows stay sorted.
    pub fn set_cell(&mut self, reference: &str, cell: CellFormat) -> Result<(), CostingError> {
        let (_, row) = parse_cell_ref(reference)
            .ok_or_else(|| {
                CostingError::InvalidStructure(format!("bad cell reference {reference}"))
            })?;
        self.row_mut(row)
            .cells
            .insert(reference.to_ascii_uppercase(), cell);
        Ok(())
    }

    pub fn row_mut(&mut self, index: u32) -> &mut RowStructure {
        let pos = match self.rows.binary_search_by_key(&index, |r| r.index) {
            Ok(pos) => pos,
            Err(pos) => {
                self.rows.insert(pos, RowStructure::new(index));
                pos
            }
        };
        &mut self.rows[pos]
    }

    /// Setting a column to [`DEFAULT_COLUMN_WIDTH`] clears its entry; workbooks
    /// cannot tell that width apart from an unsized column.
    pub fn set_column_width(&mut self, column: u32, width: f64) {
        if is_default_width(width) {
            self.column_widths.retain(|c| c.column != column);
            return;
        }
        match self.column_widths.iter_mut().find(|c| c.column == column) {
            Some(existing) => existing.width = width,
            None => {
                self.column_widths.push(ColumnWidth { column, width });
                self.column_widths.sort_by_key(|c| c.column);
            }
        }
    }

    pub fn max_row(&self) -> u32 {
        self.rows.iter().map(|r| r.index).max().unwrap_or(0)
    }

    pub fn max_column(&self) -> u32 {
        self.rows
            .iter()
            .flat_map(|r| r.cells.keys())
            .filter_map(|reference| parse_cell_ref(reference).map(|(col, _)| col))
            .max()
            .unwrap_or(0)
    }

    /// Fill in every row and cell up to the highest used row and column with
    /// blanks, giving the dense grid a parsed workbook has.
    pub fn fill_grid(&mut self) {
        let max_row = self.max_row();
        let max_col = self.max_column();
        for row in 1..=max_row {
            let row_struct = self.row_mut(row);
            for col in 1..=max_col {
                row_struct
                    .cells
                    .entry(cell_ref(col, row))
                    .or_default();
            }
        }
    }

    /// A formula cell must not also carry a `{key}` substitution marker.
    pub fn validate(&self) -> Result<(), CostingError> {
        if self.name.trim().is_empty() {
            return Err(CostingError::InvalidStructure("sheet name is empty".into()));
        }
        for row in &self.rows {
            if row.index == 0 {
                return Err(CostingError::InvalidStructure(format!(
                    "sheet {}: row numbers start at 1",
                    self.name
                )));
            }
            for (reference, cell) in &row.cells {
                match parse_cell_ref(reference) {
                    Some((_, r)) if r == row.index => {}
                    _ => {
                        return Err(CostingError::InvalidStructure(format!(
                            "sheet {}: cell {reference} does not belong to row {}",
                            self.name, row.index
                        )))
                    }
                }
                if cell.formula.is_some() && cell.value.placeholder_key().is_some() {
                    return Err(CostingError::InvalidStructure(format!(
                        "sheet {}: formula cell {reference} carries a substitution marker",
                        self.name
                    )));
                }
            }
        }
        for range in &self.merges {
            if parse_range(range).is_none() {
                return Err(CostingError::InvalidStructure(format!(
                    "sheet {}: bad merge range {range}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Summary of what a parsed workbook contains.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatMetadata {
    pub sheet_count: usize,
    pub total_rows: usize,
    pub has_formulas: bool,
    pub has_formatting: bool,
    pub has_merges: bool,
    pub fill_colors: BTreeSet<String>,
}

impl FormatMetadata {
    pub fn summarize(structures: &[CostingStructure]) -> Self {
        let mut meta = FormatMetadata {
            sheet_count: structures.len(),
            ..Default::default()
        };
        for sheet in structures {
            meta.total_rows += sheet.rows.len();
            meta.has_merges |= !sheet.merges.is_empty();
            for cell in sheet.rows.iter().flat_map(|r| r.cells.values()) {
                meta.has_formulas |= cell.formula.is_some();
                meta.has_formatting |= cell.has_formatting();
                if let Some(fill) = &cell.fill {
                    meta.fill_colors.insert(fill.clone());
                }
            }
        }
        meta
    }
}

// ═══════════════════════════════════════════════════════════
// A1 references
// ═══════════════════════════════════════════════════════════

/// 1 → `A`, 27 → `AA`
pub fn column_letter(mut column: u32) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        column = (column - 1) / 26;
    }
    letters.iter().rev().collect()
}

pub fn cell_ref(column: u32, row: u32) -> String {
    format!("{}{row}", column_letter(column))
}

/// `B12` → `(2, 12)`; `None` for anything that is not a plain A1 reference.
pub fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let reference = reference.trim();
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty()
        || letters.len() > 3
        || !letters.chars().all(|c| c.is_ascii_alphabetic())
    {
        return None;
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let row: u32 = digits.parse().ok().filter(|r| *r > 0)?;
    let column = letters
        .to_ascii_uppercase()
        .bytes()
        .fold(0u32, |acc, b| acc * 26 + u32::from(b - b'A' + 1));
    Some((column, row))
}

/// `A1:F1` → both corners.
pub fn parse_range(range: &str) -> Option<((u32, u32), (u32, u32))> {
    let (start, end) = range.split_once(':')?;
    Some((parse_cell_ref(start)?, parse_cell_ref(end)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(703), "AAA");
        assert_eq!(parse_cell_ref("aa10"), Some((27, 10)));
        assert_eq!(parse_cell_ref("C0"), None);
        assert_eq!(parse_cell_ref("12"), None);
        assert_eq!(parse_cell_ref("A1B"), None);
    }

    #[test]
    fn placeholder_keys() {
        assert_eq!(CellValue::from("{lot_number}").placeholder_key(), Some("lot_number"));
        assert_eq!(CellValue::from(" {fob} ").placeholder_key(), Some("fob"));
        assert_eq!(CellValue::from("LOT {lot}").placeholder_key(), None);
        assert_eq!(CellValue::from("{}").placeholder_key(), None);
        assert_eq!(CellValue::Number(1.0).placeholder_key(), None);
    }

    #[test]
    fn set_cell_keeps_rows_sorted() {
        let mut sheet = CostingStructure::new("Costing");
        sheet.set_cell("C5", CellFormat::value(1.0)).unwrap();
        sheet.set_cell("a1", CellFormat::value("x")).unwrap();
        assert_eq!(sheet.rows.iter().map(|r| r.index).collect::<Vec<_>>(), vec![1, 5]);
        assert_eq!(sheet.value_at("A1"), &CellValue::from("x"));
        assert_eq!(sheet.value_at("Z99"), &CellValue::Empty);
        assert!(sheet.set_cell("bogus", CellFormat::default()).is_err());
    }

    #[test]
    fn fill_grid_is_dense() {
        let mut sheet = CostingStructure::new("Costing");
        sheet.set_cell("C3", CellFormat::value(1.0)).unwrap();
        sheet.fill_grid();
        assert_eq!(sheet.rows.len(), 3);
        assert!(sheet.rows.iter().all(|r| r.cells.len() == 3));
    }

    #[test]
    fn formula_with_marker_is_invalid() {
        let mut sheet = CostingStructure::new("Costing");
        let mut cell = CellFormat::formula("SUM(C1:C2)");
        cell.value = CellValue::from("{total}");
        sheet.set_cell("C3", cell).unwrap();
        assert!(matches!(sheet.validate(), Err(CostingError::InvalidStructure(_))));
    }

    #[test]
    fn metadata_summary() {
        let mut sheet = CostingStructure::new("Costing");
        sheet
            .set_cell("A1", CellFormat::value("Header").with_fill("FFD9E1F2"))
            .unwrap();
        sheet.set_cell("C2", CellFormat::formula("C1*2")).unwrap();
        sheet.merges.push("A1:F1".into());

        let meta = FormatMetadata::summarize(&[sheet]);
        assert_eq!(meta.sheet_count, 1);
        assert_eq!(meta.total_rows, 2);
        assert!(meta.has_formulas && meta.has_formatting && meta.has_merges);
        assert!(meta.fill_colors.contains("FFD9E1F2"));
    }
}

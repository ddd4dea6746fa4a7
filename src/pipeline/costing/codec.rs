//! Workbook bytes ⇄ [`CostingStructure`].
//!
//! `parse_workbook` walks every sheet over its full used range, so empty rows
//! and cells keep their positions. `generate_workbook` is the inverse: each
//! cell is written (value or formula), then its styles, merges, column widths
//! and row heights are replayed.
//!
//! Workbook defaults (Calibri 11, black, general alignment, no border,
//! `General` number format) are read back as `None`. Columns at the default
//! width are left out of `column_widths`.

use std::collections::HashMap;
use std::io::Cursor;

use umya_spreadsheet::{HorizontalAlignmentValues, VerticalAlignmentValues, Worksheet};

use super::structure::*;
use super::CostingError;

const DEFAULT_FONT_FAMILY: &str = "Calibri";
const DEFAULT_FONT_SIZE: f64 = 11.0;
const DEFAULT_NUMBER_FORMAT: &str = "General";

/// Parse an `.xlsx` workbook. A missing or corrupt workbook is an error; an
/// absent cell is just a blank.
pub fn parse_workbook(
    bytes: &[u8],
) -> Result<(Vec<CostingStructure>, FormatMetadata), CostingError> {
    if bytes.is_empty() {
        return Err(CostingError::Corrupt("workbook is empty".into()));
    }

    let book = umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(bytes), true)
        .map_err(|e| CostingError::Corrupt(e.to_string()))?;

    let structures: Vec<CostingStructure> = book
        .get_sheet_collection()
        .iter()
        .map(read_sheet)
        .collect();
    if structures.is_empty() {
        return Err(CostingError::Corrupt("workbook has no worksheets".into()));
    }

    let metadata = FormatMetadata::summarize(&structures);
    tracing::debug!(
        sheets = metadata.sheet_count,
        rows = metadata.total_rows,
        formulas = metadata.has_formulas,
        merges = metadata.has_merges,
        "Workbook parsed"
    );
    Ok((structures, metadata))
}

/// Write `structures` as an `.xlsx` workbook.
///
/// A cell whose whole value is `{key}` takes `substitutions[key]` when the
/// key is present; `{key}` inside longer text is replaced with the value's
/// text form. Formula cells are always written as formulas.
pub fn generate_workbook(
    structures: &[CostingStructure],
    substitutions: Option<&HashMap<String, CellValue>>,
) -> Result<Vec<u8>, CostingError> {
    if structures.is_empty() {
        return Err(CostingError::InvalidStructure("no worksheets to write".into()));
    }

    let mut book = umya_spreadsheet::new_file_empty_worksheet();
    for structure in structures {
        structure.validate()?;
        let sheet = book
            .new_sheet(structure.name.clone())
            .map_err(|e| CostingError::InvalidStructure(format!("sheet {}: {e}", structure.name)))?;
        write_sheet(sheet, structure, substitutions);
    }

    let mut cursor = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(&book, &mut cursor)
        .map_err(|e| CostingError::Write(e.to_string()))?;
    let bytes = cursor.into_inner();

    tracing::debug!(sheets = structures.len(), size = bytes.len(), "Workbook generated");
    Ok(bytes)
}

// ═══════════════════════════════════════════════════════════
// Reading
// ═══════════════════════════════════════════════════════════

fn read_sheet(sheet: &Worksheet) -> CostingStructure {
    let mut structure = CostingStructure::new(sheet.get_name().to_string());
    let max_row = sheet.get_highest_row();
    let max_col = sheet.get_highest_column();

    for index in 1..=max_row {
        let mut row = RowStructure::new(index);
        row.height = sheet
            .get_row_dimension(&index)
            .map(|dim| dim.get_height().clone())
            .filter(|h| *h > 0.0);
        for col in 1..=max_col {
            let cell = sheet
                .get_cell((col, index))
                .map(read_cell)
                .unwrap_or_default();
            row.cells.insert(cell_ref(col, index), cell);
        }
        structure.rows.push(row);
    }

    let mut widths: Vec<ColumnWidth> = sheet
        .get_column_dimensions()
        .iter()
        .map(|dim| ColumnWidth {
            column: dim.get_col_num().clone(),
            width: dim.get_width().clone(),
        })
        .filter(|c| c.width > 0.0 && !is_default_width(c.width))
        .collect();
    widths.sort_by_key(|c| c.column);
    structure.column_widths = widths;

    structure.merges = sheet
        .get_merge_cells()
        .iter()
        .map(|range| range.get_range().to_string())
        .collect();

    structure
}

fn read_cell(cell: &umya_spreadsheet::Cell) -> CellFormat {
    let formula = cell.get_formula().trim_start_matches('=').trim().to_string();
    let style = cell.get_style();

    CellFormat {
        value: read_value(cell),
        formula: (!formula.is_empty()).then_some(formula),
        font: style.get_font().and_then(read_font),
        fill: style
            .get_background_color()
            .and_then(|color| normalize_color(&color.get_argb().to_string())),
        alignment: style.get_alignment().and_then(read_alignment),
        // `Borders` is not publicly exported by umya-spreadsheet 2.2.3, so it
        // cannot be named in a helper signature.
        border: style.get_borders().and_then(|borders| {
            let format = BorderFormat {
                top: read_edge(borders.get_top()),
                bottom: read_edge(borders.get_bottom()),
                left: read_edge(borders.get_left()),
                right: read_edge(borders.get_right()),
            };
            (!format.is_empty()).then_some(format)
        }),
        number_format: style
            .get_number_format()
            .map(|fmt| fmt.get_format_code().to_string())
            .filter(|code| !code.is_empty() && code != DEFAULT_NUMBER_FORMAT),
    }
}

fn read_value(cell: &umya_spreadsheet::Cell) -> CellValue {
    let text = cell.get_value().to_string();
    if text.is_empty() {
        return CellValue::Empty;
    }
    let data_type = cell.get_data_type().to_string();
    if data_type == "b" {
        return CellValue::Bool(text == "1" || text.eq_ignore_ascii_case("true"));
    }
    let number = cell
        .get_value_number()
        .or_else(|| if data_type == "n" { text.parse().ok() } else { None });
    match number {
        Some(n) => CellValue::Number(n),
        None => CellValue::Text(text),
    }
}

fn read_font(font: &umya_spreadsheet::Font) -> Option<FontFormat> {
    let size = font.get_size().clone();
    let family = font.get_name().to_string();
    let format = FontFormat {
        bold: font.get_bold().clone(),
        italic: font.get_italic().clone(),
        size: (size > 0.0 && (size - DEFAULT_FONT_SIZE).abs() > f64::EPSILON).then_some(size),
        color: normalize_color(&font.get_color().get_argb().to_string())
            .filter(|argb| argb != "FF000000"),
        family: (!family.is_empty() && family != DEFAULT_FONT_FAMILY).then_some(family),
    };
    (format != FontFormat::default()).then_some(format)
}

fn read_alignment(alignment: &umya_spreadsheet::Alignment) -> Option<AlignmentFormat> {
    let horizontal = match alignment.get_horizontal().clone() {
        HorizontalAlignmentValues::General => None,
        HorizontalAlignmentValues::Left => Some("left"),
        HorizontalAlignmentValues::Center => Some("center"),
        HorizontalAlignmentValues::CenterContinuous => Some("centerContinuous"),
        HorizontalAlignmentValues::Right => Some("right"),
        HorizontalAlignmentValues::Fill => Some("fill"),
        HorizontalAlignmentValues::Justify => Some("justify"),
        HorizontalAlignmentValues::Distributed => Some("distributed"),
    };
    let vertical = match alignment.get_vertical().clone() {
        VerticalAlignmentValues::Bottom => None,
        VerticalAlignmentValues::Top => Some("top"),
        VerticalAlignmentValues::Center => Some("center"),
        VerticalAlignmentValues::Justify => Some("justify"),
        VerticalAlignmentValues::Distributed => Some("distributed"),
    };
    let format = AlignmentFormat {
        horizontal: horizontal.map(str::to_string),
        vertical: vertical.map(str::to_string),
        wrap_text: alignment.get_wrap_text().clone(),
    };
    (format != AlignmentFormat::default()).then_some(format)
}

fn read_edge(border: &umya_spreadsheet::Border) -> Option<BorderEdge> {
    let style = border.get_border_style().to_string();
    if style.is_empty() || style == "none" {
        return None;
    }
    Some(BorderEdge {
        style,
        color: normalize_color(&border.get_color().get_argb().to_string())
            .filter(|argb| argb != "FF000000"),
    })
}

/// Upper-case ARGB; six-digit RGB gains an opaque alpha.
fn normalize_color(raw: &str) -> Option<String> {
    let hex = raw.trim().trim_start_matches('#').to_ascii_uppercase();
    match hex.len() {
        6 => Some(format!("FF{hex}")),
        8 => Some(hex),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════
// Writing
// ═══════════════════════════════════════════════════════════

fn write_sheet(
    sheet: &mut Worksheet,
    structure: &CostingStructure,
    substitutions: Option<&HashMap<String, CellValue>>,
) {
    for width in structure
        .column_widths
        .iter()
        .filter(|w| !is_default_width(w.width))
    {
        sheet
            .get_column_dimension_mut(&column_letter(width.column))
            .set_width(width.width);
    }

    for row in &structure.rows {
        if let Some(height) = row.height {
            sheet.get_row_dimension_mut(&row.index).set_height(height);
        }
        for (reference, format) in &row.cells {
            write_cell(sheet.get_cell_mut(reference.as_str()), format, substitutions);
        }
    }

    for range in &structure.merges {
        sheet.add_merge_cells(range.as_str());
    }
}

fn substitute(value: &CellValue, substitutions: Option<&HashMap<String, CellValue>>) -> CellValue {
    let Some(subs) = substitutions else {
        return value.clone();
    };
    if let Some(replacement) = value.placeholder_key().and_then(|key| subs.get(key)) {
        return replacement.clone();
    }
    match value {
        CellValue::Text(text) if text.contains('{') => {
            let mut out = text.clone();
            for (key, replacement) in subs {
                out = out.replace(&format!("{{{key}}}"), &replacement.to_string());
            }
            CellValue::Text(out)
        }
        other => other.clone(),
    }
}

fn write_cell(
    cell: &mut umya_spreadsheet::Cell,
    format: &CellFormat,
    substitutions: Option<&HashMap<String, CellValue>>,
) {
    let value = if format.formula.is_some() {
        format.value.clone()
    } else {
        substitute(&format.value, substitutions)
    };
    match value {
        CellValue::Empty => {}
        CellValue::Text(text) => {
            cell.set_value_string(text);
        }
        CellValue::Number(n) => {
            cell.set_value_number(n);
        }
        CellValue::Bool(b) => {
            cell.set_value_bool(b);
        }
    }
    if let Some(formula) = &format.formula {
        cell.set_formula(formula.trim_start_matches('=').to_string());
    }

    if !format.has_formatting() {
        return;
    }
    let style = cell.get_style_mut();

    if let Some(font) = &format.font {
        let target = style.get_font_mut();
        target.set_bold(font.bold);
        target.set_italic(font.italic);
        if let Some(size) = font.size {
            target.set_size(size);
        }
        if let Some(family) = &font.family {
            target.set_name(family.clone());
        }
        if let Some(color) = &font.color {
            target.get_color_mut().set_argb(color.clone());
        }
    }

    if let Some(fill) = &format.fill {
        style.set_background_color(fill.clone());
    }

    if let Some(alignment) = &format.alignment {
        let target = style.get_alignment_mut();
        if let Some(horizontal) = alignment.horizontal.as_deref().and_then(horizontal_value) {
            target.set_horizontal(horizontal);
        }
        if let Some(vertical) = alignment.vertical.as_deref().and_then(vertical_value) {
            target.set_vertical(vertical);
        }
        target.set_wrap_text(alignment.wrap_text);
    }

    if let Some(border) = &format.border {
        let borders = style.get_borders_mut();
        write_edge(borders.get_top_mut(), border.top.as_ref());
        write_edge(borders.get_bottom_mut(), border.bottom.as_ref());
        write_edge(borders.get_left_mut(), border.left.as_ref());
        write_edge(borders.get_right_mut(), border.right.as_ref());
    }

    if let Some(code) = &format.number_format {
        style.get_number_format_mut().set_format_code(code.clone());
    }
}

fn write_edge(target: &mut umya_spreadsheet::Border, edge: Option<&BorderEdge>) {
    let Some(edge) = edge else {
        return;
    };
    target.set_border_style(edge.style.clone());
    if let Some(color) = &edge.color {
        target.get_color_mut().set_argb(color.clone());
    }
}

fn horizontal_value(name: &str) -> Option<HorizontalAlignmentValues> {
    Some(match name {
        "left" => HorizontalAlignmentValues::Left,
        "center" => HorizontalAlignmentValues::Center,
        "centerContinuous" => HorizontalAlignmentValues::CenterContinuous,
        "right" => HorizontalAlignmentValues::Right,
        "fill" => HorizontalAlignmentValues::Fill,
        "justify" => HorizontalAlignmentValues::Justify,
        "distributed" => HorizontalAlignmentValues::Distributed,
        "general" => HorizontalAlignmentValues::General,
        _ => return None,
    })
}

fn vertical_value(name: &str) -> Option<VerticalAlignmentValues> {
    Some(match name {
        "top" => VerticalAlignmentValues::Top,
        "center" => VerticalAlignmentValues::Center,
        "bottom" => VerticalAlignmentValues::Bottom,
        "justify" => VerticalAlignmentValues::Justify,
        "distributed" => VerticalAlignmentValues::Distributed,
        _ => return None,
    })
}

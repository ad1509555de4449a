//! Workbook writer.
//!
//! Serializes a [`Table`] to `.xlsx` with `rust_xlsxwriter`, optionally
//! applying a [`StyleMap`] computed ahead of time. The writer never looks at
//! cell values to decide styling; that is the styler's job.

use rust_xlsxwriter::{Color, Format, FormatPattern, Workbook, Worksheet};
use std::path::Path;

use crate::error::{TableError, TableResult};
use crate::table::{CellValue, Table};

/// Solid fill for highlighted cells.
pub const HIGHLIGHT_RGB: u32 = 0xFFFF00;

/// Font color for emphasized cells.
pub const EMPHASIS_RGB: u32 = 0xFF0000;

/// Font size for emphasized cells.
pub const EMPHASIS_FONT_SIZE: f64 = 14.0;

/// Presentation flags for one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellStyle {
    /// Yellow solid fill.
    pub highlight: bool,
    /// Bold, enlarged, red font.
    pub emphasis: bool,
}

impl CellStyle {
    pub fn is_plain(&self) -> bool {
        !self.highlight && !self.emphasis
    }

    fn format(&self) -> Option<Format> {
        if self.is_plain() {
            return None;
        }
        let mut format = Format::new();
        if self.highlight {
            format = format
                .set_pattern(FormatPattern::Solid)
                .set_background_color(Color::RGB(HIGHLIGHT_RGB));
        }
        if self.emphasis {
            format = format
                .set_bold()
                .set_font_size(EMPHASIS_FONT_SIZE)
                .set_font_color(Color::RGB(EMPHASIS_RGB));
        }
        Some(format)
    }
}

/// Styles for a header row and data rows, shaped like the table they describe.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StyleMap {
    pub header: Vec<CellStyle>,
    pub rows: Vec<Vec<CellStyle>>,
}

impl StyleMap {
    /// All-plain map with the given shape.
    pub fn plain(columns: usize, rows: usize) -> Self {
        Self {
            header: vec![CellStyle::default(); columns],
            rows: vec![vec![CellStyle::default(); columns]; rows],
        }
    }

    pub fn header_style(&self, col: usize) -> CellStyle {
        self.header.get(col).copied().unwrap_or_default()
    }

    pub fn cell_style(&self, row: usize, col: usize) -> CellStyle {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .copied()
            .unwrap_or_default()
    }
}

/// Build an in-memory workbook.
pub fn to_xlsx_bytes(table: &Table, styles: Option<&StyleMap>) -> TableResult<Vec<u8>> {
    let mut workbook = build_workbook(table, styles)?;
    Ok(workbook.save_to_buffer()?)
}

/// Write a workbook to disk.
pub fn write_xlsx<P: AsRef<Path>>(table: &Table, styles: Option<&StyleMap>, path: P) -> TableResult<()> {
    let mut workbook = build_workbook(table, styles)?;
    workbook.save(path.as_ref())?;
    Ok(())
}

fn build_workbook(table: &Table, styles: Option<&StyleMap>) -> TableResult<Workbook> {
    if table.columns.len() > u16::MAX as usize {
        return Err(TableError::Write(format!("Too many columns: {}", table.columns.len())));
    }
    if table.rows.len() >= u32::MAX as usize {
        return Err(TableError::Write(format!("Too many rows: {}", table.rows.len())));
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, name) in table.columns.iter().enumerate() {
        let style = styles.map(|s| s.header_style(col)).unwrap_or_default();
        write_cell(sheet, 0, col as u16, &CellValue::Text(name.clone()), style)?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            let style = styles.map(|s| s.cell_style(r, col)).unwrap_or_default();
            write_cell(sheet, (r + 1) as u32, col as u16, cell, style)?;
        }
    }

    Ok(workbook)
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, cell: &CellValue, style: CellStyle) -> TableResult<()> {
    let format = style.format();
    match (cell, format) {
        (CellValue::Empty, None) => {}
        (CellValue::Empty, Some(f)) => {
            sheet.write_blank(row, col, &f)?;
        }
        (CellValue::Bool(b), None) => {
            sheet.write_boolean(row, col, *b)?;
        }
        (CellValue::Bool(b), Some(f)) => {
            sheet.write_boolean_with_format(row, col, *b, &f)?;
        }
        (CellValue::Int(_) | CellValue::Float(_), format) => {
            let n = cell.as_f64().unwrap_or_default();
            match format {
                Some(f) => sheet.write_number_with_format(row, col, n, &f)?,
                None => sheet.write_number(row, col, n)?,
            };
        }
        (CellValue::Text(s), None) => {
            sheet.write_string(row, col, s)?;
        }
        (CellValue::Text(s), Some(f)) => {
            sheet.write_string_with_format(row, col, s, &f)?;
        }
    }
    Ok(())
}

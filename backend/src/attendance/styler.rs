//! Presentation styles for the attendance workbook.
//!
//! Two independent passes over a renumbered table:
//! every cell of a `_lab` column (header included) gets the highlight fill,
//! and every data cell outside the key columns holding exactly `X` gets the
//! emphasis font. A lab column's `X` cells get both.

use crate::table::{CellValue, Table};
use crate::writer::StyleMap;

use super::merge::{KEY_COLUMNS, LAB_SUFFIX};
use super::renumber::ABSENT_MARKER;

/// Compute the style map for `table`. Values are not touched.
pub fn style_attendance(table: &Table) -> StyleMap {
    let mut styles = StyleMap::plain(table.columns.len(), table.rows.len());

    for (col, name) in table.columns.iter().enumerate() {
        if !name.ends_with(LAB_SUFFIX) {
            continue;
        }
        styles.header[col].highlight = true;
        for row in &mut styles.rows {
            row[col].highlight = true;
        }
    }

    let key_positions: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| KEY_COLUMNS.contains(&name.as_str()))
        .map(|(i, _)| i)
        .collect();

    for (r, row) in table.rows.iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            if key_positions.contains(&col) {
                continue;
            }
            if matches!(cell, CellValue::Text(s) if s == ABSENT_MARKER) {
                styles.rows[r][col].emphasis = true;
            }
        }
    }

    styles
}

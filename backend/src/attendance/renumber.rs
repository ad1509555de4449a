//! Per-row attendance renumbering.
//!
//! Each present cell in a row is replaced by its 1-based position among the
//! row's present cells, counted left to right over the data columns.
//! Absence markers stay `X`. Rows are independent.

use crate::table::{CellValue, Table};

use super::merge::KEY_COLUMNS;

/// Literal absence marker.
pub const ABSENT_MARKER: &str = "X";

/// One attendance cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceCell {
    Absent,
    /// Present; rank is assigned by [`renumber_row`].
    Present(Option<u32>),
}

impl AttendanceCell {
    /// `X` in any case, with any surrounding whitespace, is an absence.
    /// Everything else, blanks included, counts as present.
    pub fn classify(cell: &CellValue) -> Self {
        if cell.to_string().trim().eq_ignore_ascii_case(ABSENT_MARKER) {
            AttendanceCell::Absent
        } else {
            AttendanceCell::Present(None)
        }
    }

    pub fn to_cell(self) -> CellValue {
        match self {
            AttendanceCell::Absent => CellValue::text(ABSENT_MARKER),
            AttendanceCell::Present(Some(rank)) => CellValue::Int(rank as i64),
            AttendanceCell::Present(None) => CellValue::Empty,
        }
    }
}

/// Renumber the cells at `data_columns` of one row, leaving other cells as they are.
pub fn renumber_row(row: &[CellValue], data_columns: &[usize]) -> Vec<CellValue> {
    let (out, _) = data_columns
        .iter()
        .filter(|&&i| i < row.len())
        .fold((row.to_vec(), 1u32), |(mut out, next), &i| {
            match AttendanceCell::classify(&row[i]) {
                AttendanceCell::Absent => {
                    out[i] = AttendanceCell::Absent.to_cell();
                    (out, next)
                }
                AttendanceCell::Present(_) => {
                    out[i] = AttendanceCell::Present(Some(next)).to_cell();
                    (out, next + 1)
                }
            }
        });
    out
}

/// Renumber every data row of `table`; key columns are skipped.
pub fn renumber(table: &Table) -> Table {
    let data_columns: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| !KEY_COLUMNS.contains(&name.as_str()))
        .map(|(i, _)| i)
        .collect();

    Table {
        columns: table.columns.clone(),
        rows: table
            .rows
            .iter()
            .map(|row| renumber_row(row, &data_columns))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<CellValue> {
        values.iter().map(|v| CellValue::infer(v)).collect()
    }

    #[test]
    fn test_row_renumbering() {
        let row = cells(&["X", "P", "P", "X", "P"]);
        let out = renumber_row(&row, &[0, 1, 2, 3, 4]);
        assert_eq!(
            out,
            vec![
                CellValue::text("X"),
                CellValue::Int(1),
                CellValue::Int(2),
                CellValue::text("X"),
                CellValue::Int(3),
            ]
        );
    }

    #[test]
    fn test_marker_is_case_and_space_insensitive() {
        let row = cells(&[" x ", "x", "P"]);
        let out = renumber_row(&row, &[0, 1, 2]);
        assert_eq!(out, vec![CellValue::text("X"), CellValue::text("X"), CellValue::Int(1)]);
    }

    #[test]
    fn test_any_other_value_is_present() {
        let row = vec![CellValue::Empty, CellValue::Int(7), CellValue::text("late"), CellValue::text("XX")];
        let out = renumber_row(&row, &[0, 1, 2, 3]);
        assert_eq!(out, vec![CellValue::Int(1), CellValue::Int(2), CellValue::Int(3), CellValue::Int(4)]);
    }

    #[test]
    fn test_ranks_are_one_to_k() {
        let row = cells(&["P", "X", "P", "P", "X", "X", "P"]);
        let out = renumber_row(&row, &[0, 1, 2, 3, 4, 5, 6]);
        let ranks: Vec<i64> = out
            .iter()
            .filter_map(|c| match c {
                CellValue::Int(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_renumbering_is_idempotent() {
        let row = cells(&["P", "X", "P"]);
        let once = renumber_row(&row, &[0, 1, 2]);
        assert_eq!(renumber_row(&once, &[0, 1, 2]), once);
    }

    #[test]
    fn test_table_skips_key_columns() {
        let table = Table::new(
            vec!["Roll. No".into(), "Student Name".into(), "12-07".into(), "12-07_lab".into()],
            vec![
                vec![CellValue::Int(5), "X".into(), "P".into(), "P".into()],
                vec![CellValue::Int(6), "Ravi".into(), "x".into(), "P".into()],
            ],
        );
        let out = renumber(&table);

        assert_eq!(out.rows[0], vec![CellValue::Int(5), "X".into(), CellValue::Int(1), CellValue::Int(2)]);
        assert_eq!(out.rows[1], vec![CellValue::Int(6), "Ravi".into(), "X".into(), CellValue::Int(1)]);
        assert_eq!(out.columns, table.columns);
    }
}

//! Attendance pipeline: merge, sort, renumber, style, write.
//!
//! ```text
//! primary ─┐
//!          ├─▶ KeyMerge ─▶ DateColumnSorter ─▶ Renumber ─▶ Style ─▶ Writer
//! secondary┘
//! ```
//!
//! Every stage runs to completion before the next one starts, and nothing is
//! written unless all of them succeed.

use chrono::{DateTime, Local};
use std::path::Path;

use crate::api::logs::{log_info, log_info_indent, log_success, log_warning};
use crate::error::{AttendanceResult, PipelineResult};
use crate::join::project;
use crate::parser::load_path;
use crate::table::Table;
use crate::writer::{write_xlsx, StyleMap};

use super::merge::{data_columns, merge_on_keys, KEY_COLUMNS};
use super::renumber::renumber;
use super::sorter::{group_by_date, sort_date_columns, DateGroup};
use super::styler::style_attendance;

/// Output of a successful attendance run.
#[derive(Debug, Clone)]
pub struct AttendanceReport {
    /// Renumbered table in final column order.
    pub table: Table,
    /// Styles to apply when writing `table`.
    pub styles: StyleMap,
    /// Data columns grouped by calendar date.
    pub date_groups: Vec<DateGroup>,
}

/// Run every in-memory stage on two loaded sheets.
pub fn run_attendance(primary: &Table, secondary: &Table) -> AttendanceResult<AttendanceReport> {
    log_info("🔗 Merging sheets on Roll. No + Student Name...");
    let merged = merge_on_keys(primary, secondary)?;
    log_success(format!(
        "{} students matched ({} primary rows, {} secondary rows)",
        merged.row_count(),
        primary.row_count(),
        secondary.row_count()
    ));
    if merged.is_empty() {
        log_warning("No student appears in both sheets");
    }

    let dates = data_columns(&merged);
    let date_groups = group_by_date(&dates)?;
    log_info(format!("📅 {} session columns over {} dates:", dates.len(), date_groups.len()));
    for group in &date_groups {
        log_info_indent(format!("{} → {}", group.date, group.columns.join(", ")), 1);
    }

    let mut order: Vec<String> = KEY_COLUMNS.iter().map(|k| k.to_string()).collect();
    order.extend(sort_date_columns(&dates)?);
    let projected = project(&merged, &order)?;

    log_info("🔢 Renumbering attendance...");
    let table = renumber(&projected);
    let styles = style_attendance(&table);
    log_success("Attendance renumbered and styled");

    Ok(AttendanceReport {
        table,
        styles,
        date_groups,
    })
}

/// Load two sheets from disk, run the pipeline, and write the styled workbook.
pub fn process_attendance_files(
    primary_path: &Path,
    secondary_path: &Path,
    output_path: &Path,
) -> PipelineResult<AttendanceReport> {
    log_info(format!("📖 Reading {}", primary_path.display()));
    let primary = load_path(primary_path)?;
    log_info(format!("📖 Reading {}", secondary_path.display()));
    let secondary = load_path(secondary_path)?;

    let report = run_attendance(&primary, &secondary)?;

    write_xlsx(&report.table, Some(&report.styles), output_path)?;
    log_success(format!("💾 Saved {}", output_path.display()));
    Ok(report)
}

/// `styled_final_<YYYYmmdd_HHMMSS>.xlsx`
pub fn default_output_name(now: DateTime<Local>) -> String {
    format!("styled_final_{}.xlsx", now.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AttendanceError, PipelineError};
    use crate::parser::{parse_delimited, load_bytes, TableFormat};
    use crate::table::CellValue;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::tempdir;

    const LECTURE: &str = "Roll. No,Student Name,13-07,12-07,13-07\n\
                           1,Asha,P,P,X\n\
                           2,Ravi,X,P,P\n\
                           3,Mina,P,P,P\n";

    const LAB: &str = "Roll. No,Student Name,12-07\n\
                       2,Ravi,P\n\
                       1,Asha,x\n\
                       4,Zoya,P\n";

    fn sheets() -> (Table, Table) {
        (
            parse_delimited(LECTURE, b',').unwrap(),
            parse_delimited(LAB, b',').unwrap(),
        )
    }

    #[test]
    fn test_full_run() {
        let (lecture, lab) = sheets();
        let report = run_attendance(&lecture, &lab).unwrap();

        assert_eq!(
            report.table.columns,
            vec!["Roll. No", "Student Name", "12-07", "12-07_lab", "13-07", "13-07.1"]
        );
        assert_eq!(report.table.row_count(), 2);

        // Asha: 12-07 P, 12-07_lab x, 13-07 P, 13-07.1 X
        assert_eq!(
            report.table.rows[0],
            vec![
                CellValue::Int(1),
                CellValue::text("Asha"),
                CellValue::Int(1),
                CellValue::text("X"),
                CellValue::Int(2),
                CellValue::text("X"),
            ]
        );
        // Ravi: 12-07 P, 12-07_lab P, 13-07 X, 13-07.1 P
        assert_eq!(
            report.table.rows[1][2..],
            [CellValue::Int(1), CellValue::Int(2), CellValue::text("X"), CellValue::Int(3)]
        );

        assert!(report.styles.header_style(3).highlight);
        assert!(report.styles.cell_style(0, 3).emphasis);
        assert!(report.styles.cell_style(0, 5).emphasis);
        assert!(!report.styles.cell_style(0, 4).emphasis);

        assert_eq!(report.date_groups.len(), 2);
        assert_eq!(report.date_groups[0].columns, vec!["12-07", "12-07_lab"]);
    }

    #[test]
    fn test_bad_date_column_fails() {
        let lecture = parse_delimited("Roll. No,Student Name,12-07,Remarks\n1,Asha,P,ok\n", b',').unwrap();
        let lab = parse_delimited("Roll. No,Student Name\n1,Asha\n", b',').unwrap();

        let err = run_attendance(&lecture, &lab).unwrap_err();
        assert!(matches!(err, AttendanceError::DateParse { ref column, .. } if column == "Remarks"));
    }

    #[test]
    fn test_missing_key_fails_before_merge() {
        let lecture = parse_delimited("Roll. No,12-07\n1,P\n", b',').unwrap();
        let (_, lab) = sheets();
        assert!(matches!(
            run_attendance(&lecture, &lab),
            Err(AttendanceError::KeyMismatch { .. })
        ));
    }

    #[test]
    fn test_files_end_to_end() {
        let dir = tempdir().unwrap();
        let lecture = dir.path().join("lecture.csv");
        let lab = dir.path().join("lab.csv");
        let output = dir.path().join("out.xlsx");
        fs::write(&lecture, LECTURE).unwrap();
        fs::write(&lab, LAB).unwrap();

        let report = process_attendance_files(&lecture, &lab, &output).unwrap();
        let written = load_bytes(&fs::read(&output).unwrap(), TableFormat::Spreadsheet).unwrap();
        assert_eq!(written, report.table);
    }

    #[test]
    fn test_no_output_on_failure() {
        let dir = tempdir().unwrap();
        let lecture = dir.path().join("lecture.csv");
        let lab = dir.path().join("lab.csv");
        let output = dir.path().join("out.xlsx");
        fs::write(&lecture, "Roll. No,Student Name,Notes\n1,Asha,hi\n").unwrap();
        fs::write(&lab, LAB).unwrap();

        let err = process_attendance_files(&lecture, &lab, &output).unwrap_err();
        assert!(matches!(err, PipelineError::Attendance(AttendanceError::DateParse { .. })));
        assert!(!output.exists());
    }

    #[test]
    fn test_default_output_name() {
        let now = Local.with_ymd_and_hms(2024, 7, 13, 9, 5, 0).unwrap();
        assert_eq!(default_output_name(now), "styled_final_20240713_090500.xlsx");
    }
}

//! Key merge of the primary (lecture) and secondary (lab) sheets.

use crate::error::{AttendanceError, AttendanceResult};
use crate::join::{join, JoinSpec, JoinType};
use crate::table::Table;

/// Roll number key column.
pub const ROLL_NO: &str = "Roll. No";

/// Student name key column.
pub const STUDENT_NAME: &str = "Student Name";

/// Key columns identifying a student, in output order.
pub const KEY_COLUMNS: [&str; 2] = [ROLL_NO, STUDENT_NAME];

/// Tag appended to every non-key column of the secondary sheet.
pub const LAB_SUFFIX: &str = "_lab";

/// Fail unless `table` carries both key columns.
pub fn check_keys(table: &Table, label: &str) -> AttendanceResult<()> {
    let missing: Vec<String> = KEY_COLUMNS
        .iter()
        .filter(|key| !table.columns.iter().any(|c| c.trim() == **key))
        .map(|key| key.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AttendanceError::KeyMismatch {
            table: label.to_string(),
            missing,
        })
    }
}

fn is_key(name: &str) -> bool {
    KEY_COLUMNS.contains(&name)
}

/// Tag the secondary sheet's columns, then inner-join both sheets on the keys.
///
/// Rows whose keys appear in only one sheet are dropped.
pub fn merge_on_keys(primary: &Table, secondary: &Table) -> AttendanceResult<Table> {
    check_keys(primary, "primary")?;
    check_keys(secondary, "secondary")?;

    let mut primary = primary.clone();
    primary.rename_columns(|c| c.trim().to_string());

    let mut secondary = secondary.clone();
    secondary.rename_columns(|c| {
        let name = c.trim();
        if is_key(name) {
            name.to_string()
        } else {
            format!("{}{}", name, LAB_SUFFIX)
        }
    });

    let mut merged = join(&primary, &secondary, &JoinSpec::on(&KEY_COLUMNS, JoinType::Inner))?;
    merged.rename_columns(|c| c.trim().to_string());
    Ok(merged)
}

/// Non-key columns of a merged table, in table order.
pub fn data_columns(table: &Table) -> Vec<String> {
    table
        .columns
        .iter()
        .filter(|c| !is_key(c))
        .cloned()
        .collect()
}

//! Column projection over a joined table.

use crate::error::{JoinError, JoinResult};
use crate::table::Table;

/// Keep exactly `selected`, in that order, preserving every row.
pub fn project<S: AsRef<str>>(table: &Table, selected: &[S]) -> JoinResult<Table> {
    if selected.is_empty() {
        return Err(JoinError::Spec("Please select at least one column".to_string()));
    }

    let positions = selected
        .iter()
        .map(|name| {
            let name = name.as_ref();
            table
                .column_index(name)
                .ok_or_else(|| JoinError::UnknownColumn(name.to_string()))
        })
        .collect::<JoinResult<Vec<usize>>>()?;

    let columns = positions.iter().map(|&i| table.columns[i].clone()).collect();
    let rows = table
        .rows
        .iter()
        .map(|row| positions.iter().map(|&i| row[i].clone()).collect())
        .collect();

    Ok(Table { columns, rows })
}

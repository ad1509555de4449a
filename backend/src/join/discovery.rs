//! Column discovery across the two join inputs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::table::Table;

/// Columns of each side and the names they share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDiscovery {
    pub left_columns: Vec<String>,
    pub right_columns: Vec<String>,
    /// Shared names, in left-table order.
    pub common_columns: Vec<String>,
}

/// Intersect column names of `left` and `right`.
pub fn discover_columns(left: &Table, right: &Table) -> ColumnDiscovery {
    let right_names: HashSet<&str> = right.columns.iter().map(String::as_str).collect();
    let common_columns = left
        .columns
        .iter()
        .filter(|c| right_names.contains(c.as_str()))
        .cloned()
        .collect();

    ColumnDiscovery {
        left_columns: left.columns.clone(),
        right_columns: right.columns.clone(),
        common_columns,
    }
}

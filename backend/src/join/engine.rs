//! Multi-column equality join.
//!
//! Rows match when every key pair compares equal on [`CellValue::key`]:
//! canonical text, integral floats printed as integers, text compared
//! exactly. Empty key cells never match.
//!
//! Output schema is all left columns followed by all right columns. A key
//! pair with the same name on both sides collapses into one column whose
//! value comes from whichever side is present. Any other name shared by both
//! sides is suffixed `_x` on the left and `_y` on the right; if that name is
//! already taken the suffix repeats until it is unique.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{JoinError, JoinResult};
use crate::table::{CellValue, Table};

/// Which unmatched rows survive the join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Outer,
}

impl FromStr for JoinType {
    type Err = JoinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inner" => Ok(JoinType::Inner),
            "left" => Ok(JoinType::Left),
            "right" => Ok(JoinType::Right),
            "outer" | "full" => Ok(JoinType::Outer),
            other => Err(JoinError::Spec(format!("Unknown join type: {}", other))),
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
            JoinType::Right => "right",
            JoinType::Outer => "outer",
        };
        f.write_str(name)
    }
}

/// Key columns on each side plus the join type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSpec {
    pub left_columns: Vec<String>,
    pub right_columns: Vec<String>,
    #[serde(default)]
    pub join_type: JoinType,
}

impl JoinSpec {
    pub fn new(left_columns: Vec<String>, right_columns: Vec<String>, join_type: JoinType) -> Self {
        Self {
            left_columns,
            right_columns,
            join_type,
        }
    }

    /// Same key names on both sides.
    pub fn on(columns: &[&str], join_type: JoinType) -> Self {
        let names: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        Self::new(names.clone(), names, join_type)
    }

    /// Check list lengths and that every key exists in its table.
    pub fn validate(&self, left: &Table, right: &Table) -> JoinResult<()> {
        if self.left_columns.is_empty() || self.right_columns.is_empty() {
            return Err(JoinError::Spec("Please select columns to join on".to_string()));
        }
        if self.left_columns.len() != self.right_columns.len() {
            return Err(JoinError::Spec(format!(
                "Number of selected columns must match ({} left, {} right)",
                self.left_columns.len(),
                self.right_columns.len()
            )));
        }
        for name in &self.left_columns {
            if !left.has_column(name) {
                return Err(JoinError::Spec(format!("Left table has no column '{}'", name)));
            }
        }
        for name in &self.right_columns {
            if !right.has_column(name) {
                return Err(JoinError::Spec(format!("Right table has no column '{}'", name)));
            }
        }
        Ok(())
    }
}

/// Where an output column takes its value from.
#[derive(Debug, Clone, Copy)]
enum Source {
    Left(usize),
    Right(usize),
    Coalesce(usize, usize),
}

/// Join `left` and `right` according to `spec`.
pub fn join(left: &Table, right: &Table, spec: &JoinSpec) -> JoinResult<Table> {
    spec.validate(left, right)?;

    let left_keys = indices(left, &spec.left_columns);
    let right_keys = indices(right, &spec.right_columns);
    let (columns, sources) = output_schema(left, right, &left_keys, &right_keys);

    let pairs = match spec.join_type {
        JoinType::Right => {
            let left_index = build_index(left, &left_keys);
            let mut pairs = Vec::new();
            for (r, row) in right.rows.iter().enumerate() {
                match row_key(row, &right_keys).and_then(|k| left_index.get(&k)) {
                    Some(matches) => pairs.extend(matches.iter().map(|&l| (Some(l), Some(r)))),
                    None => pairs.push((None, Some(r))),
                }
            }
            pairs
        }
        join_type => {
            let right_index = build_index(right, &right_keys);
            let keep_left = matches!(join_type, JoinType::Left | JoinType::Outer);
            let mut matched_right = vec![false; right.rows.len()];
            let mut pairs = Vec::new();

            for (l, row) in left.rows.iter().enumerate() {
                match row_key(row, &left_keys).and_then(|k| right_index.get(&k)) {
                    Some(matches) => {
                        for &r in matches {
                            matched_right[r] = true;
                            pairs.push((Some(l), Some(r)));
                        }
                    }
                    None if keep_left => pairs.push((Some(l), None)),
                    None => {}
                }
            }

            if join_type == JoinType::Outer {
                pairs.extend(
                    matched_right
                        .iter()
                        .enumerate()
                        .filter(|(_, seen)| !**seen)
                        .map(|(r, _)| (None, Some(r))),
                );
            }
            pairs
        }
    };

    let rows = pairs
        .into_iter()
        .map(|(l, r)| materialize(left, right, &sources, l, r))
        .collect();

    Ok(Table::new(columns, rows))
}

fn indices(table: &Table, names: &[String]) -> Vec<usize> {
    names
        .iter()
        .filter_map(|name| table.column_index(name))
        .collect()
}

fn row_key(row: &[CellValue], key_indices: &[usize]) -> Option<Vec<String>> {
    key_indices.iter().map(|&i| row.get(i).and_then(CellValue::key)).collect()
}

fn build_index(table: &Table, key_indices: &[usize]) -> HashMap<Vec<String>, Vec<usize>> {
    let mut index: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        if let Some(key) = row_key(row, key_indices) {
            index.entry(key).or_default().push(i);
        }
    }
    index
}

fn output_schema(
    left: &Table,
    right: &Table,
    left_keys: &[usize],
    right_keys: &[usize],
) -> (Vec<String>, Vec<Source>) {
    // Right key columns folded into a same-named left key column.
    let mut coalesced: HashMap<usize, usize> = HashMap::new();
    for (&l, &r) in left_keys.iter().zip(right_keys) {
        if left.columns[l] == right.columns[r] && !coalesced.values().any(|&seen| seen == r) {
            coalesced.entry(l).or_insert(r);
        }
    }
    let folded_right: HashSet<usize> = coalesced.values().copied().collect();

    let right_names: HashSet<&str> = right
        .columns
        .iter()
        .enumerate()
        .filter(|(i, _)| !folded_right.contains(i))
        .map(|(_, c)| c.as_str())
        .collect();
    let left_names: HashSet<&str> = left
        .columns
        .iter()
        .enumerate()
        .filter(|(i, _)| !coalesced.contains_key(i))
        .map(|(_, c)| c.as_str())
        .collect();

    // (candidate name, renamed for a collision, suffix to repeat if taken)
    let mut candidates: Vec<(String, bool, &str)> = Vec::new();
    let mut sources = Vec::new();

    for (i, name) in left.columns.iter().enumerate() {
        if let Some(&r) = coalesced.get(&i) {
            candidates.push((name.clone(), false, "_x"));
            sources.push(Source::Coalesce(i, r));
        } else if right_names.contains(name.as_str()) {
            candidates.push((format!("{}_x", name), true, "_x"));
            sources.push(Source::Left(i));
        } else {
            candidates.push((name.clone(), false, "_x"));
            sources.push(Source::Left(i));
        }
    }

    for (i, name) in right.columns.iter().enumerate() {
        if folded_right.contains(&i) {
            continue;
        }
        if left_names.contains(name.as_str()) {
            candidates.push((format!("{}_y", name), true, "_y"));
        } else {
            candidates.push((name.clone(), false, "_y"));
        }
        sources.push(Source::Right(i));
    }

    (unique_names(candidates), sources)
}

/// Resolve candidates to distinct names.
///
/// Names kept from the sources are claimed first; suffixed names and repeats
/// extend their suffix until they no longer clash.
fn unique_names(candidates: Vec<(String, bool, &str)>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    let claimed: Vec<bool> = candidates
        .iter()
        .map(|(name, renamed, _)| !renamed && used.insert(name.clone()))
        .collect();

    candidates
        .into_iter()
        .zip(claimed)
        .map(|((mut name, _, suffix), claimed)| {
            if !claimed {
                while used.contains(&name) {
                    name.push_str(suffix);
                }
                used.insert(name.clone());
            }
            name
        })
        .collect()
}

fn materialize(
    left: &Table,
    right: &Table,
    sources: &[Source],
    l: Option<usize>,
    r: Option<usize>,
) -> Vec<CellValue> {
    let left_cell = |c: usize| l.and_then(|i| left.rows[i].get(c)).cloned();
    let right_cell = |c: usize| r.and_then(|i| right.rows[i].get(c)).cloned();

    sources
        .iter()
        .map(|source| {
            let cell = match *source {
                Source::Left(c) => left_cell(c),
                Source::Right(c) => right_cell(c),
                Source::Coalesce(lc, rc) => left_cell(lc).or_else(|| right_cell(rc)),
            };
            cell.unwrap_or(CellValue::Empty)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn students() -> Table {
        Table::new(
            vec!["id".into(), "name".into(), "city".into()],
            vec![
                vec![CellValue::Int(1), "Asha".into(), "Pune".into()],
                vec![CellValue::Int(2), "Ravi".into(), "Goa".into()],
                vec![CellValue::Int(3), "Mina".into(), "Agra".into()],
            ],
        )
    }

    fn grades() -> Table {
        Table::new(
            vec!["student_id".into(), "grade".into(), "city".into()],
            vec![
                vec![CellValue::Float(2.0), "A".into(), "Goa".into()],
                vec![CellValue::text("3"), "B".into(), "Agra".into()],
                vec![CellValue::Int(4), "C".into(), "Delhi".into()],
            ],
        )
    }

    fn spec(join_type: JoinType) -> JoinSpec {
        JoinSpec::new(vec!["id".into()], vec!["student_id".into()], join_type)
    }

    #[test]
    fn test_inner_join() {
        let result = join(&students(), &grades(), &spec(JoinType::Inner)).unwrap();

        assert_eq!(
            result.columns,
            vec!["id", "name", "city_x", "student_id", "grade", "city_y"]
        );
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.get(0, "name"), Some(&CellValue::text("Ravi")));
        assert_eq!(result.get(1, "grade"), Some(&CellValue::text("B")));
        assert!(result.row_count() <= students().row_count().min(grades().row_count()));
    }

    #[test]
    fn test_left_join_fills_missing_right() {
        let result = join(&students(), &grades(), &spec(JoinType::Left)).unwrap();

        assert_eq!(result.row_count(), 3);
        assert_eq!(result.get(0, "name"), Some(&CellValue::text("Asha")));
        assert_eq!(result.get(0, "grade"), Some(&CellValue::Empty));
        assert_eq!(result.get(0, "student_id"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_right_join_follows_right_order() {
        let result = join(&students(), &grades(), &spec(JoinType::Right)).unwrap();

        assert_eq!(result.row_count(), 3);
        assert_eq!(result.get(0, "grade"), Some(&CellValue::text("A")));
        assert_eq!(result.get(2, "grade"), Some(&CellValue::text("C")));
        assert_eq!(result.get(2, "name"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_outer_join_keeps_everything() {
        let result = join(&students(), &grades(), &spec(JoinType::Outer)).unwrap();

        assert_eq!(result.row_count(), 4);
        assert!(result.row_count() >= students().row_count().max(grades().row_count()));
        assert_eq!(result.get(3, "student_id"), Some(&CellValue::Int(4)));
        assert_eq!(result.get(3, "id"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_same_named_keys_coalesce() {
        let right = Table::new(
            vec!["id".into(), "grade".into()],
            vec![
                vec![CellValue::Int(3), "B".into()],
                vec![CellValue::Int(9), "F".into()],
            ],
        );
        let result = join(&students(), &right, &JoinSpec::on(&["id"], JoinType::Outer)).unwrap();

        assert_eq!(result.columns, vec!["id", "name", "city", "grade"]);
        assert_eq!(result.row_count(), 4);
        assert_eq!(result.get(3, "id"), Some(&CellValue::Int(9)));
        assert_eq!(result.get(3, "name"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_multi_column_keys() {
        let left = Table::new(
            vec!["a".into(), "b".into(), "v".into()],
            vec![
                vec!["x".into(), CellValue::Int(1), "L1".into()],
                vec!["x".into(), CellValue::Int(2), "L2".into()],
            ],
        );
        let right = Table::new(
            vec!["c".into(), "d".into(), "w".into()],
            vec![
                vec!["x".into(), CellValue::Int(2), "R2".into()],
                vec!["y".into(), CellValue::Int(1), "R1".into()],
            ],
        );
        let spec = JoinSpec::new(vec!["a".into(), "b".into()], vec!["c".into(), "d".into()], JoinType::Inner);
        let result = join(&left, &right, &spec).unwrap();

        assert_eq!(result.row_count(), 1);
        assert_eq!(result.get(0, "v"), Some(&CellValue::text("L2")));
        assert_eq!(result.get(0, "w"), Some(&CellValue::text("R2")));
    }

    #[test]
    fn test_duplicate_keys_multiply() {
        let right = Table::new(
            vec!["student_id".into(), "grade".into()],
            vec![
                vec![CellValue::Int(1), "A".into()],
                vec![CellValue::Int(1), "B".into()],
            ],
        );
        let result = join(&students(), &right, &spec(JoinType::Inner)).unwrap();
        assert_eq!(result.row_count(), 2);
    }

    #[test]
    fn test_empty_keys_never_match() {
        let left = Table::new(vec!["k".into()], vec![vec![CellValue::Empty]]);
        let right = Table::new(vec!["k".into()], vec![vec![CellValue::Empty]]);
        let result = join(&left, &right, &JoinSpec::on(&["k"], JoinType::Inner)).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_disjoint_inner_is_empty_not_error() {
        let right = Table::new(
            vec!["student_id".into()],
            vec![vec![CellValue::Int(42)]],
        );
        let result = join(&students(), &right, &spec(JoinType::Inner)).unwrap();
        assert_eq!(result.row_count(), 0);
    }

    #[test]
    fn test_suffixed_names_never_clash() {
        let left = Table::new(
            vec!["k".into(), "a".into(), "a_x".into()],
            vec![vec![CellValue::Int(1), "left a".into(), "left a_x".into()]],
        );
        let right = Table::new(
            vec!["k2".into(), "a".into()],
            vec![vec![CellValue::Int(1), "right a".into()]],
        );
        let spec = JoinSpec::new(vec!["k".into()], vec!["k2".into()], JoinType::Inner);
        let result = join(&left, &right, &spec).unwrap();

        assert_eq!(result.columns, vec!["k", "a_x_x", "a_x", "k2", "a_y"]);
        let distinct: HashSet<&String> = result.columns.iter().collect();
        assert_eq!(distinct.len(), result.columns.len());

        assert_eq!(result.get(0, "a_x"), Some(&CellValue::text("left a_x")));
        assert_eq!(result.get(0, "a_x_x"), Some(&CellValue::text("left a")));
        assert_eq!(result.get(0, "a_y"), Some(&CellValue::text("right a")));
    }

    #[test]
    fn test_suffix_clash_on_right_side() {
        let left = Table::new(vec!["k".into(), "b".into()], vec![vec![CellValue::Int(1), "l".into()]]);
        let right = Table::new(
            vec!["k".into(), "b".into(), "b_y".into()],
            vec![vec![CellValue::Int(1), "r b".into(), "r b_y".into()]],
        );
        let result = join(&left, &right, &JoinSpec::on(&["k"], JoinType::Inner)).unwrap();

        assert_eq!(result.columns, vec!["k", "b_x", "b_y_y", "b_y"]);
        assert_eq!(result.get(0, "b_y"), Some(&CellValue::text("r b_y")));
    }

    #[test]
    fn test_spec_validation() {
        let mismatched = JoinSpec::new(vec!["id".into(), "name".into()], vec!["student_id".into()], JoinType::Inner);
        assert!(matches!(join(&students(), &grades(), &mismatched), Err(JoinError::Spec(_))));

        let empty = JoinSpec::new(vec![], vec![], JoinType::Inner);
        assert!(matches!(join(&students(), &grades(), &empty), Err(JoinError::Spec(_))));

        let unknown = JoinSpec::new(vec!["nope".into()], vec!["student_id".into()], JoinType::Inner);
        assert!(matches!(join(&students(), &grades(), &unknown), Err(JoinError::Spec(_))));
    }

    #[test]
    fn test_join_type_parsing() {
        assert_eq!("LEFT".parse::<JoinType>().unwrap(), JoinType::Left);
        assert_eq!("outer".parse::<JoinType>().unwrap(), JoinType::Outer);
        assert!("cross".parse::<JoinType>().is_err());

        let spec: JoinSpec = serde_json::from_value(serde_json::json!({
            "leftColumns": ["id"],
            "rightColumns": ["student_id"],
            "joinType": "right"
        }))
        .unwrap();
        assert_eq!(spec.join_type, JoinType::Right);
    }
}

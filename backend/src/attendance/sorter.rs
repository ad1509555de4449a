//! Chronological ordering of date-named attendance columns.
//!
//! A column name starts with a `DD-MM` date, optionally followed by a
//! `.N` session suffix (only the first character after the dot counts) or
//! the `_lab` tag. Columns sort by month, then day, then session, and ties
//! keep their original relative order.
//!
//! Every non-key column must parse. A column that doesn't is a hard
//! [`AttendanceError::DateParse`], both for sorting and for the date-group
//! index, so neither view can silently drop data.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{AttendanceError, AttendanceResult};

/// Sort key extracted from a column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionKey {
    pub month: u32,
    pub day: u32,
    pub session: u32,
}

impl SessionKey {
    /// `DD-MM` label of the calendar date.
    pub fn date_label(&self) -> String {
        format!("{:02}-{:02}", self.day, self.month)
    }
}

fn date_error(column: &str, reason: impl Into<String>) -> AttendanceError {
    AttendanceError::DateParse {
        column: column.to_string(),
        reason: reason.into(),
    }
}

/// Parse the sort key of one column name.
pub fn parse_session_key(column: &str) -> AttendanceResult<SessionKey> {
    let (base, session) = match column.split_once('.') {
        Some((base, suffix)) => {
            if suffix.contains('.') {
                return Err(date_error(column, "more than one '.' in name"));
            }
            let session = suffix
                .chars()
                .next()
                .and_then(|c| c.to_digit(10))
                .ok_or_else(|| date_error(column, "session suffix must start with a digit"))?;
            (base, session)
        }
        None => (column, 0),
    };

    let prefix: String = base.chars().take(5).collect();
    let mut parts = prefix.split('-');
    let (day, month) = match (parts.next(), parts.next(), parts.next()) {
        (Some(day), Some(month), None) => (
            day.trim().parse::<u32>().map_err(|_| date_error(column, "day is not a number"))?,
            month.trim().parse::<u32>().map_err(|_| date_error(column, "month is not a number"))?,
        ),
        _ => return Err(date_error(column, "expected a DD-MM prefix")),
    };

    // Leap year so 29-02 is accepted.
    if NaiveDate::from_ymd_opt(2000, month, day).is_none() {
        return Err(date_error(column, format!("{:02}-{:02} is not a calendar day", day, month)));
    }

    Ok(SessionKey { month, day, session })
}

/// Order date columns chronologically (stable on equal keys).
pub fn sort_date_columns<S: AsRef<str>>(columns: &[S]) -> AttendanceResult<Vec<String>> {
    let mut keyed = columns
        .iter()
        .map(|c| parse_session_key(c.as_ref()).map(|key| (key, c.as_ref().to_string())))
        .collect::<AttendanceResult<Vec<_>>>()?;

    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, name)| name).collect())
}

/// Columns recorded on one calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateGroup {
    /// `DD-MM`
    pub date: String,
    pub columns: Vec<String>,
}

/// Group columns by calendar date, chronologically.
pub fn group_by_date<S: AsRef<str>>(columns: &[S]) -> AttendanceResult<Vec<DateGroup>> {
    let mut groups: BTreeMap<(u32, u32), DateGroup> = BTreeMap::new();

    for column in columns {
        let column = column.as_ref();
        let key = parse_session_key(column)?;
        groups
            .entry((key.month, key.day))
            .or_insert_with(|| DateGroup {
                date: key.date_label(),
                columns: Vec::new(),
            })
            .columns
            .push(column.to_string());
    }

    Ok(groups.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_suffix_order() {
        let sorted = sort_date_columns(&["13-07.2", "12-07", "13-07.1"]).unwrap();
        assert_eq!(sorted, vec!["12-07", "13-07.1", "13-07.2"]);
    }

    #[test]
    fn test_month_before_day() {
        let sorted = sort_date_columns(&["01-08", "31-07", "15-07"]).unwrap();
        assert_eq!(sorted, vec!["15-07", "31-07", "01-08"]);
    }

    #[test]
    fn test_lab_columns_interleave() {
        let sorted = sort_date_columns(&["13-07", "12-07_lab", "12-07", "13-07.1_lab"]).unwrap();
        assert_eq!(sorted, vec!["12-07_lab", "12-07", "13-07", "13-07.1_lab"]);
    }

    #[test]
    fn test_ties_are_stable() {
        let sorted = sort_date_columns(&["12-07_lab", "12-07"]).unwrap();
        assert_eq!(sorted, vec!["12-07_lab", "12-07"]);
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(
            parse_session_key("13-07.2").unwrap(),
            SessionKey { month: 7, day: 13, session: 2 }
        );
        assert_eq!(parse_session_key("13-07.1_lab").unwrap().session, 1);
        assert_eq!(parse_session_key("05-11_lab").unwrap().session, 0);
        assert_eq!(parse_session_key("29-02").unwrap().month, 2);
    }

    #[test]
    fn test_unparseable_columns_fail() {
        for bad in ["Remarks", "12-07.", "12-07.a", "1-2-3", "31-02", "12-13", "1.2.3"] {
            let err = sort_date_columns(&["12-07", bad]).unwrap_err();
            assert!(
                matches!(err, AttendanceError::DateParse { ref column, .. } if column == bad),
                "{} should fail",
                bad
            );
        }
    }

    #[test]
    fn test_group_by_date() {
        let groups = group_by_date(&["13-07", "12-07", "13-07.1", "12-07_lab"]).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].date, "12-07");
        assert_eq!(groups[0].columns, vec!["12-07", "12-07_lab"]);
        assert_eq!(groups[1].columns, vec!["13-07", "13-07.1"]);
    }

    #[test]
    fn test_group_by_date_fails_like_sort() {
        assert!(group_by_date(&["12-07", "Total"]).is_err());
    }
}

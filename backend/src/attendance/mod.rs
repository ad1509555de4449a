//! Attendance merger.
//!
//! Combines a primary (lecture) and a secondary (lab) attendance sheet into
//! one styled workbook:
//! - [`merge`]: key check, `_lab` tagging and inner join on the key columns
//! - [`sorter`]: chronological order of `DD-MM[.N]` columns
//! - [`renumber`]: per-row session counts that skip absences
//! - [`styler`]: lab highlight and absence emphasis
//! - [`pipeline`]: the stages wired together

pub mod merge;
pub mod pipeline;
pub mod renumber;
pub mod sorter;
pub mod styler;

pub use merge::{merge_on_keys, KEY_COLUMNS, LAB_SUFFIX, ROLL_NO, STUDENT_NAME};
pub use pipeline::{default_output_name, process_attendance_files, run_attendance, AttendanceReport};
pub use renumber::{renumber, renumber_row, AttendanceCell, ABSENT_MARKER};
pub use sorter::{group_by_date, parse_session_key, sort_date_columns, DateGroup, SessionKey};
pub use styler::style_attendance;

//! Error types for the sheetmerge pipelines.
//!
//! One enum per layer:
//!
//! - [`TableError`] - loading and writing tabular files
//! - [`AttendanceError`] - key merge and date-column sorting
//! - [`JoinError`] - join specification and projection
//! - [`WorkspaceError`] - per-job working files and session state
//! - [`PipelineError`] - top-level wrapper returned at the pipeline boundary
//! - [`ServerError`] - HTTP server startup
//!
//! `From` conversions let `?` cross layer boundaries. At the boundary every
//! [`PipelineError`] is flattened into an [`ErrorDescriptor`] (kind + message)
//! for the caller. None of these are transient, so nothing is retried.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Table Errors
// =============================================================================

/// Errors while reading or writing a table.
#[derive(Debug, Error)]
pub enum TableError {
    /// Failed to read or write a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Source is not parseable as tabular data.
    #[error("Invalid tabular data: {0}")]
    Format(String),

    /// Source has no content at all.
    #[error("File is empty")]
    EmptyFile,

    /// No header row could be read.
    #[error("No header row found")]
    NoHeaders,

    /// Workbook could not be produced.
    #[error("Failed to write workbook: {0}")]
    Write(String),
}

impl From<csv::Error> for TableError {
    fn from(err: csv::Error) -> Self {
        match err.kind() {
            csv::ErrorKind::Io(_) => TableError::Format(format!("Cannot read delimited text: {}", err)),
            _ => TableError::Format(err.to_string()),
        }
    }
}

impl From<calamine::Error> for TableError {
    fn from(err: calamine::Error) -> Self {
        TableError::Format(format!("Cannot read spreadsheet: {}", err))
    }
}

impl From<rust_xlsxwriter::XlsxError> for TableError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        TableError::Write(err.to_string())
    }
}

// =============================================================================
// Attendance Errors
// =============================================================================

/// Errors raised by the attendance merge and sort stages.
#[derive(Debug, Error)]
pub enum AttendanceError {
    /// A source table lacks one or both key columns.
    #[error("{table} table is missing key column(s): {}", missing.join(", "))]
    KeyMismatch { table: String, missing: Vec<String> },

    /// A non-key column name does not start with a `DD-MM` date.
    #[error("Column '{column}' is not a date column: {reason}")]
    DateParse { column: String, reason: String },

    /// The underlying key join failed.
    #[error("Merge failed: {0}")]
    Merge(#[from] JoinError),
}

// =============================================================================
// Join Errors
// =============================================================================

/// Errors raised by the join engine and the column projector.
#[derive(Debug, Error)]
pub enum JoinError {
    /// Join specification is unusable (lengths, unknown key names, empty selection).
    #[error("Invalid join specification: {0}")]
    Spec(String),

    /// Projection asked for a column the joined table does not have.
    #[error("Unknown column: {0}")]
    UnknownColumn(String),
}

// =============================================================================
// Workspace Errors
// =============================================================================

/// Errors from the per-job working area.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Filesystem failure.
    #[error("Workspace I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Working file could not be (de)serialized.
    #[error("Workspace JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required upload has not been provided for this job.
    #[error("Please upload the {0} file first")]
    MissingUpload(String),

    /// No joined table is stored for this job.
    #[error("No joined table available")]
    NoJoinedTable,

    /// Job id is unknown or its files are gone.
    #[error("Unknown job: {0}")]
    UnknownJob(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level error returned by both pipelines.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Loading or writing failed.
    #[error("Table error: {0}")]
    Table(#[from] TableError),

    /// Attendance merge or sort failed.
    #[error("Attendance error: {0}")]
    Attendance(#[from] AttendanceError),

    /// Join or projection failed.
    #[error("Join error: {0}")]
    Join(#[from] JoinError),

    /// Working files or session state failed.
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
}

/// Category of a pipeline failure, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Format,
    KeyMismatch,
    DateParse,
    JoinSpec,
    UnknownColumn,
    MissingInput,
    Io,
}

/// Structured error handed to the caller at the pipeline boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
}

impl PipelineError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Table(TableError::Io(_)) => ErrorKind::Io,
            PipelineError::Table(TableError::Write(_)) => ErrorKind::Io,
            PipelineError::Table(_) => ErrorKind::Format,
            PipelineError::Attendance(AttendanceError::KeyMismatch { .. }) => ErrorKind::KeyMismatch,
            PipelineError::Attendance(AttendanceError::DateParse { .. }) => ErrorKind::DateParse,
            PipelineError::Attendance(AttendanceError::Merge(e)) => join_kind(e),
            PipelineError::Join(e) => join_kind(e),
            PipelineError::Workspace(WorkspaceError::Io(_)) => ErrorKind::Io,
            PipelineError::Workspace(WorkspaceError::Json(_)) => ErrorKind::Io,
            PipelineError::Workspace(_) => ErrorKind::MissingInput,
        }
    }

    /// Flatten into the caller-facing descriptor.
    pub fn descriptor(&self) -> ErrorDescriptor {
        ErrorDescriptor {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

fn join_kind(err: &JoinError) -> ErrorKind {
    match err {
        JoinError::Spec(_) => ErrorKind::JoinSpec,
        JoinError::UnknownColumn(_) => ErrorKind::UnknownColumn,
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind or serve.
    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Working directory could not be prepared.
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for table operations.
pub type TableResult<T> = Result<T, TableError>;

/// Result type for attendance operations.
pub type AttendanceResult<T> = Result<T, AttendanceError>;

/// Result type for join operations.
pub type JoinResult<T> = Result<T, JoinError>;

/// Result type for workspace operations.
pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let table_err = TableError::EmptyFile;
        let pipeline_err: PipelineError = table_err.into();
        assert!(pipeline_err.to_string().contains("empty"));
        assert_eq!(pipeline_err.kind(), ErrorKind::Format);

        let join_err = JoinError::UnknownColumn("Grade".into());
        let pipeline_err: PipelineError = join_err.into();
        assert!(pipeline_err.to_string().contains("Grade"));
        assert_eq!(pipeline_err.kind(), ErrorKind::UnknownColumn);
    }

    #[test]
    fn test_key_mismatch_message() {
        let err = AttendanceError::KeyMismatch {
            table: "lab".into(),
            missing: vec!["Student Name".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("lab"));
        assert!(msg.contains("Student Name"));

        let descriptor = PipelineError::from(err).descriptor();
        assert_eq!(descriptor.kind, ErrorKind::KeyMismatch);
    }

    #[test]
    fn test_descriptor_serializes_camel_case() {
        let descriptor = PipelineError::from(JoinError::Spec("no columns".into())).descriptor();
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["kind"], "joinSpec");
        assert!(json["message"].as_str().unwrap().contains("no columns"));
    }

    #[test]
    fn test_missing_upload_is_missing_input() {
        let err: PipelineError = WorkspaceError::MissingUpload("right".into()).into();
        assert_eq!(err.kind(), ErrorKind::MissingInput);
        assert!(err.to_string().contains("right"));
    }
}

//! REST API request and response types.

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::attendance::DateGroup;
use crate::error::{ErrorDescriptor, ErrorKind, PipelineError};
use crate::join::JoinOutcome;
use crate::table::TableSummary;
use crate::workspace::Role;

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<Value>);

/// Response after an attendance merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceResponse {
    pub job_id: String,
    pub status: String,
    /// Name the workbook will be downloaded as.
    pub file_name: String,
    pub download_url: String,
    pub summary: TableSummary,
    pub date_groups: Vec<DateGroup>,
}

/// Response after one joiner upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub job_id: String,
    pub role: Role,
    pub file_name: String,
    #[serde(flatten)]
    pub summary: TableSummary,
}

/// Response after a join.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub job_id: String,
    #[serde(flatten)]
    pub outcome: JoinOutcome,
}

/// Body of `POST /api/joiner/{job_id}/download`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub selected_columns: Vec<String>,
}

/// HTTP status for a failure category.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::MissingInput => StatusCode::NOT_FOUND,
        ErrorKind::Format
        | ErrorKind::KeyMismatch
        | ErrorKind::DateParse
        | ErrorKind::JoinSpec
        | ErrorKind::UnknownColumn => StatusCode::BAD_REQUEST,
    }
}

/// Create an error response body
pub fn error_response(descriptor: &ErrorDescriptor) -> Value {
    json!({
        "status": "error",
        "error": descriptor,
    })
}

/// Error for a malformed request that never reached a pipeline.
pub fn bad_request(message: impl Into<String>) -> ApiError {
    let descriptor = ErrorDescriptor {
        kind: ErrorKind::MissingInput,
        message: message.into(),
    };
    (StatusCode::BAD_REQUEST, Json(error_response(&descriptor)))
}

/// Error for a request overtaken by a concurrent change to the same job.
pub fn conflict(message: impl Into<String>) -> ApiError {
    let descriptor = ErrorDescriptor {
        kind: ErrorKind::MissingInput,
        message: message.into(),
    };
    (StatusCode::CONFLICT, Json(error_response(&descriptor)))
}

/// Error for a failure outside any pipeline (worker panic, lost task).
pub fn internal_error(message: impl Into<String>) -> ApiError {
    let descriptor = ErrorDescriptor {
        kind: ErrorKind::Io,
        message: message.into(),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(error_response(&descriptor)))
}

/// Error for a pipeline failure.
pub fn pipeline_error(err: PipelineError) -> ApiError {
    let descriptor = err.descriptor();
    (status_for(descriptor.kind), Json(error_response(&descriptor)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{JoinError, WorkspaceError};

    #[test]
    fn test_status_mapping() {
        let (status, _) = pipeline_error(JoinError::UnknownColumn("city".into()).into());
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = pipeline_error(WorkspaceError::UnknownJob("abc".into()).into());
        assert_eq!(status, StatusCode::NOT_FOUND);

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let (status, _) = pipeline_error(WorkspaceError::Io(io).into());
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_conflict_status() {
        let (status, Json(body)) = conflict("uploads changed");
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["message"], "uploads changed");
    }

    #[test]
    fn test_error_body() {
        let (_, Json(body)) = pipeline_error(JoinError::Spec("no key columns".into()).into());
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"]["kind"], "joinSpec");
        assert!(body["error"]["message"].as_str().unwrap().contains("no key columns"));
    }

    #[test]
    fn test_download_request_field_name() {
        let req: DownloadRequest = serde_json::from_str(r#"{"selectedColumns":["name","grade"]}"#).unwrap();
        assert_eq!(req.selected_columns, vec!["name", "grade"]);
    }

    #[test]
    fn test_join_response_is_flat() {
        let response = JoinResponse {
            job_id: "job".into(),
            outcome: JoinOutcome {
                summary: crate::table::Table::default().summary(5),
                warning: None,
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["jobId"], "job");
        assert_eq!(json["rowCount"], 0);
        assert!(json.get("warning").is_none());
    }
}

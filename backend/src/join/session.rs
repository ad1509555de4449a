//! Join session operations.
//!
//! The HTTP-independent half of the joiner: each operation takes the job's
//! [`UploadRegistry`] by reference and, when state changes, returns the new
//! registry for the caller to keep.

use serde::{Deserialize, Serialize};

use crate::api::logs::{log_info, log_success, log_warning};
use crate::error::PipelineResult;
use crate::parser::{load_bytes, load_path, TableFormat};
use crate::table::{Table, TableSummary};
use crate::workspace::{JobWorkspace, Role, UploadRegistry};
use crate::writer::to_xlsx_bytes;

use super::discovery::{discover_columns as intersect_columns, ColumnDiscovery};
use super::engine::{join, JoinSpec};
use super::projector::project;

/// Warning attached to a join that matched nothing.
pub const EMPTY_JOIN_WARNING: &str = "Join returned no rows";

/// Result of [`execute_join`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinOutcome {
    #[serde(flatten)]
    pub summary: TableSummary,
    /// Set when the join produced no rows. Not an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Parse an uploaded file, save it under the job, and register it for `role`.
pub fn load_table(
    workspace: &JobWorkspace,
    registry: &UploadRegistry,
    role: Role,
    file_name: &str,
    bytes: &[u8],
    preview_rows: usize,
) -> PipelineResult<(UploadRegistry, TableSummary)> {
    let table = load_bytes(bytes, TableFormat::detect(Some(file_name), bytes))?;
    let upload = workspace.store_upload(registry.job_id(), role, file_name, bytes)?;
    log_success(format!(
        "{} file '{}': {} rows, {} columns",
        role,
        upload.file_name,
        table.row_count(),
        table.columns.len()
    ));

    Ok((registry.with_upload(upload), table.summary(preview_rows)))
}

fn load_role(registry: &UploadRegistry, role: Role) -> PipelineResult<Table> {
    let upload = registry.upload(role)?;
    Ok(load_path(&upload.path)?)
}

/// Columns of both uploads and the names they share.
pub fn discover_columns(registry: &UploadRegistry) -> PipelineResult<ColumnDiscovery> {
    let left = load_role(registry, Role::Left)?;
    let right = load_role(registry, Role::Right)?;
    Ok(intersect_columns(&left, &right))
}

/// Join both uploads; a non-empty result is kept as the job's joined table.
pub fn execute_join(
    workspace: &JobWorkspace,
    registry: &UploadRegistry,
    spec: &JoinSpec,
    preview_rows: usize,
) -> PipelineResult<(UploadRegistry, JoinOutcome)> {
    let left = load_role(registry, Role::Left)?;
    let right = load_role(registry, Role::Right)?;

    log_info(format!(
        "🔗 {} join on [{}] = [{}]",
        spec.join_type,
        spec.left_columns.join(", "),
        spec.right_columns.join(", ")
    ));
    let joined = join(&left, &right, spec)?;

    if joined.is_empty() {
        log_warning(EMPTY_JOIN_WARNING);
        let outcome = JoinOutcome {
            summary: joined.summary(preview_rows),
            warning: Some(EMPTY_JOIN_WARNING.to_string()),
        };
        return Ok((registry.without_joined(), outcome));
    }

    let path = workspace.save_joined(registry.job_id(), &joined)?;
    log_success(format!("Joined table: {} rows, {} columns", joined.row_count(), joined.columns.len()));

    let outcome = JoinOutcome {
        summary: joined.summary(preview_rows),
        warning: None,
    };
    Ok((registry.with_joined(path), outcome))
}

/// Project the joined table onto `selected` and render it as a workbook.
pub fn project_and_export<S: AsRef<str>>(
    workspace: &JobWorkspace,
    registry: &UploadRegistry,
    selected: &[S],
) -> PipelineResult<Vec<u8>> {
    let joined: Table = workspace.load_json(registry.joined_path()?)?;
    let projected = project(&joined, selected)?;
    log_info(format!("📦 Exporting {} columns, {} rows", projected.columns.len(), projected.row_count()));
    Ok(to_xlsx_bytes(&projected, None)?)
}

/// Discard every working file of the job.
pub fn reset(workspace: &JobWorkspace, registry: &UploadRegistry) -> PipelineResult<()> {
    workspace.remove_job(registry.job_id())?;
    log_info(format!("🗑️  Job {} reset", registry.job_id()));
    Ok(())
}

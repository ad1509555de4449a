//! HTTP Server for the sheetmerge API.
//!
//! # API Endpoints
//!
//! | Method | Path                               | Description                         |
//! |--------|------------------------------------|-------------------------------------|
//! | GET    | `/health`                          | Health check                        |
//! | GET    | `/api/logs`                        | SSE stream for real-time logs       |
//! | POST   | `/api/attendance`                  | Merge `lecture` + `lab` sheets      |
//! | GET    | `/api/attendance/{job_id}/download`| Styled workbook (job removed after) |
//! | POST   | `/api/joiner/upload`               | Upload a left or right table        |
//! | GET    | `/api/joiner/{job_id}/columns`     | Column discovery                    |
//! | POST   | `/api/joiner/{job_id}/join`        | Run a join                          |
//! | POST   | `/api/joiner/{job_id}/download`    | Export selected columns             |
//! | POST   | `/api/joiner/{job_id}/reset`       | Discard the job                     |

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, Method},
    response::{sse::Event, IntoResponse, Json, Sse},
    routing::{get, post},
    Router,
};
use chrono::Local;
use futures::stream::Stream;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio::sync::RwLock;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, log_success, log_warning, LOG_BROADCASTER};
use super::types::{
    bad_request, conflict, internal_error, pipeline_error, ApiError, AttendanceResponse, DownloadRequest, JoinResponse,
    UploadResponse,
};
use crate::attendance::{default_output_name, process_attendance_files, AttendanceReport};
use crate::config::AppConfig;
use crate::error::{PipelineError, PipelineResult, ServerError, WorkspaceError};
use crate::join::{self, ColumnDiscovery, JoinSpec};
use crate::table::TableSummary;
use crate::workspace::{JobWorkspace, Role, StoredUpload, UploadRegistry};

/// MIME type of generated workbooks.
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Download name of a joiner export.
const JOINED_OUTPUT_NAME: &str = "joined_output.xlsx";

/// Jobs untouched for this long are removed by the purge task.
const STALE_JOB_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// How often the purge task runs. The first run happens at startup.
const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    workspace: JobWorkspace,
    /// Joiner sessions. Updates are merged into the entry under the write lock.
    sessions: Arc<RwLock<HashMap<String, UploadRegistry>>>,
    /// Finished attendance workbooks awaiting download.
    attendance_outputs: Arc<RwLock<HashMap<String, PathBuf>>>,
    preview_rows: usize,
}

impl AppState {
    pub fn new(workspace: JobWorkspace, preview_rows: usize) -> Self {
        Self {
            workspace,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            attendance_outputs: Arc::new(RwLock::new(HashMap::new())),
            preview_rows,
        }
    }

    async fn session(&self, job_id: &str) -> Result<UploadRegistry, ApiError> {
        self.sessions
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| fail(WorkspaceError::UnknownJob(job_id.to_string()).into()))
    }

    /// Remove job directories older than `max_age` and forget every session
    /// or pending download whose directory is gone. Returns how many
    /// directories were removed.
    pub async fn purge_stale(&self, max_age: Duration) -> Result<usize, ApiError> {
        let workspace = self.workspace.clone();
        let purged = blocking(move || Ok(workspace.purge_older_than(max_age)?)).await?;

        let live = |job_id: &String| self.workspace.job_dir(job_id).is_ok();
        self.sessions.write().await.retain(|job_id, _| live(job_id));
        self.attendance_outputs.write().await.retain(|job_id, _| live(job_id));
        Ok(purged)
    }
}

/// Build the router over `state`.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/logs", get(sse_logs))
        .route("/api/attendance", post(attendance_upload))
        .route("/api/attendance/{job_id}/download", get(attendance_download))
        .route("/api/joiner/upload", post(joiner_upload))
        .route("/api/joiner/{job_id}/columns", get(joiner_columns))
        .route("/api/joiner/{job_id}/join", post(joiner_join))
        .route("/api/joiner/{job_id}/download", post(joiner_download))
        .route("/api/joiner/{job_id}/reset", post(joiner_reset))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: AppConfig) -> Result<(), ServerError> {
    std::fs::create_dir_all(&config.work_dir)?;
    let state = AppState::new(JobWorkspace::with_dir(&config.work_dir), config.preview_rows);
    tokio::spawn(purge_periodically(state.clone()));

    let app = router(state, config.max_upload_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    println!("🚀 Sheetmerge server running on http://localhost:{}", config.port);
    println!("   POST /api/attendance             - Merge lecture + lab sheets");
    println!("   POST /api/joiner/upload          - Upload a table to join");
    println!("   GET  /api/logs                   - SSE log stream");
    println!("   GET  /health                     - Health check");
    println!("   Jobs in {}", config.work_dir.display());
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Sweep stale jobs every [`PURGE_INTERVAL`] for the life of the server.
async fn purge_periodically(state: AppState) {
    let mut ticker = tokio::time::interval(PURGE_INTERVAL);
    loop {
        ticker.tick().await;
        match state.purge_stale(STALE_JOB_AGE).await {
            Ok(removed) if removed > 0 => log_info(format!("🗑️  Removed {} stale jobs", removed)),
            // Failures were logged by `blocking`; try again next tick.
            _ => {}
        }
    }
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "sheetmerge",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "attendance": "POST /api/attendance",
            "joiner": "POST /api/joiner/upload",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

// =============================================================================
// Helpers
// =============================================================================

/// One multipart part, file or plain field.
struct Part {
    file_name: Option<String>,
    bytes: Vec<u8>,
}

impl Part {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).trim().to_string()
    }
}

async fn read_parts(mut multipart: Multipart) -> Result<HashMap<String, Part>, ApiError> {
    let mut parts = HashMap::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        let (_, body) = bad_request(format!("Multipart error: {}", e));
        (e.status(), body)
    })? {
        let name = field.name().unwrap_or("").to_string();
        let file_name = field.file_name().map(|s| s.to_string());
        let bytes = field.bytes().await.map_err(|e| {
            let (_, body) = bad_request(format!("Read error: {}", e));
            (e.status(), body)
        })?;
        parts.insert(
            name,
            Part {
                file_name,
                bytes: bytes.to_vec(),
            },
        );
    }

    Ok(parts)
}

fn fail(err: PipelineError) -> ApiError {
    log_error(err.to_string());
    pipeline_error(err)
}

/// Run a blocking pipeline operation off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> PipelineResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| internal_error(format!("Worker failed: {}", e)))?
        .map_err(fail)
}

/// Remove a job's directory, logging a failure instead of returning it.
fn discard_job(workspace: &JobWorkspace, job_id: &str) {
    if let Err(e) = workspace.remove_job(job_id) {
        log_warning(format!("Could not remove job {}: {}", job_id, e));
    }
}

fn attachment(file_name: &str, bytes: Vec<u8>) -> impl IntoResponse {
    let headers = [
        (header::CONTENT_TYPE, XLSX_MIME.to_string()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file_name)),
    ];
    (headers, bytes)
}

// =============================================================================
// Attendance
// =============================================================================

/// Merge uploaded lecture and lab sheets into a fresh job
async fn attendance_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AttendanceResponse>, ApiError> {
    let mut parts = read_parts(multipart).await?;
    let lecture = parts
        .remove("lecture")
        .ok_or_else(|| bad_request("No lecture file provided"))?;
    let lab = parts.remove("lab").ok_or_else(|| bad_request("No lab file provided"))?;

    println!("\n{}", "=".repeat(70));
    println!(
        "📄 ATTENDANCE: {} + {}",
        lecture.file_name.as_deref().unwrap_or("lecture"),
        lab.file_name.as_deref().unwrap_or("lab")
    );
    println!("{}\n", "=".repeat(70));

    let workspace = state.workspace.clone();
    let job_id = workspace.create_job().map_err(|e| fail(e.into()))?;

    let job = job_id.clone();
    let (output, report) = blocking(move || {
        let result = run_attendance_job(&workspace, &job, &lecture, &lab);
        if result.is_err() {
            discard_job(&workspace, &job);
        }
        result
    })
    .await?;

    let file_name = output
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    state.attendance_outputs.write().await.insert(job_id.clone(), output);

    Ok(Json(AttendanceResponse {
        download_url: format!("/api/attendance/{}/download", job_id),
        job_id,
        status: "ready".to_string(),
        file_name,
        summary: report.table.summary(state.preview_rows),
        date_groups: report.date_groups,
    }))
}

fn run_attendance_job(
    workspace: &JobWorkspace,
    job_id: &str,
    lecture: &Part,
    lab: &Part,
) -> PipelineResult<(PathBuf, AttendanceReport)> {
    let primary = workspace.store_upload(
        job_id,
        Role::Left,
        lecture.file_name.as_deref().unwrap_or("lecture"),
        &lecture.bytes,
    )?;
    let secondary = workspace.store_upload(
        job_id,
        Role::Right,
        lab.file_name.as_deref().unwrap_or("lab"),
        &lab.bytes,
    )?;
    let output = workspace.output_path(job_id, &default_output_name(Local::now()))?;

    let report = process_attendance_files(&primary.path, &secondary.path, &output)?;
    Ok((output, report))
}

/// Download a finished attendance workbook; the job is discarded afterwards
async fn attendance_download(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let output = state
        .attendance_outputs
        .write()
        .await
        .remove(&job_id)
        .ok_or_else(|| fail(WorkspaceError::UnknownJob(job_id.clone()).into()))?;

    // Discarded whether or not the read succeeds.
    let read = tokio::fs::read(&output).await;
    let workspace = state.workspace.clone();
    let job = job_id.clone();
    blocking(move || {
        discard_job(&workspace, &job);
        Ok(())
    })
    .await?;

    let bytes = read.map_err(|e| fail(WorkspaceError::Io(e).into()))?;
    let file_name = output
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("attendance.xlsx")
        .to_string();
    log_success(format!("📥 Job {} downloaded and removed", job_id));

    Ok(attachment(&file_name, bytes))
}

// =============================================================================
// Joiner
// =============================================================================

/// Upload a left or right table, starting a job when no `job_id` is given
async fn joiner_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut parts = read_parts(multipart).await?;
    let file = parts.remove("file").ok_or_else(|| bad_request("No file provided"))?;
    let role: Role = parts
        .get("file_type")
        .map(Part::text)
        .ok_or_else(|| bad_request("No file_type provided"))?
        .parse()
        .map_err(bad_request)?;
    let file_name = file.file_name.clone().unwrap_or_else(|| role.to_string());

    let (registry, created) = match parts.get("job_id").map(Part::text).filter(|id| !id.is_empty()) {
        Some(job_id) => (state.session(&job_id).await?, false),
        None => {
            let job_id = state.workspace.create_job().map_err(|e| fail(e.into()))?;
            (UploadRegistry::new(job_id), true)
        }
    };
    let job_id = registry.job_id().to_string();

    log_info(format!("📄 {} upload for job {}: {} ({} bytes)", role, job_id, file_name, file.bytes.len()));

    let workspace = state.workspace.clone();
    let preview_rows = state.preview_rows;
    let name = file_name.clone();
    let (updated, summary) = blocking(move || {
        load_upload(&workspace, &registry, created, role, &name, &file.bytes, preview_rows)
    })
    .await?;
    let upload = updated.upload(role).map_err(|e| fail(e.into()))?.clone();

    let committed = commit_upload(&mut *state.sessions.write().await, &job_id, upload.clone(), created);
    if let Err(e) = committed {
        let workspace = state.workspace.clone();
        let job = job_id.clone();
        blocking(move || {
            discard_job(&workspace, &job);
            Ok(())
        })
        .await?;
        return Err(fail(e.into()));
    }

    Ok(Json(UploadResponse {
        job_id,
        role,
        file_name: upload.file_name,
        summary,
    }))
}

/// Load and store an upload. A job created for this upload is removed if it fails.
fn load_upload(
    workspace: &JobWorkspace,
    registry: &UploadRegistry,
    created: bool,
    role: Role,
    file_name: &str,
    bytes: &[u8],
    preview_rows: usize,
) -> PipelineResult<(UploadRegistry, TableSummary)> {
    let result = join::load_table(workspace, registry, role, file_name, bytes, preview_rows);
    if created && result.is_err() {
        discard_job(workspace, registry.job_id());
    }
    result
}

/// Merge a stored upload into the live session, so concurrent left and right
/// uploads both land. An existing job that was reset meanwhile is not revived.
fn commit_upload(
    sessions: &mut HashMap<String, UploadRegistry>,
    job_id: &str,
    upload: StoredUpload,
    created: bool,
) -> Result<(), WorkspaceError> {
    let current = match sessions.get(job_id) {
        Some(current) => current.clone(),
        None if created => UploadRegistry::new(job_id),
        None => return Err(WorkspaceError::UnknownJob(job_id.to_string())),
    };
    sessions.insert(job_id.to_string(), current.with_upload(upload));
    Ok(())
}

/// Record a join result against the live session.
///
/// `before` is the registry the join ran on. The result is dropped when the
/// job was reset meanwhile or an upload replaced one of its inputs.
fn commit_join(
    sessions: &mut HashMap<String, UploadRegistry>,
    before: &UploadRegistry,
    updated: &UploadRegistry,
) -> Result<(), ApiError> {
    let job_id = before.job_id();
    let current = sessions
        .get(job_id)
        .ok_or_else(|| fail(WorkspaceError::UnknownJob(job_id.to_string()).into()))?;

    if !current.same_uploads(before) {
        log_warning(format!("Uploads for job {} changed during the join; result discarded", job_id));
        return Err(conflict("Uploads changed while the join ran, run the join again"));
    }

    let next = match updated.joined_path() {
        Ok(path) => current.with_joined(path.to_path_buf()),
        Err(_) => current.without_joined(),
    };
    sessions.insert(job_id.to_string(), next);
    Ok(())
}

/// Columns of both uploads and their intersection
async fn joiner_columns(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ColumnDiscovery>, ApiError> {
    let registry = state.session(&job_id).await?;
    let discovery = blocking(move || join::discover_columns(&registry)).await?;
    Ok(Json(discovery))
}

/// Join the two uploads
async fn joiner_join(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(spec): Json<JoinSpec>,
) -> Result<Json<JoinResponse>, ApiError> {
    let before = state.session(&job_id).await?;
    let registry = before.clone();
    let workspace = state.workspace.clone();
    let preview_rows = state.preview_rows;

    let (updated, outcome) = blocking(move || join::execute_join(&workspace, &registry, &spec, preview_rows)).await?;
    commit_join(&mut *state.sessions.write().await, &before, &updated)?;

    Ok(Json(JoinResponse { job_id, outcome }))
}

/// Export the selected columns of the joined table
async fn joiner_download(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<DownloadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let registry = state.session(&job_id).await?;
    let workspace = state.workspace.clone();

    let bytes =
        blocking(move || join::project_and_export(&workspace, &registry, &request.selected_columns)).await?;
    Ok(attachment(JOINED_OUTPUT_NAME, bytes))
}

/// Delete the job's working files and forget its session
async fn joiner_reset(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let registry = state
        .sessions
        .write()
        .await
        .remove(&job_id)
        .unwrap_or_else(|| UploadRegistry::new(job_id.clone()));
    let workspace = state.workspace.clone();

    blocking(move || join::reset(&workspace, &registry)).await?;
    Ok(Json(json!({ "status": "reset", "jobId": job_id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tempfile::tempdir;

    fn stored(role: Role, file_name: &str) -> StoredUpload {
        StoredUpload {
            role,
            file_name: file_name.into(),
            path: PathBuf::from(file_name),
        }
    }

    fn sessions_with(registry: &UploadRegistry) -> HashMap<String, UploadRegistry> {
        HashMap::from([(registry.job_id().to_string(), registry.clone())])
    }

    #[test]
    fn test_join_result_recorded() {
        let before = UploadRegistry::new("job")
            .with_upload(stored(Role::Left, "l.csv"))
            .with_upload(stored(Role::Right, "r.csv"));
        let mut sessions = sessions_with(&before);

        commit_join(&mut sessions, &before, &before.with_joined(PathBuf::from("joined.json"))).unwrap();
        assert_eq!(sessions["job"].joined_path().unwrap(), std::path::Path::new("joined.json"));
    }

    #[test]
    fn test_join_after_reset_is_not_revived() {
        let before = UploadRegistry::new("job").with_upload(stored(Role::Left, "l.csv"));
        let mut sessions = HashMap::new();

        let (status, _) = commit_join(&mut sessions, &before, &before.without_joined()).unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_join_keeps_concurrent_upload() {
        let before = UploadRegistry::new("job")
            .with_upload(stored(Role::Left, "l.csv"))
            .with_upload(stored(Role::Right, "r.csv"));
        let replaced = before.with_upload(stored(Role::Right, "r2.csv"));
        let mut sessions = sessions_with(&replaced);

        let (status, _) = commit_join(&mut sessions, &before, &before.with_joined(PathBuf::from("joined.json"))).unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(sessions["job"], replaced);
        assert!(sessions["job"].joined_path().is_err());
    }

    #[test]
    fn test_empty_join_clears_previous_result() {
        let before = UploadRegistry::new("job")
            .with_upload(stored(Role::Left, "l.csv"))
            .with_joined(PathBuf::from("joined.json"));
        let mut sessions = sessions_with(&before);

        commit_join(&mut sessions, &before, &before.without_joined()).unwrap();
        assert!(sessions["job"].joined_path().is_err());
        assert!(sessions["job"].upload(Role::Left).is_ok());
    }

    #[test]
    fn test_concurrent_uploads_both_land() {
        let mut sessions = HashMap::new();
        commit_upload(&mut sessions, "job", stored(Role::Left, "l.csv"), true).unwrap();
        commit_upload(&mut sessions, "job", stored(Role::Right, "r.csv"), false).unwrap();

        assert!(sessions["job"].upload(Role::Left).is_ok());
        assert!(sessions["job"].upload(Role::Right).is_ok());
    }

    #[test]
    fn test_upload_to_reset_job_is_rejected() {
        let mut sessions = HashMap::new();
        let result = commit_upload(&mut sessions, "job", stored(Role::Right, "r.csv"), false);

        assert!(matches!(result, Err(WorkspaceError::UnknownJob(ref id)) if id == "job"));
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_failed_first_upload_removes_job() {
        let dir = tempdir().unwrap();
        let workspace = JobWorkspace::with_dir(dir.path());
        let registry = UploadRegistry::new(workspace.create_job().unwrap());

        assert!(load_upload(&workspace, &registry, true, Role::Left, "left.csv", b"", 5).is_err());
        assert!(workspace.job_dir(registry.job_id()).is_err());
    }

    #[test]
    fn test_failed_later_upload_keeps_job() {
        let dir = tempdir().unwrap();
        let workspace = JobWorkspace::with_dir(dir.path());
        let registry = UploadRegistry::new(workspace.create_job().unwrap());

        assert!(load_upload(&workspace, &registry, false, Role::Right, "right.csv", b"", 5).is_err());
        assert!(workspace.job_dir(registry.job_id()).is_ok());
    }

    #[test]
    fn test_discard_missing_job_is_quiet() {
        let dir = tempdir().unwrap();
        discard_job(&JobWorkspace::with_dir(dir.path()), "not-a-job");
    }

    #[tokio::test]
    async fn test_purge_forgets_jobs_without_directories() {
        let dir = tempdir().unwrap();
        let workspace = JobWorkspace::with_dir(dir.path());
        let kept = workspace.create_job().unwrap();
        let gone = workspace.create_job().unwrap();
        let state = AppState::new(workspace.clone(), 5);

        for job_id in [&kept, &gone] {
            state
                .sessions
                .write()
                .await
                .insert(job_id.clone(), UploadRegistry::new(job_id.clone()));
            state
                .attendance_outputs
                .write()
                .await
                .insert(job_id.clone(), PathBuf::from("out.xlsx"));
        }
        workspace.remove_job(&gone).unwrap();

        assert_eq!(state.purge_stale(Duration::from_secs(3600)).await.unwrap(), 0);

        let sessions = state.sessions.read().await;
        assert!(sessions.contains_key(&kept));
        assert!(!sessions.contains_key(&gone));
        let outputs = state.attendance_outputs.read().await;
        assert!(outputs.contains_key(&kept));
        assert!(!outputs.contains_key(&gone));
    }
}

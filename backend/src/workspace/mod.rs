//! Job Workspace - per-job working files and the upload registry
//!
//! Every invocation gets a fresh job id and its own directory under the
//! workspace root. Nothing is shared between jobs, and a job's files are
//! removed explicitly with [`JobWorkspace::remove_job`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::error::{WorkspaceError, WorkspaceResult};

/// Directory where job namespaces live (relative to current dir)
pub const DEFAULT_WORK_DIR: &str = ".sheetmerge/jobs";

/// File name of the persisted joined table inside a job directory.
const JOINED_FILE: &str = "joined.json";

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"));

/// Which side of a join an upload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Left,
    Right,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Left => "left",
            Role::Right => "right",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "left" => Ok(Role::Left),
            "right" => Ok(Role::Right),
            other => Err(format!("Unknown file role: {}", other)),
        }
    }
}

/// An uploaded source file saved in a job directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUpload {
    pub role: Role,
    /// Sanitized original file name.
    pub file_name: String,
    pub path: PathBuf,
}

/// Uploads and derived files known for one job.
///
/// Values are immutable: every change returns a new registry, which the
/// caller passes into the next operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRegistry {
    job_id: String,
    uploads: BTreeMap<Role, StoredUpload>,
    joined: Option<PathBuf>,
}

impl UploadRegistry {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            uploads: BTreeMap::new(),
            joined: None,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Upload for `role`, or an error naming the missing side.
    pub fn upload(&self, role: Role) -> WorkspaceResult<&StoredUpload> {
        self.uploads
            .get(&role)
            .ok_or_else(|| WorkspaceError::MissingUpload(role.to_string()))
    }

    pub fn uploads(&self) -> impl Iterator<Item = &StoredUpload> {
        self.uploads.values()
    }

    /// Registry with `upload` recorded (replacing any previous one for its role).
    ///
    /// A new upload invalidates the joined table.
    pub fn with_upload(&self, upload: StoredUpload) -> Self {
        let mut uploads = self.uploads.clone();
        uploads.insert(upload.role, upload);
        Self {
            job_id: self.job_id.clone(),
            uploads,
            joined: None,
        }
    }

    /// Registry with the joined working file recorded.
    pub fn with_joined(&self, path: PathBuf) -> Self {
        Self {
            joined: Some(path),
            ..self.clone()
        }
    }

    /// Registry with no joined table.
    pub fn without_joined(&self) -> Self {
        Self {
            joined: None,
            ..self.clone()
        }
    }

    pub fn joined_path(&self) -> WorkspaceResult<&Path> {
        self.joined.as_deref().ok_or(WorkspaceError::NoJoinedTable)
    }

    /// Whether both registries describe the same job with the same uploads.
    pub fn same_uploads(&self, other: &UploadRegistry) -> bool {
        self.job_id == other.job_id && self.uploads == other.uploads
    }
}

/// Root directory holding one subdirectory per job.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    root: PathBuf,
}

impl JobWorkspace {
    /// Workspace at the default location.
    pub fn new() -> Self {
        Self::with_dir(DEFAULT_WORK_DIR)
    }

    /// Workspace at a custom location.
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            root: PathBuf::from(dir.as_ref()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a fresh job id and its directory.
    pub fn create_job(&self) -> WorkspaceResult<String> {
        let id = Uuid::new_v4().to_string();
        fs::create_dir_all(self.root.join(&id))?;
        Ok(id)
    }

    /// Directory of an existing job.
    pub fn job_dir(&self, job_id: &str) -> WorkspaceResult<PathBuf> {
        // Only canonical UUIDs map to paths, so ids can't escape the root.
        let id = Uuid::parse_str(job_id).map_err(|_| WorkspaceError::UnknownJob(job_id.to_string()))?;
        let dir = self.root.join(id.to_string());
        if !dir.is_dir() {
            return Err(WorkspaceError::UnknownJob(job_id.to_string()));
        }
        Ok(dir)
    }

    /// Save an uploaded file into the job directory.
    pub fn store_upload(&self, job_id: &str, role: Role, file_name: &str, bytes: &[u8]) -> WorkspaceResult<StoredUpload> {
        let file_name = sanitize_file_name(file_name);
        let path = self.job_dir(job_id)?.join(format!("{}_{}", role, file_name));
        fs::write(&path, bytes)?;
        Ok(StoredUpload { role, file_name, path })
    }

    /// Path for a named output file inside the job directory.
    pub fn output_path(&self, job_id: &str, file_name: &str) -> WorkspaceResult<PathBuf> {
        Ok(self.job_dir(job_id)?.join(sanitize_file_name(file_name)))
    }

    /// Persist a serializable value as the job's joined table.
    pub fn save_joined<T: Serialize>(&self, job_id: &str, value: &T) -> WorkspaceResult<PathBuf> {
        let path = self.job_dir(job_id)?.join(JOINED_FILE);
        fs::write(&path, serde_json::to_vec(value)?)?;
        Ok(path)
    }

    /// Read a JSON working file back.
    pub fn load_json<T: DeserializeOwned>(&self, path: &Path) -> WorkspaceResult<T> {
        let content = fs::read(path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Delete every file of a job. Missing jobs are not an error.
    pub fn remove_job(&self, job_id: &str) -> WorkspaceResult<()> {
        match self.job_dir(job_id) {
            Ok(dir) => Ok(fs::remove_dir_all(dir)?),
            Err(WorkspaceError::UnknownJob(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Remove job directories not modified within `max_age`. Returns how many were removed.
    pub fn purge_older_than(&self, max_age: Duration) -> WorkspaceResult<usize> {
        if !self.root.exists() {
            return Ok(0);
        }

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)?.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let modified = entry.metadata().and_then(|m| m.modified()).unwrap_or(now);
            let age = now.duration_since(modified).unwrap_or_default();
            if age > max_age {
                fs::remove_dir_all(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl Default for JobWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Reduce a client-supplied file name to a safe single path component.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned = UNSAFE_CHARS.replace_all(base.trim(), "_");
    let cleaned = cleaned.trim_start_matches(['.', '_']);
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

//! Runtime configuration.
//!
//! Defaults live here as constants; `SHEETMERGE_*` environment variables
//! (optionally from a `.env` file) override them.

use std::env;
use std::path::PathBuf;

use crate::api::logs::log_warning;
use crate::workspace::DEFAULT_WORK_DIR;

/// Upload size cap in megabytes.
pub const DEFAULT_MAX_UPLOAD_MB: usize = 16;

/// Rows returned in table previews.
pub const DEFAULT_PREVIEW_ROWS: usize = 5;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

pub const ENV_WORK_DIR: &str = "SHEETMERGE_WORK_DIR";
pub const ENV_MAX_UPLOAD_MB: &str = "SHEETMERGE_MAX_UPLOAD_MB";
pub const ENV_PREVIEW_ROWS: &str = "SHEETMERGE_PREVIEW_ROWS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Root of the per-job working directories.
    pub work_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub preview_rows: usize,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            preview_rows: DEFAULT_PREVIEW_ROWS,
            port: DEFAULT_PORT,
        }
    }
}

impl AppConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        // Try loading .env file
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let work_dir = lookup(ENV_WORK_DIR)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.work_dir);

        let max_upload_mb = parse_or(&lookup, ENV_MAX_UPLOAD_MB, DEFAULT_MAX_UPLOAD_MB);
        let preview_rows = parse_or(&lookup, ENV_PREVIEW_ROWS, DEFAULT_PREVIEW_ROWS);

        Self {
            work_dir,
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            preview_rows,
            port: defaults.port,
        }
    }

    /// Set the HTTP port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the working directory
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }
}

fn parse_or<F>(lookup: &F, key: &str, default: usize) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(value) if value > 0 => value,
            _ => {
                log_warning(format!("Ignoring {}={:?}, using {}", key, raw, default));
                default
            }
        },
    }
}

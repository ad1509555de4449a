//! # Sheetmerge - attendance merger and spreadsheet joiner
//!
//! Two pipelines over CSV and Excel tables:
//!
//! - **Attendance**: merge a lecture and a lab sheet on `Roll. No` +
//!   `Student Name`, order session columns by date, renumber attendance per
//!   student, and write a styled workbook.
//! - **Joiner**: upload two tables, pick key columns and a join type, then
//!   export a chosen subset of the joined columns.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────────┐     ┌─────────────┐
//! │ CSV / XLSX  │────▶│   Parser    │────▶│ Attendance/Join  │────▶│   Writer    │
//! │  (any enc)  │     │ (auto-det.) │     │  (Table stages)  │     │   (.xlsx)   │
//! └─────────────┘     └─────────────┘     └──────────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sheetmerge::process_attendance_files;
//! use std::path::Path;
//!
//! let report = process_attendance_files(
//!     Path::new("lecture.xlsx"),
//!     Path::new("lab.xlsx"),
//!     Path::new("styled_final.xlsx"),
//! )?;
//! println!("{} students", report.table.row_count());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Layered error types
//! - [`table`] - In-memory table model
//! - [`parser`] - CSV / spreadsheet loading with auto-detection
//! - [`writer`] - Styled workbook output
//! - [`attendance`] - Attendance merge pipeline
//! - [`join`] - Join engine, projection and join sessions
//! - [`workspace`] - Per-job working files
//! - [`config`] - Environment configuration
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod table;

// Input / output
pub mod parser;
pub mod writer;

// Pipelines
pub mod attendance;
pub mod join;

// Working files
pub mod workspace;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Errors
// =============================================================================

pub use error::{
    AttendanceError, ErrorDescriptor, ErrorKind, JoinError, PipelineError, PipelineResult, ServerError, TableError,
    WorkspaceError,
};

// =============================================================================
// Re-exports - Tables
// =============================================================================

pub use parser::{load_bytes, load_path, parse_delimited, TableFormat};
pub use table::{CellValue, Table, TableSummary};
pub use writer::{to_xlsx_bytes, write_xlsx, CellStyle, StyleMap};

// =============================================================================
// Re-exports - Pipelines
// =============================================================================

pub use attendance::{default_output_name, process_attendance_files, run_attendance, AttendanceReport};
pub use join::{join, project, ColumnDiscovery, JoinOutcome, JoinSpec, JoinType};

// =============================================================================
// Re-exports - Workspace / config
// =============================================================================

pub use config::AppConfig;
pub use workspace::{JobWorkspace, Role, UploadRegistry};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}

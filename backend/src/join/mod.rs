//! Generic table joiner.
//!
//! Two uploaded tables, a user-chosen key mapping and join type, and a final
//! column selection exported as a workbook:
//! - [`engine`]: the multi-column join itself
//! - [`projector`]: column selection over the joined table
//! - [`discovery`]: column lists and their intersection
//! - [`session`]: the above wired to a job's working files

pub mod discovery;
pub mod engine;
pub mod projector;
pub mod session;

pub use discovery::ColumnDiscovery;
pub use engine::{join, JoinSpec, JoinType};
pub use projector::project;
pub use session::{
    discover_columns, execute_join, load_table, project_and_export, reset, JoinOutcome, EMPTY_JOIN_WARNING,
};

//! Sheetmerge CLI - merge attendance sheets and join spreadsheets
//!
//! # Commands
//!
//! ```bash
//! sheetmerge serve                                  # Start HTTP server (port 3000)
//! sheetmerge attendance lecture.xlsx lab.xlsx       # Styled attendance workbook
//! sheetmerge columns left.csv right.xlsx            # Columns of both tables
//! sheetmerge join left.csv right.csv --left-on id --right-on student_id
//! sheetmerge preview sheet.csv                      # Header and first rows
//! ```

use chrono::Local;
use clap::{Parser, Subcommand};
use sheetmerge::join::discovery::discover_columns;
use sheetmerge::{
    default_output_name, join, load_path, process_attendance_files, project, write_xlsx, AppConfig, JoinSpec,
    JoinType,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sheetmerge")]
#[command(about = "Merge attendance sheets and join spreadsheets into styled workbooks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge a lecture and a lab attendance sheet into a styled workbook
    Attendance {
        /// Lecture (primary) sheet
        lecture: PathBuf,

        /// Lab (secondary) sheet
        lab: PathBuf,

        /// Output workbook (default: styled_final_<timestamp>.xlsx)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the columns of two tables and the names they share
    Columns {
        left: PathBuf,
        right: PathBuf,
    },

    /// Join two tables on key columns and write the result as a workbook
    Join {
        left: PathBuf,
        right: PathBuf,

        /// Key columns of the left table (comma separated)
        #[arg(long, value_delimiter = ',', required = true)]
        left_on: Vec<String>,

        /// Key columns of the right table, paired in order with --left-on
        #[arg(long, value_delimiter = ',', required = true)]
        right_on: Vec<String>,

        /// inner, left, right or outer
        #[arg(long, default_value = "inner")]
        how: JoinType,

        /// Columns to keep, in order (default: all)
        #[arg(short, long, value_delimiter = ',')]
        select: Vec<String>,

        /// Output workbook
        #[arg(short, long, default_value = "joined_output.xlsx")]
        output: PathBuf,
    },

    /// Print a table's header, row count and first rows as JSON
    Preview {
        input: PathBuf,

        /// Number of preview rows (default: SHEETMERGE_PREVIEW_ROWS or 5)
        #[arg(short = 'n', long)]
        rows: Option<usize>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Job working directory (overrides SHEETMERGE_WORK_DIR)
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Attendance { lecture, lab, output } => cmd_attendance(&lecture, &lab, output),

        Commands::Columns { left, right } => cmd_columns(&left, &right),

        Commands::Join {
            left,
            right,
            left_on,
            right_on,
            how,
            select,
            output,
        } => cmd_join(&left, &right, JoinSpec::new(left_on, right_on, how), &select, &output),

        Commands::Preview { input, rows } => cmd_preview(&input, rows.unwrap_or(config.preview_rows)),

        Commands::Serve { port, work_dir } => {
            let mut config = config.with_port(port);
            if let Some(dir) = work_dir {
                config = config.with_work_dir(dir);
            }
            cmd_serve(config).await
        }
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_attendance(lecture: &Path, lab: &Path, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let output = output.unwrap_or_else(|| PathBuf::from(default_output_name(Local::now())));
    eprintln!("📄 Lecture: {}", lecture.display());
    eprintln!("📄 Lab:     {}", lab.display());

    let report = process_attendance_files(lecture, lab, &output)?;

    eprintln!("\n📊 {} students, {} session columns", report.table.row_count(), report.table.columns.len().saturating_sub(2));
    for group in &report.date_groups {
        eprintln!("   {}: {}", group.date, group.columns.join(", "));
    }
    eprintln!("\n✨ Done! Saved to: {}", output.display());
    Ok(())
}

fn cmd_columns(left: &Path, right: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let left = load_path(left)?;
    let right = load_path(right)?;
    let discovery = discover_columns(&left, &right);

    eprintln!("📋 Left:   {}", discovery.left_columns.join(", "));
    eprintln!("📋 Right:  {}", discovery.right_columns.join(", "));
    eprintln!("🔗 Common: {}", discovery.common_columns.join(", "));

    println!("{}", serde_json::to_string_pretty(&discovery)?);
    Ok(())
}

fn cmd_join(
    left_path: &Path,
    right_path: &Path,
    spec: JoinSpec,
    select: &[String],
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let left = load_path(left_path)?;
    eprintln!("📄 Left:  {} ({} rows)", left_path.display(), left.row_count());
    let right = load_path(right_path)?;
    eprintln!("📄 Right: {} ({} rows)", right_path.display(), right.row_count());

    let joined = join(&left, &right, &spec)?;
    eprintln!("\n🔗 {} join: {} rows, {} columns", spec.join_type, joined.row_count(), joined.columns.len());
    if joined.is_empty() {
        eprintln!("⚠️  Join returned no rows, nothing written");
        return Ok(());
    }

    let table = if select.is_empty() { joined } else { project(&joined, select)? };
    write_xlsx(&table, None, output)?;
    eprintln!("💾 Output written to: {}", output.display());
    Ok(())
}

fn cmd_preview(input: &Path, rows: usize) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Reading: {}", input.display());
    let table = load_path(input)?;
    eprintln!("   Columns: {}", table.columns.join(", "));
    eprintln!("✅ {} rows", table.row_count());

    println!("{}", serde_json::to_string_pretty(&table.summary(rows))?);
    Ok(())
}

async fn cmd_serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    sheetmerge::server::start_server(config).await?;
    Ok(())
}

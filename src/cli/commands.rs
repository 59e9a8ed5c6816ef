//! Command definitions for the time tracker CLI.
//!
//! Uses clap derive macro for argument parsing.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use crate::types::MonthKey;

// ============================================================================
// Constants
// ============================================================================

/// Maximum description length in characters
const MAX_DESCRIPTION_CHARS: usize = 500;

/// Accepted non-RFC 3339 timestamp formats (interpreted as UTC)
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

// ============================================================================
// CLI Structure
// ============================================================================

/// Timetrack CLI - a local time tracker
#[derive(Parser, Debug)]
#[command(
    name = "timetrack",
    version,
    about = "ローカル専用のタイムトラッカーCLI",
    long_about = "作業時間を記録するシンプルなタイムトラッカー。\n\
                  記録は常に1件だけで、デーモンがSQLiteに保存します。",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: $TIMETRACK_HOME/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start tracking a new session
    Start(StartArgs),

    /// Stop the running session
    Stop {
        /// Final description of the session
        #[arg(short, long, value_parser = validate_description)]
        description: Option<String>,
    },

    /// Stop if running, otherwise start
    Toggle(StartArgs),

    /// Show the running session
    Status,

    /// Change description or project of the running session
    Annotate {
        /// New description
        #[arg(short, long, value_parser = validate_description)]
        description: Option<String>,

        /// New project (name or id)
        #[arg(short, long)]
        project: Option<String>,
    },

    /// List recent sessions
    List {
        /// Maximum number of sessions (1-500)
        #[arg(short = 'n', long, value_parser = clap::value_parser!(u32).range(1..=500))]
        limit: Option<u32>,
    },

    /// List sessions starting in a time range
    Range {
        /// Inclusive lower bound
        #[arg(long, value_parser = parse_timestamp)]
        from: DateTime<Utc>,

        /// Exclusive upper bound
        #[arg(long, value_parser = parse_timestamp)]
        to: DateTime<Utc>,
    },

    /// Add a finished entry
    Add(AddArgs),

    /// Edit a session
    Edit(EditArgs),

    /// Delete a session
    Delete {
        /// Session id
        id: Uuid,
    },

    /// Split a finished session in two
    Split {
        /// Session id
        id: Uuid,

        /// Split instant
        #[arg(long, value_parser = parse_timestamp)]
        at: DateTime<Utc>,
    },

    /// Show per-project totals for a month
    Report(ReportArgs),

    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Show a live view of the running session
    Watch {
        /// Refresh interval in milliseconds (100-60000)
        #[arg(
            long,
            default_value = "1000",
            value_parser = clap::value_parser!(u64).range(100..=60000)
        )]
        interval_ms: u64,

        /// Print a single line and exit
        #[arg(long)]
        once: bool,
    },

    /// Run as daemon (background service)
    #[command(hide = true)]
    Daemon,

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Project subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ProjectCommands {
    /// Create a project
    Add {
        /// Project name
        name: String,

        /// Free text
        #[arg(short, long, default_value = "")]
        description: String,

        /// Display color (#rrggbb)
        #[arg(short, long, default_value = crate::types::DEFAULT_PROJECT_COLOR, value_parser = validate_color)]
        color: String,
    },

    /// List projects
    List,

    /// Rename a project or change its description or color
    Edit {
        /// Project name or id
        project: String,

        /// New name
        #[arg(short, long)]
        name: Option<String>,

        /// New free text
        #[arg(short, long)]
        description: Option<String>,

        /// New display color (#rrggbb)
        #[arg(short, long, value_parser = validate_color)]
        color: Option<String>,
    },

    /// Delete an unused project
    Delete {
        /// Project name or id
        project: String,
    },
}

// ============================================================================
// Command Arguments
// ============================================================================

/// Arguments for the start and toggle commands
#[derive(Args, Debug, Clone, Default)]
pub struct StartArgs {
    /// What you are working on
    #[arg(value_parser = validate_description)]
    pub description: Option<String>,

    /// Project (name or id)
    #[arg(short, long)]
    pub project: Option<String>,
}

/// Arguments for the add command
#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Start of the entry
    #[arg(long, value_parser = parse_timestamp)]
    pub start: DateTime<Utc>,

    /// End of the entry
    #[arg(long, value_parser = parse_timestamp)]
    pub end: DateTime<Utc>,

    /// Description
    #[arg(short, long, default_value = "", value_parser = validate_description)]
    pub description: String,

    /// Project (name or id)
    #[arg(short, long)]
    pub project: Option<String>,
}

/// Arguments for the edit command
#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Session id
    pub id: Uuid,

    /// New start time
    #[arg(long, value_parser = parse_timestamp)]
    pub start: Option<DateTime<Utc>>,

    /// New end time
    #[arg(long, value_parser = parse_timestamp)]
    pub end: Option<DateTime<Utc>>,

    /// New description
    #[arg(short, long, value_parser = validate_description)]
    pub description: Option<String>,

    /// New project (name or id)
    #[arg(short, long, conflicts_with = "unassign")]
    pub project: Option<String>,

    /// Remove the project
    #[arg(long)]
    pub unassign: bool,
}

/// Arguments for the report command
#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// Month (YYYY-MM, default: current month)
    #[arg(value_parser = parse_month)]
    pub month: Option<MonthKey>,

    /// UTC offset for month boundaries (e.g. +09:00, default: local)
    #[arg(long, value_parser = parse_utc_offset, allow_hyphen_values = true)]
    pub utc_offset: Option<i32>,
}

// ============================================================================
// Validation Functions
// ============================================================================

/// Validates a description.
///
/// - Must not exceed 500 characters
fn validate_description(s: &str) -> Result<String, String> {
    if s.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(format!(
            "説明は{}文字以内にしてください",
            MAX_DESCRIPTION_CHARS
        ));
    }
    Ok(s.to_string())
}

/// Parses an RFC 3339 timestamp or `YYYY-MM-DD HH:MM[:SS]` (UTC).
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(s) {
        return Ok(instant.with_timezone(&Utc));
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            format!(
                "日時の形式が不正です: {} (RFC 3339 または YYYY-MM-DD HH:MM[:SS])",
                s
            )
        })
}

/// Parses `YYYY-MM`.
fn parse_month(s: &str) -> Result<MonthKey, String> {
    let invalid = || format!("月の形式が不正です: {} (YYYY-MM)", s);
    let (year, month) = s.split_once('-').ok_or_else(invalid)?;
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err("月は1-12の範囲で指定してください".to_string());
    }
    Ok(MonthKey::new(year, month))
}

/// Parses `+HH:MM` / `-HH:MM` into minutes east of UTC.
fn parse_utc_offset(s: &str) -> Result<i32, String> {
    let invalid = || format!("UTCオフセットの形式が不正です: {} (+HH:MM)", s);
    let (sign, rest) = match s.chars().next() {
        Some('+') => (1, &s[1..]),
        Some('-') => (-1, &s[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || !(0..60).contains(&minutes) {
        return Err(invalid());
    }
    Ok(sign * (hours * 60 + minutes))
}

/// Validates a `#rrggbb` color.
fn validate_color(s: &str) -> Result<String, String> {
    let valid = s.len() == 7
        && s.starts_with('#')
        && s[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(format!("色は #rrggbb 形式で指定してください: {}", s));
    }
    Ok(s.to_ascii_lowercase())
}

// ============================================================================
// Tests
// ============================================================================

//! Core data types for the time tracker.
//!
//! This module defines the data structures used for:
//! - Time sessions and projects as persisted by the session store
//! - Edit patches and query filters
//! - Timer snapshots broadcast by the engine to every mirror
//! - IPC request/response serialization

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a time session.
pub type SessionId = Uuid;

/// Identifier of a project.
pub type ProjectId = Uuid;

// ============================================================================
// TimeSession
// ============================================================================

/// A recorded work interval.
///
/// A session without `end_time` is the active session. The store guarantees
/// that at most one such row exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSession {
    /// Unique identifier, never reused
    pub id: SessionId,
    /// Start of the interval
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    /// End of the interval, absent while the session is running
    #[serde(rename = "endTime", skip_serializing_if = "Option::is_none", default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Cached `end_time - start_time` in whole seconds
    #[serde(
        rename = "durationSeconds",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub duration_seconds: Option<i64>,
    /// Free text, may be empty
    pub description: String,
    /// Assigned project, `None` means unassigned
    #[serde(rename = "projectId", skip_serializing_if = "Option::is_none", default)]
    pub project_id: Option<ProjectId>,
    /// Creation timestamp
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl TimeSession {
    /// Returns true if the session has not been closed yet.
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    /// Wall-clock seconds covered by the session, measured up to `now` while active.
    ///
    /// Computed from the interval bounds; `duration_seconds` is only a cache.
    pub fn elapsed_seconds_at(&self, now: DateTime<Utc>) -> i64 {
        let end = self.end_time.unwrap_or(now);
        (end - self.start_time).num_seconds().max(0)
    }
}

/// Input for creating a session.
///
/// Without `end_time` the creation is a timer start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    /// Start of the interval
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    /// End of the interval (absent for a start)
    #[serde(rename = "endTime", skip_serializing_if = "Option::is_none", default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Description text
    #[serde(default)]
    pub description: String,
    /// Assigned project
    #[serde(rename = "projectId", skip_serializing_if = "Option::is_none", default)]
    pub project_id: Option<ProjectId>,
}

impl NewSession {
    /// Creates an open-ended session starting at `start_time`.
    pub fn open(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time: None,
            description: String::new(),
            project_id: None,
        }
    }

    /// Creates a closed session covering `[start_time, end_time)`.
    pub fn closed(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time: Some(end_time),
            description: String::new(),
            project_id: None,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the project.
    pub fn with_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }
}

/// How a patch changes the project of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectAssignment {
    /// Remove the project reference
    Unassigned,
    /// Assign the given project
    Project(ProjectId),
}

impl ProjectAssignment {
    /// Returns the project id, if any.
    pub fn project_id(&self) -> Option<ProjectId> {
        match self {
            ProjectAssignment::Unassigned => None,
            ProjectAssignment::Project(id) => Some(*id),
        }
    }
}

/// Partial update of a session. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPatch {
    /// New start time
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none", default)]
    pub start_time: Option<DateTime<Utc>>,
    /// New end time (closes an active session)
    #[serde(rename = "endTime", skip_serializing_if = "Option::is_none", default)]
    pub end_time: Option<DateTime<Utc>>,
    /// New description
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    /// New project assignment
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub project: Option<ProjectAssignment>,
}

impl SessionPatch {
    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.start_time.is_none()
            && self.end_time.is_none()
            && self.description.is_none()
            && self.project.is_none()
    }
}

// ============================================================================
// Filters
// ============================================================================

/// Project predicate for queries and aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectFilter {
    /// Any project, including unassigned sessions
    #[default]
    Any,
    /// Only sessions without a project
    Unassigned,
    /// Only sessions of the given project
    Project(ProjectId),
}

/// Date/project predicate over sessions.
///
/// Sessions are matched by their start time: `from <= start_time < to`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFilter {
    /// Inclusive lower bound on the start time
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the start time
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub to: Option<DateTime<Utc>>,
    /// Project predicate
    #[serde(default)]
    pub project: ProjectFilter,
}

impl SessionFilter {
    /// Matches every session.
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches sessions starting in `[from, to)`.
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            project: ProjectFilter::Any,
        }
    }

    /// Restricts the filter to a project predicate.
    pub fn with_project(mut self, project: ProjectFilter) -> Self {
        self.project = project;
        self
    }
}

// ============================================================================
// Project
// ============================================================================

/// A project that sessions can be assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier
    pub id: ProjectId,
    /// Name, unique ignoring case
    pub name: String,
    /// Free text
    pub description: String,
    /// Display color (e.g. "#3b82f6")
    pub color: String,
    /// Creation timestamp
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Default color for new projects.
pub const DEFAULT_PROJECT_COLOR: &str = "#3b82f6";

/// Input for creating a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    /// Project name
    pub name: String,
    /// Free text
    #[serde(default)]
    pub description: String,
    /// Display color
    #[serde(default = "default_project_color")]
    pub color: String,
}

fn default_project_color() -> String {
    DEFAULT_PROJECT_COLOR.to_string()
}

impl NewProject {
    /// Creates a project input with default description and color.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            color: default_project_color(),
        }
    }
}

/// Partial update of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPatch {
    /// New name
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    /// New description
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    /// New color
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub color: Option<String>,
}

impl ProjectPatch {
    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.color.is_none()
    }
}

// ============================================================================
// Aggregates
// ============================================================================

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthKey {
    /// Calendar year
    pub year: i32,
    /// Month number (1-12)
    pub month: u32,
}

impl MonthKey {
    /// Creates a month key.
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// Returns the following month.
    pub fn next(&self) -> Self {
        if self.month >= 12 {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.month + 1)
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Closed-session total for one project in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMonthTotal {
    /// Calendar month of the sessions' start times
    pub month: MonthKey,
    /// Project, `None` for unassigned sessions
    #[serde(rename = "projectId", skip_serializing_if = "Option::is_none", default)]
    pub project_id: Option<ProjectId>,
    /// Project name, `None` for unassigned sessions
    #[serde(rename = "projectName", skip_serializing_if = "Option::is_none", default)]
    pub project_name: Option<String>,
    /// Summed wall-clock seconds
    pub seconds: i64,
    /// Number of sessions
    pub sessions: u32,
}

/// Per-project totals for one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlySummary {
    /// The month summarised
    pub month: MonthKey,
    /// One row per project (unassigned last)
    pub totals: Vec<ProjectMonthTotal>,
    /// Sum over all rows
    #[serde(rename = "totalSeconds")]
    pub total_seconds: i64,
}

// ============================================================================
// TimerSnapshot
// ============================================================================

/// Whether the engine is tracking time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    /// No active session
    #[default]
    Idle,
    /// Exactly one active session
    Running,
}

impl TimerStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerStatus::Idle => "idle",
            TimerStatus::Running => "running",
        }
    }
}

/// Consistent view of the engine state.
///
/// This is the only thing observers read "is a timer running" from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    /// True while a session is active
    #[serde(rename = "isRunning")]
    pub is_running: bool,
    /// The active session
    #[serde(rename = "activeSession", skip_serializing_if = "Option::is_none", default)]
    pub active_session: Option<TimeSession>,
    /// Seconds since the active session started (0 when idle)
    #[serde(rename = "elapsedSeconds")]
    pub elapsed_seconds: i64,
    /// Description of the active session
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    /// Project of the active session
    #[serde(rename = "projectId", skip_serializing_if = "Option::is_none", default)]
    pub project_id: Option<ProjectId>,
    /// Monotonic state-change counter of the engine
    pub revision: u64,
    /// Engine instance the revision belongs to (new on every recovery)
    #[serde(default)]
    pub epoch: Uuid,
    /// Instant the snapshot was taken
    #[serde(rename = "takenAt")]
    pub taken_at: DateTime<Utc>,
}

impl TimerSnapshot {
    /// Builds a snapshot from the active session (if any).
    pub fn new(active: Option<&TimeSession>, revision: u64, now: DateTime<Utc>) -> Self {
        match active {
            Some(session) => Self {
                is_running: true,
                active_session: Some(session.clone()),
                elapsed_seconds: session.elapsed_seconds_at(now),
                description: Some(session.description.clone()),
                project_id: session.project_id,
                revision,
                epoch: Uuid::nil(),
                taken_at: now,
            },
            None => Self {
                is_running: false,
                active_session: None,
                elapsed_seconds: 0,
                description: None,
                project_id: None,
                revision,
                epoch: Uuid::nil(),
                taken_at: now,
            },
        }
    }

    /// Tags the snapshot with the engine instance that produced it.
    pub fn with_epoch(mut self, epoch: Uuid) -> Self {
        self.epoch = epoch;
        self
    }

    /// Returns the status derived from `is_running`.
    pub fn status(&self) -> TimerStatus {
        if self.is_running {
            TimerStatus::Running
        } else {
            TimerStatus::Idle
        }
    }

    /// Start time of the active session.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.active_session.as_ref().map(|s| s.start_time)
    }
}

// ============================================================================
// IPC Types
// ============================================================================

/// Parameters for starting (or toggling on) the timer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartParams {
    /// Description of the new session
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    /// Project name or id
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub project: Option<String>,
}

/// Parameters for adding a closed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddParams {
    /// Start of the interval
    pub start: DateTime<Utc>,
    /// End of the interval
    pub end: DateTime<Utc>,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Project name or id
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub project: Option<String>,
}

/// Parameters for editing a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditParams {
    /// New start time
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start: Option<DateTime<Utc>>,
    /// New end time
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end: Option<DateTime<Utc>>,
    /// New description
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    /// New project name or id
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub project: Option<String>,
    /// Remove the project reference
    #[serde(default)]
    pub unassign: bool,
}

/// IPC request from client to daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum IpcRequest {
    /// Start tracking
    Start {
        /// Start parameters
        #[serde(flatten)]
        params: StartParams,
    },
    /// Stop tracking
    Stop {
        /// Final description of the session
        #[serde(skip_serializing_if = "Option::is_none", default)]
        description: Option<String>,
    },
    /// Stop if running, otherwise start
    Toggle {
        /// Start parameters (used when starting)
        #[serde(flatten)]
        params: StartParams,
    },
    /// Query the current state
    Status,
    /// Change description/project of the active session
    Annotate {
        /// New description
        #[serde(skip_serializing_if = "Option::is_none", default)]
        description: Option<String>,
        /// New project name or id
        #[serde(skip_serializing_if = "Option::is_none", default)]
        project: Option<String>,
    },
    /// Most recent sessions
    List {
        /// Maximum number of sessions
        #[serde(skip_serializing_if = "Option::is_none", default)]
        limit: Option<u32>,
    },
    /// Sessions starting in a date range
    Range {
        /// Inclusive lower bound
        from: DateTime<Utc>,
        /// Exclusive upper bound
        to: DateTime<Utc>,
    },
    /// Add a closed entry
    Add {
        /// Entry parameters
        #[serde(flatten)]
        params: AddParams,
    },
    /// Edit a session
    Edit {
        /// Session id
        id: SessionId,
        /// Changes
        #[serde(flatten)]
        params: EditParams,
    },
    /// Delete a session
    Delete {
        /// Session id
        id: SessionId,
    },
    /// Split a closed session in two
    Split {
        /// Session id
        id: SessionId,
        /// Split instant
        at: DateTime<Utc>,
    },
    /// Monthly per-project summary
    Report {
        /// Calendar year
        year: i32,
        /// Month number (1-12)
        month: u32,
        /// UTC offset used for month boundaries
        #[serde(rename = "offsetMinutes", default)]
        offset_minutes: i32,
    },
    /// Create a project
    ProjectAdd {
        /// Project input
        #[serde(flatten)]
        project: NewProject,
    },
    /// List projects
    ProjectList,
    /// Rename or recolor a project
    ProjectEdit {
        /// Project name or id
        project: String,
        /// Fields to change
        #[serde(flatten)]
        patch: ProjectPatch,
    },
    /// Delete a project
    ProjectDelete {
        /// Project name or id
        project: String,
    },
}

/// Response data for IPC responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseData {
    /// Engine state after the request
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub snapshot: Option<TimerSnapshot>,
    /// Session affected by the request
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session: Option<TimeSession>,
    /// Sessions returned by a query
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sessions: Option<Vec<TimeSession>>,
    /// Projects returned by a query
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub projects: Option<Vec<Project>>,
    /// Monthly summary
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub summary: Option<MonthlySummary>,
}

impl ResponseData {
    /// Creates response data carrying an engine snapshot.
    pub fn from_snapshot(snapshot: TimerSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            ..Self::default()
        }
    }

    /// Creates response data carrying a single session.
    pub fn from_session(session: TimeSession) -> Self {
        Self {
            session: Some(session),
            ..Self::default()
        }
    }

    /// Creates response data carrying a list of sessions.
    pub fn from_sessions(sessions: Vec<TimeSession>) -> Self {
        Self {
            sessions: Some(sessions),
            ..Self::default()
        }
    }

    /// Creates response data carrying a list of projects.
    pub fn from_projects(projects: Vec<Project>) -> Self {
        Self {
            projects: Some(projects),
            ..Self::default()
        }
    }

    /// Creates response data carrying a monthly summary.
    pub fn from_summary(summary: MonthlySummary) -> Self {
        Self {
            summary: Some(summary),
            ..Self::default()
        }
    }

    /// Adds an engine snapshot.
    pub fn with_snapshot(mut self, snapshot: TimerSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }
}

/// IPC response from daemon to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcResponse {
    /// Response status ("success" or "error")
    pub status: String,
    /// Human-readable message
    pub message: String,
    /// Machine-readable error code
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub code: Option<String>,
    /// Optional response data
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<ResponseData>,
}

impl IpcResponse {
    /// Creates a success response.
    pub fn success(message: impl Into<String>, data: Option<ResponseData>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            code: None,
            data,
        }
    }

    /// Creates an error response.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            code: Some(code.into()),
            data: None,
        }
    }

    /// Returns true for success responses.
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

// ============================================================================
// Tests
// ============================================================================

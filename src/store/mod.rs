//! Durable storage of time sessions and projects.
//!
//! The store owns the storage-level invariants:
//! - at most one session without an end time
//! - no two sessions overlap (the open session counts as `[start, +inf)`)
//! - `start_time < end_time` and `duration_seconds == end_time - start_time`
//!
//! Every check-then-write runs inside an IMMEDIATE transaction, so no other
//! writer can observe a state where a check passed but the write is pending.
//! The schema repeats the invariants as constraints.

pub mod error;
pub mod schema;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Params, Row, TransactionBehavior};
use uuid::Uuid;

use crate::clock::truncate_to_second;
use crate::types::{
    MonthKey, MonthlySummary, NewProject, NewSession, Project, ProjectFilter, ProjectId,
    ProjectMonthTotal, ProjectPatch, SessionFilter, SessionId, SessionPatch, TimeSession,
};

pub use error::StoreError;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

const SESSION_COLUMNS: &str = "id, start_time, end_time, duration_seconds, description, \
                               project_id, created_at, updated_at";

const PROJECT_COLUMNS: &str = "id, name, description, color, created_at, updated_at";

/// Shared WHERE clause for filtered queries over closed sessions.
///
/// Parameters: ?1 from, ?2 to, ?3 project mode (0 any, 1 unassigned, 2 project), ?4 project id.
const CLOSED_FILTER_CLAUSE: &str = "end_time IS NOT NULL
     AND (?1 IS NULL OR start_time >= ?1)
     AND (?2 IS NULL OR start_time < ?2)
     AND (?3 = 0 OR (?3 = 1 AND project_id IS NULL) OR (?3 = 2 AND project_id = ?4))";

// ============================================================================
// Row types
// ============================================================================

struct SessionRow {
    id: String,
    start_time: i64,
    end_time: Option<i64>,
    duration_seconds: Option<i64>,
    description: String,
    project_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            start_time: row.get(1)?,
            end_time: row.get(2)?,
            duration_seconds: row.get(3)?,
            description: row.get(4)?,
            project_id: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_session(self) -> StoreResult<TimeSession> {
        Ok(TimeSession {
            id: parse_id(&self.id)?,
            start_time: from_unix(self.start_time)?,
            end_time: self.end_time.map(from_unix).transpose()?,
            duration_seconds: self.duration_seconds,
            description: self.description,
            project_id: self.project_id.as_deref().map(parse_id).transpose()?,
            created_at: parse_rfc3339(&self.created_at)?,
            updated_at: parse_rfc3339(&self.updated_at)?,
        })
    }
}

struct ProjectRow {
    id: String,
    name: String,
    description: String,
    color: String,
    created_at: String,
    updated_at: String,
}

impl ProjectRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            color: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_project(self) -> StoreResult<Project> {
        Ok(Project {
            id: parse_id(&self.id)?,
            name: self.name,
            description: self.description,
            color: self.color,
            created_at: parse_rfc3339(&self.created_at)?,
            updated_at: parse_rfc3339(&self.updated_at)?,
        })
    }
}

fn parse_id(value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("invalid id {value:?}: {e}")))
}

fn from_unix(seconds: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| StoreError::Corrupt(format!("invalid timestamp: {seconds}")))
}

fn parse_rfc3339(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("invalid timestamp {value:?}: {e}")))
}

// ============================================================================
// SessionStore
// ============================================================================

/// SQLite-backed store for sessions and projects.
///
/// Mutating operations take `&mut self`; a shared reference only allows reads.
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Opens (or creates) the database file at `path` and applies migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Storage` if the file cannot be opened or migrated.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Returns the underlying connection (read access for diagnostics and tests).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // -- Sessions --

    /// Creates a session.
    ///
    /// With an end time the interval must be non-empty and must not overlap
    /// any other session. Without an end time this is a timer start and fails
    /// if another session is open.
    ///
    /// # Errors
    ///
    /// `InvalidRange`, `Overlap`, `ActiveSessionExists`, `ProjectNotFound`.
    pub fn create_session(&mut self, new: NewSession) -> StoreResult<TimeSession> {
        let start = truncate_to_second(new.start_time);
        let end = new.end_time.map(truncate_to_second);

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_project_exists(&tx, new.project_id)?;

        match end {
            Some(end) => {
                if end <= start {
                    return Err(StoreError::InvalidRange { start, end });
                }
                if let Some(conflict) = find_overlap(&tx, start, end, None)? {
                    return Err(overlap_error(&conflict));
                }
            }
            None => {
                if let Some(active) = find_active(&tx)? {
                    return Err(StoreError::ActiveSessionExists { id: active.id });
                }
                if let Some(conflict) = find_closed_ending_after(&tx, start, None)? {
                    return Err(overlap_error(&conflict));
                }
            }
        }

        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO time_sessions (id, start_time, end_time, duration_seconds,
             description, project_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id.to_string(),
                start.timestamp(),
                end.map(|e| e.timestamp()),
                end.map(|e| (e - start).num_seconds()),
                new.description,
                new.project_id.map(|p| p.to_string()),
                now
            ],
        )?;
        let session = require_session(&tx, id)?;
        tx.commit()?;

        tracing::debug!(id = %session.id, active = session.is_active(), "セッションを作成");
        Ok(session)
    }

    /// Closes the open session `id` at `end_time`.
    ///
    /// `duration_seconds` is written in the same statement as `end_time`.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `NotActive` if already closed, `InvalidRange` if
    /// `end_time <= start_time` (callers clamp instead of relying on this).
    pub fn close_session(
        &mut self,
        id: SessionId,
        end_time: DateTime<Utc>,
        description: Option<String>,
    ) -> StoreResult<TimeSession> {
        let end = truncate_to_second(end_time);

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = require_session(&tx, id)?;
        if !current.is_active() {
            return Err(StoreError::NotActive(id));
        }
        if end <= current.start_time {
            return Err(StoreError::InvalidRange {
                start: current.start_time,
                end,
            });
        }

        tx.execute(
            "UPDATE time_sessions
             SET end_time = ?1, duration_seconds = ?1 - start_time,
                 description = COALESCE(?2, description), updated_at = ?3
             WHERE id = ?4",
            params![
                end.timestamp(),
                description,
                Utc::now().to_rfc3339(),
                id.to_string()
            ],
        )?;
        let session = require_session(&tx, id)?;
        tx.commit()?;

        tracing::debug!(id = %id, duration = ?session.duration_seconds, "セッションを終了");
        Ok(session)
    }

    /// Applies `patch` to session `id`.
    ///
    /// The proposed interval is validated against every other session.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `InvalidRange`, `Overlap`, `ProjectNotFound`.
    pub fn update_session(&mut self, id: SessionId, patch: SessionPatch) -> StoreResult<TimeSession> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = require_session(&tx, id)?;

        let start = patch
            .start_time
            .map(truncate_to_second)
            .unwrap_or(current.start_time);
        let end = patch.end_time.map(truncate_to_second).or(current.end_time);
        let description = patch.description.unwrap_or(current.description);
        let project_id = match patch.project {
            Some(assignment) => assignment.project_id(),
            None => current.project_id,
        };

        ensure_project_exists(&tx, project_id)?;
        validate_interval(&tx, start, end, Some(id))?;

        tx.execute(
            "UPDATE time_sessions
             SET start_time = ?1, end_time = ?2, duration_seconds = ?3,
                 description = ?4, project_id = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                start.timestamp(),
                end.map(|e| e.timestamp()),
                end.map(|e| (e - start).num_seconds()),
                description,
                project_id.map(|p| p.to_string()),
                Utc::now().to_rfc3339(),
                id.to_string()
            ],
        )?;
        let session = require_session(&tx, id)?;
        tx.commit()?;

        tracing::debug!(id = %id, "セッションを更新");
        Ok(session)
    }

    /// Splits the closed session `id` at `at` into `[start, at)` and `[at, end)`.
    ///
    /// Both halves keep description and project.
    ///
    /// # Errors
    ///
    /// `SessionNotFound`, `InvalidSplit` if the session is open or `at` is not
    /// strictly inside it.
    pub fn split_session(
        &mut self,
        id: SessionId,
        at: DateTime<Utc>,
    ) -> StoreResult<(TimeSession, TimeSession)> {
        let at = truncate_to_second(at);

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = require_session(&tx, id)?;
        let end = current
            .end_time
            .ok_or_else(|| StoreError::InvalidSplit("記録中のセッションは分割できません".into()))?;
        if at <= current.start_time || at >= end {
            return Err(StoreError::InvalidSplit(format!(
                "{} は {} - {} の範囲外です",
                at.to_rfc3339(),
                current.start_time.to_rfc3339(),
                end.to_rfc3339()
            )));
        }

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE time_sessions
             SET end_time = ?1, duration_seconds = ?1 - start_time, updated_at = ?2
             WHERE id = ?3",
            params![at.timestamp(), now, id.to_string()],
        )?;

        let second_id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO time_sessions (id, start_time, end_time, duration_seconds,
             description, project_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                second_id.to_string(),
                at.timestamp(),
                end.timestamp(),
                (end - at).num_seconds(),
                current.description,
                current.project_id.map(|p| p.to_string()),
                now
            ],
        )?;

        let first = require_session(&tx, id)?;
        let second = require_session(&tx, second_id)?;
        tx.commit()?;

        tracing::debug!(id = %id, second = %second_id, "セッションを分割");
        Ok((first, second))
    }

    /// Deletes session `id`. Returns false if it did not exist.
    pub fn delete_session(&mut self, id: SessionId) -> StoreResult<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM time_sessions WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(deleted > 0)
    }

    /// Returns the open session, if any.
    ///
    /// This is the single source of truth for "is a timer running".
    pub fn get_active_session(&self) -> StoreResult<Option<TimeSession>> {
        find_active(&self.conn)
    }

    /// Returns session `id`, if it exists.
    pub fn get_session(&self, id: SessionId) -> StoreResult<Option<TimeSession>> {
        find_session(&self.conn, id)
    }

    /// Returns sessions starting in `[start, end)`, oldest first.
    ///
    /// # Errors
    ///
    /// `InvalidRange` if `start >= end`.
    pub fn query_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<TimeSession>> {
        if start >= end {
            return Err(StoreError::InvalidRange { start, end });
        }
        query_sessions(
            &self.conn,
            &format!(
                "SELECT {SESSION_COLUMNS} FROM time_sessions
                 WHERE start_time >= ?1 AND start_time < ?2
                 ORDER BY start_time ASC"
            ),
            params![start.timestamp(), end.timestamp()],
        )
    }

    /// Returns the `limit` most recent sessions, newest first.
    pub fn recent_sessions(&self, limit: u32) -> StoreResult<Vec<TimeSession>> {
        query_sessions(
            &self.conn,
            &format!(
                "SELECT {SESSION_COLUMNS} FROM time_sessions
                 ORDER BY start_time DESC LIMIT ?1"
            ),
            params![limit],
        )
    }

    /// Returns closed sessions matching `filter`, oldest first.
    pub fn closed_sessions(&self, filter: &SessionFilter) -> StoreResult<Vec<TimeSession>> {
        let (from, to, mode, project) = filter_params(filter);
        query_sessions(
            &self.conn,
            &format!(
                "SELECT {SESSION_COLUMNS} FROM time_sessions
                 WHERE {CLOSED_FILTER_CLAUSE}
                 ORDER BY start_time ASC"
            ),
            params![from, to, mode, project],
        )
    }

    /// Sums the wall-clock seconds of closed sessions matching `filter`.
    ///
    /// Open sessions have no duration yet and are never counted. The sum is
    /// computed from the interval bounds, not from `duration_seconds`.
    pub fn aggregate_duration(&self, filter: &SessionFilter) -> StoreResult<i64> {
        let (from, to, mode, project) = filter_params(filter);
        let total: i64 = self.conn.query_row(
            &format!(
                "SELECT COALESCE(SUM(end_time - start_time), 0) FROM time_sessions
                 WHERE {CLOSED_FILTER_CLAUSE}"
            ),
            params![from, to, mode, project],
            |r| r.get(0),
        )?;
        Ok(total)
    }

    /// Groups closed sessions matching `filter` by calendar month (of their
    /// start time in `offset`) and project.
    ///
    /// Rows are ordered by month, then project name; unassigned sessions come
    /// last within a month.
    pub fn project_breakdown(
        &self,
        filter: &SessionFilter,
        offset: FixedOffset,
    ) -> StoreResult<Vec<ProjectMonthTotal>> {
        let names: HashMap<ProjectId, String> = self
            .list_projects()?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        let mut groups: BTreeMap<(MonthKey, Option<ProjectId>), (i64, u32)> = BTreeMap::new();
        for session in self.closed_sessions(filter)? {
            let Some(end) = session.end_time else {
                continue;
            };
            let local = session.start_time.with_timezone(&offset);
            let key = (MonthKey::new(local.year(), local.month()), session.project_id);
            let entry = groups.entry(key).or_insert((0, 0));
            entry.0 += (end - session.start_time).num_seconds();
            entry.1 += 1;
        }

        let mut totals: Vec<ProjectMonthTotal> = groups
            .into_iter()
            .map(|((month, project_id), (seconds, sessions))| ProjectMonthTotal {
                month,
                project_id,
                project_name: project_id.and_then(|id| names.get(&id).cloned()),
                seconds,
                sessions,
            })
            .collect();
        totals.sort_by_key(|t| {
            (
                t.month,
                t.project_id.is_none(),
                t.project_name.as_ref().map(|n| n.to_lowercase()),
            )
        });
        Ok(totals)
    }

    /// Per-project totals of closed sessions starting in one calendar month.
    ///
    /// # Errors
    ///
    /// `InvalidMonth` if the month does not exist.
    pub fn monthly_summary(
        &self,
        month: MonthKey,
        offset: FixedOffset,
    ) -> StoreResult<MonthlySummary> {
        let from = month_start(month, offset)?;
        let to = month_start(month.next(), offset)?;

        let totals = self.project_breakdown(&SessionFilter::between(from, to), offset)?;
        let total_seconds = totals.iter().map(|t| t.seconds).sum();

        Ok(MonthlySummary {
            month,
            totals,
            total_seconds,
        })
    }

    // -- Projects --

    /// Creates a project. Names are trimmed and unique ignoring case.
    ///
    /// # Errors
    ///
    /// `InvalidProjectName`, `DuplicateProject`.
    pub fn create_project(&mut self, input: NewProject) -> StoreResult<Project> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(StoreError::InvalidProjectName);
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        if find_project_by_name(&tx, &name)?.is_some() {
            return Err(StoreError::DuplicateProject(name));
        }

        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO projects (id, name, description, color, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id.to_string(), name, input.description, input.color, now],
        )?;
        let project = find_project(&tx, id)?.ok_or_else(|| StoreError::ProjectNotFound(id.to_string()))?;
        tx.commit()?;

        tracing::debug!(id = %id, name = %project.name, "プロジェクトを作成");
        Ok(project)
    }

    /// Applies `patch` to project `id`.
    ///
    /// # Errors
    ///
    /// `ProjectNotFound`, `InvalidProjectName`, `DuplicateProject`.
    pub fn update_project(&mut self, id: ProjectId, patch: ProjectPatch) -> StoreResult<Project> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current =
            find_project(&tx, id)?.ok_or_else(|| StoreError::ProjectNotFound(id.to_string()))?;

        let name = match patch.name {
            Some(name) => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(StoreError::InvalidProjectName);
                }
                if find_project_by_name(&tx, &name)?.is_some_and(|other| other.id != id) {
                    return Err(StoreError::DuplicateProject(name));
                }
                name
            }
            None => current.name,
        };

        tx.execute(
            "UPDATE projects SET name = ?1, description = ?2, color = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                name,
                patch.description.unwrap_or(current.description),
                patch.color.unwrap_or(current.color),
                Utc::now().to_rfc3339(),
                id.to_string()
            ],
        )?;
        let project = find_project(&tx, id)?.ok_or_else(|| StoreError::ProjectNotFound(id.to_string()))?;
        tx.commit()?;
        Ok(project)
    }

    /// Deletes project `id`. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// `ProjectInUse` while any session references the project.
    pub fn delete_project(&mut self, id: ProjectId) -> StoreResult<bool> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        if find_project(&tx, id)?.is_none() {
            return Ok(false);
        }

        let sessions = count_project_sessions(&tx, id)?;
        if sessions > 0 {
            return Err(StoreError::ProjectInUse { id, sessions });
        }

        tx.execute("DELETE FROM projects WHERE id = ?1", params![id.to_string()])?;
        tx.commit()?;
        Ok(true)
    }

    /// Returns project `id`, if it exists.
    pub fn get_project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        find_project(&self.conn, id)
    }

    /// Returns the project named `name` (ignoring case), if it exists.
    pub fn find_project_by_name(&self, name: &str) -> StoreResult<Option<Project>> {
        find_project_by_name(&self.conn, name.trim())
    }

    /// Resolves a project given either its id or its name.
    ///
    /// # Errors
    ///
    /// `ProjectNotFound` if neither matches.
    pub fn resolve_project(&self, reference: &str) -> StoreResult<Project> {
        if let Ok(id) = Uuid::parse_str(reference.trim()) {
            if let Some(project) = self.get_project(id)? {
                return Ok(project);
            }
        }
        self.find_project_by_name(reference)?
            .ok_or_else(|| StoreError::ProjectNotFound(reference.to_string()))
    }

    /// Returns all projects ordered by name.
    pub fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY name COLLATE NOCASE"
        ))?;
        let rows = stmt.query_map([], ProjectRow::from_row)?;

        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?.into_project()?);
        }
        Ok(projects)
    }

    /// Number of sessions referencing project `id`.
    pub fn session_count_for_project(&self, id: ProjectId) -> StoreResult<u32> {
        count_project_sessions(&self.conn, id)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("path", &self.conn.path())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Query helpers
// ============================================================================

fn query_sessions<P: Params>(conn: &Connection, sql: &str, params: P) -> StoreResult<Vec<TimeSession>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, SessionRow::from_row)?;

    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?.into_session()?);
    }
    Ok(sessions)
}

fn query_session<P: Params>(conn: &Connection, sql: &str, params: P) -> StoreResult<Option<TimeSession>> {
    conn.query_row(sql, params, SessionRow::from_row)
        .optional()?
        .map(SessionRow::into_session)
        .transpose()
}

fn find_session(conn: &Connection, id: SessionId) -> StoreResult<Option<TimeSession>> {
    query_session(
        conn,
        &format!("SELECT {SESSION_COLUMNS} FROM time_sessions WHERE id = ?1"),
        params![id.to_string()],
    )
}

fn require_session(conn: &Connection, id: SessionId) -> StoreResult<TimeSession> {
    find_session(conn, id)?.ok_or(StoreError::SessionNotFound(id))
}

fn find_active(conn: &Connection) -> StoreResult<Option<TimeSession>> {
    query_session(
        conn,
        &format!("SELECT {SESSION_COLUMNS} FROM time_sessions WHERE end_time IS NULL LIMIT 1"),
        [],
    )
}

/// First session intersecting `[start, end)`, the open session included.
fn find_overlap(
    conn: &Connection,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude: Option<SessionId>,
) -> StoreResult<Option<TimeSession>> {
    query_session(
        conn,
        &format!(
            "SELECT {SESSION_COLUMNS} FROM time_sessions
             WHERE id != ?3 AND start_time < ?2 AND (end_time IS NULL OR end_time > ?1)
             ORDER BY start_time LIMIT 1"
        ),
        params![
            start.timestamp(),
            end.timestamp(),
            exclude.map(|id| id.to_string()).unwrap_or_default()
        ],
    )
}

/// First closed session intersecting the open interval `[start, +inf)`.
fn find_closed_ending_after(
    conn: &Connection,
    start: DateTime<Utc>,
    exclude: Option<SessionId>,
) -> StoreResult<Option<TimeSession>> {
    query_session(
        conn,
        &format!(
            "SELECT {SESSION_COLUMNS} FROM time_sessions
             WHERE id != ?2 AND end_time IS NOT NULL AND end_time > ?1
             ORDER BY start_time LIMIT 1"
        ),
        params![
            start.timestamp(),
            exclude.map(|id| id.to_string()).unwrap_or_default()
        ],
    )
}

fn validate_interval(
    conn: &Connection,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    exclude: Option<SessionId>,
) -> StoreResult<()> {
    let conflict = match end {
        Some(end) => {
            if end <= start {
                return Err(StoreError::InvalidRange { start, end });
            }
            find_overlap(conn, start, end, exclude)?
        }
        None => find_closed_ending_after(conn, start, exclude)?,
    };

    match conflict {
        Some(conflict) => Err(overlap_error(&conflict)),
        None => Ok(()),
    }
}

fn overlap_error(conflict: &TimeSession) -> StoreError {
    StoreError::Overlap {
        conflicting_id: conflict.id,
        start: conflict.start_time,
        end: conflict.end_time,
    }
}

fn find_project(conn: &Connection, id: ProjectId) -> StoreResult<Option<Project>> {
    conn.query_row(
        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
        params![id.to_string()],
        ProjectRow::from_row,
    )
    .optional()?
    .map(ProjectRow::into_project)
    .transpose()
}

fn find_project_by_name(conn: &Connection, name: &str) -> StoreResult<Option<Project>> {
    conn.query_row(
        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE name = ?1"),
        params![name],
        ProjectRow::from_row,
    )
    .optional()?
    .map(ProjectRow::into_project)
    .transpose()
}

fn ensure_project_exists(conn: &Connection, project_id: Option<ProjectId>) -> StoreResult<()> {
    match project_id {
        Some(id) if find_project(conn, id)?.is_none() => {
            Err(StoreError::ProjectNotFound(id.to_string()))
        }
        _ => Ok(()),
    }
}

fn count_project_sessions(conn: &Connection, id: ProjectId) -> StoreResult<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM time_sessions WHERE project_id = ?1",
        params![id.to_string()],
        |r| r.get(0),
    )?;
    Ok(count)
}

fn filter_params(filter: &SessionFilter) -> (Option<i64>, Option<i64>, i64, Option<String>) {
    let (mode, project) = match filter.project {
        ProjectFilter::Any => (0, None),
        ProjectFilter::Unassigned => (1, None),
        ProjectFilter::Project(id) => (2, Some(id.to_string())),
    };
    (
        filter.from.map(|t| t.timestamp()),
        filter.to.map(|t| t.timestamp()),
        mode,
        project,
    )
}

fn month_start(month: MonthKey, offset: FixedOffset) -> StoreResult<DateTime<Utc>> {
    let invalid = || StoreError::InvalidMonth {
        year: month.year,
        month: month.month,
    };
    if !(1..=12).contains(&month.month) {
        return Err(invalid());
    }
    offset
        .with_ymd_and_hms(month.year, month.month, 1, 0, 0, 0)
        .single()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(invalid)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProjectAssignment;

    fn test_store() -> SessionStore {
        SessionStore::open_in_memory().unwrap()
    }

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, h, m, 0).unwrap()
    }

    fn closed(store: &mut SessionStore, start: DateTime<Utc>, end: DateTime<Utc>) -> TimeSession {
        store.create_session(NewSession::closed(start, end)).unwrap()
    }

    fn active_count(store: &SessionStore) -> u32 {
        store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM time_sessions WHERE end_time IS NULL",
                [],
                |r| r.get(0),
            )
            .unwrap()
    }

    // ------------------------------------------------------------------------
    // create_session Tests
    // ------------------------------------------------------------------------

    mod create_session_tests {
        use super::*;

        #[test]
        fn test_create_closed_session() {
            let mut store = test_store();

            let session = store
                .create_session(
                    NewSession::closed(at(1, 10, 0), at(1, 11, 0)).with_description("review"),
                )
                .unwrap();

            assert_eq!(session.start_time, at(1, 10, 0));
            assert_eq!(session.end_time, Some(at(1, 11, 0)));
            assert_eq!(session.duration_seconds, Some(3600));
            assert_eq!(session.description, "review");
            assert!(session.project_id.is_none());
        }

        #[test]
        fn test_create_open_session() {
            let mut store = test_store();

            let session = store.create_session(NewSession::open(at(1, 9, 0))).unwrap();

            assert!(session.is_active());
            assert!(session.duration_seconds.is_none());
            assert_eq!(store.get_active_session().unwrap(), Some(session));
        }

        #[test]
        fn test_second_open_session_rejected() {
            let mut store = test_store();
            let first = store
                .create_session(NewSession::open(at(1, 9, 0)).with_description("writing docs"))
                .unwrap();

            let result = store.create_session(NewSession::open(at(1, 9, 30)).with_description("other"));

            match result {
                Err(StoreError::ActiveSessionExists { id }) => assert_eq!(id, first.id),
                other => panic!("Expected ActiveSessionExists, got {:?}", other),
            }
            assert_eq!(active_count(&store), 1);
            let active = store.get_active_session().unwrap().unwrap();
            assert_eq!(active.description, "writing docs");
        }

        #[test]
        fn test_overlap_rejected_with_conflict() {
            let mut store = test_store();
            let existing = closed(&mut store, at(1, 10, 0), at(1, 11, 0));

            let result = store.create_session(NewSession::closed(at(1, 10, 30), at(1, 10, 45)));

            match result {
                Err(StoreError::Overlap {
                    conflicting_id,
                    start,
                    end,
                }) => {
                    assert_eq!(conflicting_id, existing.id);
                    assert_eq!(start, at(1, 10, 0));
                    assert_eq!(end, Some(at(1, 11, 0)));
                }
                other => panic!("Expected Overlap, got {:?}", other),
            }
        }

        #[test]
        fn test_adjacent_sessions_allowed() {
            let mut store = test_store();
            closed(&mut store, at(1, 10, 0), at(1, 11, 0));

            let result = store.create_session(NewSession::closed(at(1, 11, 0), at(1, 12, 0)));
            assert!(result.is_ok());

            let result = store.create_session(NewSession::closed(at(1, 9, 0), at(1, 10, 0)));
            assert!(result.is_ok());
        }

        #[test]
        fn test_enclosing_interval_rejected() {
            let mut store = test_store();
            closed(&mut store, at(1, 10, 0), at(1, 11, 0));

            let result = store.create_session(NewSession::closed(at(1, 9, 0), at(1, 12, 0)));
            assert!(matches!(result, Err(StoreError::Overlap { .. })));
        }

        #[test]
        fn test_invalid_range_rejected() {
            let mut store = test_store();

            let result = store.create_session(NewSession::closed(at(1, 11, 0), at(1, 11, 0)));
            assert!(matches!(result, Err(StoreError::InvalidRange { .. })));

            let result = store.create_session(NewSession::closed(at(1, 11, 0), at(1, 10, 0)));
            assert!(matches!(result, Err(StoreError::InvalidRange { .. })));
        }

        #[test]
        fn test_closed_session_overlapping_active_rejected() {
            let mut store = test_store();
            let active = store.create_session(NewSession::open(at(1, 10, 0))).unwrap();

            let result = store.create_session(NewSession::closed(at(1, 10, 30), at(1, 11, 0)));

            match result {
                Err(StoreError::Overlap {
                    conflicting_id,
                    end,
                    ..
                }) => {
                    assert_eq!(conflicting_id, active.id);
                    assert!(end.is_none());
                }
                other => panic!("Expected Overlap, got {:?}", other),
            }
        }

        #[test]
        fn test_start_before_closed_session_end_rejected() {
            let mut store = test_store();
            closed(&mut store, at(1, 10, 0), at(1, 11, 0));

            let result = store.create_session(NewSession::open(at(1, 10, 30)));
            assert!(matches!(result, Err(StoreError::Overlap { .. })));

            let result = store.create_session(NewSession::open(at(1, 11, 0)));
            assert!(result.is_ok());
        }

        #[test]
        fn test_unknown_project_rejected() {
            let mut store = test_store();

            let result = store.create_session(
                NewSession::closed(at(1, 10, 0), at(1, 11, 0)).with_project(Uuid::new_v4()),
            );
            assert!(matches!(result, Err(StoreError::ProjectNotFound(_))));
        }

        #[test]
        fn test_sub_second_precision_truncated() {
            let mut store = test_store();
            let start = at(1, 10, 0) + chrono::Duration::milliseconds(700);
            let end = at(1, 10, 4) + chrono::Duration::milliseconds(100);

            let session = store.create_session(NewSession::closed(start, end)).unwrap();

            assert_eq!(session.start_time, at(1, 10, 0));
            assert_eq!(session.duration_seconds, Some(240));
        }
    }

    // ------------------------------------------------------------------------
    // close_session Tests
    // ------------------------------------------------------------------------

    mod close_session_tests {
        use super::*;

        #[test]
        fn test_close_writes_duration() {
            let mut store = test_store();
            let start = Utc.with_ymd_and_hms(2024, 1, 1, 23, 58, 0).unwrap();
            let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 2, 0).unwrap();
            let session = store.create_session(NewSession::open(start)).unwrap();

            let closed = store.close_session(session.id, end, None).unwrap();

            assert_eq!(closed.end_time, Some(end));
            assert_eq!(closed.duration_seconds, Some(240));
            assert!(store.get_active_session().unwrap().is_none());
        }

        #[test]
        fn test_close_updates_description() {
            let mut store = test_store();
            let session = store
                .create_session(NewSession::open(at(1, 9, 0)).with_description("draft"))
                .unwrap();

            let closed = store
                .close_session(session.id, at(1, 10, 0), Some("final".to_string()))
                .unwrap();
            assert_eq!(closed.description, "final");
        }

        #[test]
        fn test_close_keeps_description_when_absent() {
            let mut store = test_store();
            let session = store
                .create_session(NewSession::open(at(1, 9, 0)).with_description("draft"))
                .unwrap();

            let closed = store.close_session(session.id, at(1, 10, 0), None).unwrap();
            assert_eq!(closed.description, "draft");
        }

        #[test]
        fn test_close_not_found() {
            let mut store = test_store();
            let result = store.close_session(Uuid::new_v4(), at(1, 10, 0), None);
            assert!(matches!(result, Err(StoreError::SessionNotFound(_))));
        }

        #[test]
        fn test_close_already_closed() {
            let mut store = test_store();
            let session = closed(&mut store, at(1, 9, 0), at(1, 10, 0));

            let result = store.close_session(session.id, at(1, 11, 0), None);
            assert!(matches!(result, Err(StoreError::NotActive(id)) if id == session.id));
        }

        #[test]
        fn test_close_at_start_rejected() {
            let mut store = test_store();
            let session = store.create_session(NewSession::open(at(1, 9, 0))).unwrap();

            let result = store.close_session(session.id, at(1, 9, 0), None);
            assert!(matches!(result, Err(StoreError::InvalidRange { .. })));
            assert!(store.get_active_session().unwrap().is_some());
        }
    }

    // ------------------------------------------------------------------------
    // update_session Tests
    // ------------------------------------------------------------------------

    mod update_session_tests {
        use super::*;

        #[test]
        fn test_update_recomputes_duration() {
            let mut store = test_store();
            let session = closed(&mut store, at(1, 9, 0), at(1, 10, 0));

            let updated = store
                .update_session(
                    session.id,
                    SessionPatch {
                        end_time: Some(at(1, 10, 30)),
                        ..SessionPatch::default()
                    },
                )
                .unwrap();

            assert_eq!(updated.duration_seconds, Some(5400));
        }

        #[test]
        fn test_update_excludes_itself_from_overlap() {
            let mut store = test_store();
            let session = closed(&mut store, at(1, 9, 0), at(1, 10, 0));

            let updated = store.update_session(
                session.id,
                SessionPatch {
                    start_time: Some(at(1, 9, 15)),
                    ..SessionPatch::default()
                },
            );
            assert!(updated.is_ok());
        }

        #[test]
        fn test_update_into_neighbour_rejected() {
            let mut store = test_store();
            let first = closed(&mut store, at(1, 9, 0), at(1, 10, 0));
            let second = closed(&mut store, at(1, 10, 0), at(1, 11, 0));

            let result = store.update_session(
                first.id,
                SessionPatch {
                    end_time: Some(at(1, 10, 15)),
                    ..SessionPatch::default()
                },
            );

            assert!(
                matches!(result, Err(StoreError::Overlap { conflicting_id, .. }) if conflicting_id == second.id)
            );
            let unchanged = store.get_session(first.id).unwrap().unwrap();
            assert_eq!(unchanged.end_time, Some(at(1, 10, 0)));
        }

        #[test]
        fn test_update_inverted_range_rejected() {
            let mut store = test_store();
            let session = closed(&mut store, at(1, 9, 0), at(1, 10, 0));

            let result = store.update_session(
                session.id,
                SessionPatch {
                    start_time: Some(at(1, 10, 30)),
                    ..SessionPatch::default()
                },
            );
            assert!(matches!(result, Err(StoreError::InvalidRange { .. })));
        }

        #[test]
        fn test_update_project_assignment() {
            let mut store = test_store();
            let project = store.create_project(NewProject::named("Work")).unwrap();
            let session = closed(&mut store, at(1, 9, 0), at(1, 10, 0));

            let assigned = store
                .update_session(
                    session.id,
                    SessionPatch {
                        project: Some(ProjectAssignment::Project(project.id)),
                        description: Some("meeting".to_string()),
                        ..SessionPatch::default()
                    },
                )
                .unwrap();
            assert_eq!(assigned.project_id, Some(project.id));
            assert_eq!(assigned.description, "meeting");

            let cleared = store
                .update_session(
                    session.id,
                    SessionPatch {
                        project: Some(ProjectAssignment::Unassigned),
                        ..SessionPatch::default()
                    },
                )
                .unwrap();
            assert!(cleared.project_id.is_none());
            assert_eq!(cleared.description, "meeting");
        }

        #[test]
        fn test_update_active_start_before_closed_end_rejected() {
            let mut store = test_store();
            closed(&mut store, at(1, 9, 0), at(1, 10, 0));
            let active = store.create_session(NewSession::open(at(1, 10, 0))).unwrap();

            let result = store.update_session(
                active.id,
                SessionPatch {
                    start_time: Some(at(1, 9, 30)),
                    ..SessionPatch::default()
                },
            );
            assert!(matches!(result, Err(StoreError::Overlap { .. })));
        }

        #[test]
        fn test_update_end_closes_active() {
            let mut store = test_store();
            let active = store.create_session(NewSession::open(at(1, 10, 0))).unwrap();

            let closed = store
                .update_session(
                    active.id,
                    SessionPatch {
                        end_time: Some(at(1, 10, 20)),
                        ..SessionPatch::default()
                    },
                )
                .unwrap();

            assert_eq!(closed.duration_seconds, Some(1200));
            assert!(store.get_active_session().unwrap().is_none());
        }

        #[test]
        fn test_update_not_found() {
            let mut store = test_store();
            let result = store.update_session(Uuid::new_v4(), SessionPatch::default());
            assert!(matches!(result, Err(StoreError::SessionNotFound(_))));
        }
    }

    // ------------------------------------------------------------------------
    // split / delete Tests
    // ------------------------------------------------------------------------

    mod split_delete_tests {
        use super::*;

        #[test]
        fn test_split_session() {
            let mut store = test_store();
            let project = store.create_project(NewProject::named("Work")).unwrap();
            let session = store
                .create_session(
                    NewSession::closed(at(1, 9, 0), at(1, 11, 0))
                        .with_description("block")
                        .with_project(project.id),
                )
                .unwrap();

            let (first, second) = store.split_session(session.id, at(1, 10, 15)).unwrap();

            assert_eq!(first.id, session.id);
            assert_eq!(first.end_time, Some(at(1, 10, 15)));
            assert_eq!(first.duration_seconds, Some(4500));
            assert_eq!(second.start_time, at(1, 10, 15));
            assert_eq!(second.end_time, Some(at(1, 11, 0)));
            assert_eq!(second.duration_seconds, Some(2700));
            assert_eq!(second.description, "block");
            assert_eq!(second.project_id, Some(project.id));
        }

        #[test]
        fn test_split_outside_rejected() {
            let mut store = test_store();
            let session = closed(&mut store, at(1, 9, 0), at(1, 10, 0));

            let result = store.split_session(session.id, at(1, 9, 0));
            assert!(matches!(result, Err(StoreError::InvalidSplit(_))));
            let result = store.split_session(session.id, at(1, 10, 0));
            assert!(matches!(result, Err(StoreError::InvalidSplit(_))));
        }

        #[test]
        fn test_split_active_rejected() {
            let mut store = test_store();
            let session = store.create_session(NewSession::open(at(1, 9, 0))).unwrap();

            let result = store.split_session(session.id, at(1, 9, 30));
            assert!(matches!(result, Err(StoreError::InvalidSplit(_))));
        }

        #[test]
        fn test_delete_session() {
            let mut store = test_store();
            let session = closed(&mut store, at(1, 9, 0), at(1, 10, 0));

            assert!(store.delete_session(session.id).unwrap());
            assert!(!store.delete_session(session.id).unwrap());
            assert!(store.get_session(session.id).unwrap().is_none());
        }
    }

    // ------------------------------------------------------------------------
    // Query Tests
    // ------------------------------------------------------------------------

    mod query_tests {
        use super::*;

        #[test]
        fn test_query_by_date_range_ordered() {
            let mut store = test_store();
            let late = closed(&mut store, at(2, 14, 0), at(2, 15, 0));
            let early = closed(&mut store, at(2, 9, 0), at(2, 10, 0));
            closed(&mut store, at(3, 9, 0), at(3, 10, 0));

            let sessions = store.query_by_date_range(at(2, 0, 0), at(3, 0, 0)).unwrap();

            let ids: Vec<_> = sessions.iter().map(|s| s.id).collect();
            assert_eq!(ids, vec![early.id, late.id]);
        }

        #[test]
        fn test_query_by_date_range_invalid() {
            let store = test_store();
            let result = store.query_by_date_range(at(3, 0, 0), at(2, 0, 0));
            assert!(matches!(result, Err(StoreError::InvalidRange { .. })));
        }

        #[test]
        fn test_recent_sessions_newest_first() {
            let mut store = test_store();
            let a = closed(&mut store, at(1, 9, 0), at(1, 10, 0));
            let b = closed(&mut store, at(2, 9, 0), at(2, 10, 0));
            let c = closed(&mut store, at(3, 9, 0), at(3, 10, 0));

            let recent = store.recent_sessions(2).unwrap();

            assert_eq!(recent.len(), 2);
            assert_eq!(recent[0].id, c.id);
            assert_eq!(recent[1].id, b.id);
            assert!(!recent.iter().any(|s| s.id == a.id));
        }

        #[test]
        fn test_aggregate_skips_open_sessions() {
            let mut store = test_store();
            closed(&mut store, at(1, 9, 0), at(1, 10, 0));
            closed(&mut store, at(1, 10, 0), at(1, 10, 30));
            store.create_session(NewSession::open(at(1, 11, 0))).unwrap();

            let total = store.aggregate_duration(&SessionFilter::all()).unwrap();
            assert_eq!(total, 5400);
        }

        #[test]
        fn test_aggregate_uses_interval_bounds() {
            let mut store = test_store();
            let session = closed(&mut store, at(1, 9, 0), at(1, 10, 0));
            store
                .conn()
                .execute_batch("PRAGMA ignore_check_constraints = ON;")
                .unwrap();
            store
                .conn()
                .execute(
                    "UPDATE time_sessions SET duration_seconds = 1 WHERE id = ?1",
                    params![session.id.to_string()],
                )
                .unwrap();

            let total = store.aggregate_duration(&SessionFilter::all()).unwrap();
            assert_eq!(total, 3600);
        }

        #[test]
        fn test_aggregate_by_project_and_date() {
            let mut store = test_store();
            let work = store.create_project(NewProject::named("Work")).unwrap();
            store
                .create_session(NewSession::closed(at(1, 9, 0), at(1, 10, 0)).with_project(work.id))
                .unwrap();
            store
                .create_session(NewSession::closed(at(2, 9, 0), at(2, 9, 30)).with_project(work.id))
                .unwrap();
            closed(&mut store, at(2, 10, 0), at(2, 10, 10));

            let work_total = store
                .aggregate_duration(
                    &SessionFilter::all().with_project(ProjectFilter::Project(work.id)),
                )
                .unwrap();
            assert_eq!(work_total, 5400);

            let unassigned = store
                .aggregate_duration(&SessionFilter::all().with_project(ProjectFilter::Unassigned))
                .unwrap();
            assert_eq!(unassigned, 600);

            let day_two = store
                .aggregate_duration(&SessionFilter::between(at(2, 0, 0), at(3, 0, 0)))
                .unwrap();
            assert_eq!(day_two, 2400);
        }

        #[test]
        fn test_project_breakdown_groups_by_month() {
            let mut store = test_store();
            let work = store.create_project(NewProject::named("Work")).unwrap();
            let feb = Utc.with_ymd_and_hms(2024, 2, 3, 9, 0, 0).unwrap();
            store
                .create_session(NewSession::closed(at(5, 9, 0), at(5, 10, 0)).with_project(work.id))
                .unwrap();
            store
                .create_session(
                    NewSession::closed(feb, feb + chrono::Duration::minutes(30)).with_project(work.id),
                )
                .unwrap();
            closed(&mut store, at(6, 9, 0), at(6, 9, 15));

            let rows = store
                .project_breakdown(&SessionFilter::all(), FixedOffset::east_opt(0).unwrap())
                .unwrap();

            assert_eq!(rows.len(), 3);
            assert_eq!(rows[0].month, MonthKey::new(2024, 1));
            assert_eq!(rows[0].project_name.as_deref(), Some("Work"));
            assert_eq!(rows[0].seconds, 3600);
            assert_eq!(rows[1].month, MonthKey::new(2024, 1));
            assert!(rows[1].project_id.is_none());
            assert_eq!(rows[1].seconds, 900);
            assert_eq!(rows[2].month, MonthKey::new(2024, 2));
            assert_eq!(rows[2].seconds, 1800);
        }

        #[test]
        fn test_monthly_summary_respects_offset() {
            let mut store = test_store();
            // 2024-01-31 23:30 UTC is already February at UTC+9.
            closed(
                &mut store,
                Utc.with_ymd_and_hms(2024, 1, 31, 23, 30, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 2, 1, 0, 30, 0).unwrap(),
            );

            let utc = FixedOffset::east_opt(0).unwrap();
            let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();

            let january_utc = store.monthly_summary(MonthKey::new(2024, 1), utc).unwrap();
            assert_eq!(january_utc.total_seconds, 3600);

            let january_tokyo = store.monthly_summary(MonthKey::new(2024, 1), tokyo).unwrap();
            assert_eq!(january_tokyo.total_seconds, 0);
            let february_tokyo = store.monthly_summary(MonthKey::new(2024, 2), tokyo).unwrap();
            assert_eq!(february_tokyo.total_seconds, 3600);
        }

        #[test]
        fn test_monthly_summary_invalid_month() {
            let store = test_store();
            let result = store.monthly_summary(MonthKey::new(2024, 13), FixedOffset::east_opt(0).unwrap());
            assert!(matches!(result, Err(StoreError::InvalidMonth { .. })));
        }
    }

    // ------------------------------------------------------------------------
    // Project Tests
    // ------------------------------------------------------------------------

    mod project_tests {
        use super::*;

        #[test]
        fn test_create_and_list_projects() {
            let mut store = test_store();
            store.create_project(NewProject::named("beta")).unwrap();
            store.create_project(NewProject::named("  Alpha  ")).unwrap();

            let names: Vec<_> = store
                .list_projects()
                .unwrap()
                .into_iter()
                .map(|p| p.name)
                .collect();
            assert_eq!(names, vec!["Alpha", "beta"]);
        }

        #[test]
        fn test_duplicate_name_ignores_case() {
            let mut store = test_store();
            store.create_project(NewProject::named("Work")).unwrap();

            let result = store.create_project(NewProject::named("WORK"));
            assert!(matches!(result, Err(StoreError::DuplicateProject(_))));
        }

        #[test]
        fn test_empty_name_rejected() {
            let mut store = test_store();
            let result = store.create_project(NewProject::named("   "));
            assert!(matches!(result, Err(StoreError::InvalidProjectName)));
        }

        #[test]
        fn test_resolve_project_by_name_or_id() {
            let mut store = test_store();
            let project = store.create_project(NewProject::named("Work")).unwrap();

            assert_eq!(store.resolve_project("work").unwrap().id, project.id);
            assert_eq!(
                store.resolve_project(&project.id.to_string()).unwrap().id,
                project.id
            );
            assert!(matches!(
                store.resolve_project("missing"),
                Err(StoreError::ProjectNotFound(_))
            ));
        }

        #[test]
        fn test_update_project_rename() {
            let mut store = test_store();
            let work = store.create_project(NewProject::named("Work")).unwrap();
            store.create_project(NewProject::named("Home")).unwrap();

            let renamed = store
                .update_project(
                    work.id,
                    ProjectPatch {
                        name: Some("Office".to_string()),
                        ..ProjectPatch::default()
                    },
                )
                .unwrap();
            assert_eq!(renamed.name, "Office");

            let clash = store.update_project(
                work.id,
                ProjectPatch {
                    name: Some("home".to_string()),
                    ..ProjectPatch::default()
                },
            );
            assert!(matches!(clash, Err(StoreError::DuplicateProject(_))));

            let same_name = store.update_project(
                work.id,
                ProjectPatch {
                    name: Some("OFFICE".to_string()),
                    ..ProjectPatch::default()
                },
            );
            assert!(same_name.is_ok());
        }

        #[test]
        fn test_delete_referenced_project_rejected() {
            let mut store = test_store();
            let project = store.create_project(NewProject::named("Work")).unwrap();
            let session = store
                .create_session(NewSession::closed(at(1, 9, 0), at(1, 10, 0)).with_project(project.id))
                .unwrap();

            let result = store.delete_project(project.id);
            assert!(
                matches!(result, Err(StoreError::ProjectInUse { sessions: 1, .. }))
            );
            assert_eq!(store.session_count_for_project(project.id).unwrap(), 1);

            store.delete_session(session.id).unwrap();
            assert!(store.delete_project(project.id).unwrap());
            assert!(!store.delete_project(project.id).unwrap());
        }
    }

    // ------------------------------------------------------------------------
    // Persistence Tests
    // ------------------------------------------------------------------------

    mod persistence_tests {
        use super::*;

        #[test]
        fn test_open_file_database_survives_reopen() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("timetrack.db");

            let active_id = {
                let mut store = SessionStore::open(&path).unwrap();
                store.create_session(NewSession::open(at(1, 9, 0))).unwrap().id
            };

            let store = SessionStore::open(&path).unwrap();
            let active = store.get_active_session().unwrap().unwrap();
            assert_eq!(active.id, active_id);
        }

        #[test]
        fn test_corrupt_row_reported() {
            let store = test_store();
            store
                .conn()
                .execute(
                    "INSERT INTO time_sessions (id, start_time, created_at, updated_at)
                     VALUES ('not-a-uuid', 100, 'x', 'x')",
                    [],
                )
                .unwrap();

            let result = store.get_active_session();
            assert!(matches!(result, Err(StoreError::Corrupt(_))));
            assert!(result.unwrap_err().is_fatal());
        }
    }
}

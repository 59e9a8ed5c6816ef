//! Session store error types.
//!
//! Every failure of the store and of the timer engine is one of these
//! variants. User errors are recoverable and carry enough data for a
//! resolution UI; storage errors are fatal and never retried.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{ProjectId, SessionId};

/// Errors that can occur in the session store and the timer engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A start was attempted while another session is open.
    #[error("記録中のセッションが既に存在します: {id}")]
    ActiveSessionExists {
        /// The open session
        id: SessionId,
    },

    /// A stop was attempted with nothing running.
    #[error("記録中のセッションはありません")]
    NoActiveSession,

    /// The session is already closed.
    #[error("セッションは既に終了しています: {0}")]
    NotActive(SessionId),

    /// The proposed interval collides with an existing session.
    #[error("{conflicting_id} と時間が重複しています ({})", format_interval(.start, .end))]
    Overlap {
        /// The session in the way
        conflicting_id: SessionId,
        /// Its start time
        start: DateTime<Utc>,
        /// Its end time (`None` if it is the active session)
        end: Option<DateTime<Utc>>,
    },

    /// The interval does not satisfy `start < end`.
    #[error("終了時刻は開始時刻より後にしてください ({start} - {end})")]
    InvalidRange {
        /// Proposed start
        start: DateTime<Utc>,
        /// Proposed end
        end: DateTime<Utc>,
    },

    /// The split instant is not strictly inside a closed session.
    #[error("セッションを分割できません: {0}")]
    InvalidSplit(String),

    /// No session with this id.
    #[error("セッションが見つかりません: {0}")]
    SessionNotFound(SessionId),

    /// No project with this id or name.
    #[error("プロジェクトが見つかりません: {0}")]
    ProjectNotFound(String),

    /// A project with the same name (ignoring case) exists.
    #[error("同名のプロジェクトが既に存在します: {0}")]
    DuplicateProject(String),

    /// The project name is empty.
    #[error("プロジェクト名は空にできません")]
    InvalidProjectName,

    /// The project is still referenced by sessions.
    #[error("プロジェクト {id} は {sessions} 件のセッションで使用中です")]
    ProjectInUse {
        /// The project
        id: ProjectId,
        /// Number of referencing sessions
        sessions: u32,
    },

    /// The requested calendar month does not exist.
    #[error("無効な月です: {year}-{month}")]
    InvalidMonth {
        /// Calendar year
        year: i32,
        /// Month number
        month: u32,
    },

    /// The database failed (disk full, locked, corrupted file).
    #[error("データベースエラー: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A row could not be decoded.
    #[error("データが破損しています: {0}")]
    Corrupt(String),
}

fn format_interval(start: &DateTime<Utc>, end: &Option<DateTime<Utc>>) -> String {
    match end {
        Some(end) => format!("{} - {}", start.to_rfc3339(), end.to_rfc3339()),
        None => format!("{} - 記録中", start.to_rfc3339()),
    }
}

impl StoreError {
    /// Returns true if the error leaves the store in an unknown state.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Corrupt(_))
    }

    /// Returns true if the error was caused by the request itself.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        !self.is_fatal()
    }

    /// Returns a stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ActiveSessionExists { .. } => "active_session_exists",
            Self::NoActiveSession => "no_active_session",
            Self::NotActive(_) => "not_active",
            Self::Overlap { .. } => "overlap",
            Self::InvalidRange { .. } => "invalid_range",
            Self::InvalidSplit(_) => "invalid_split",
            Self::SessionNotFound(_) => "session_not_found",
            Self::ProjectNotFound(_) => "project_not_found",
            Self::DuplicateProject(_) => "duplicate_project",
            Self::InvalidProjectName => "invalid_project_name",
            Self::ProjectInUse { .. } => "project_in_use",
            Self::InvalidMonth { .. } => "invalid_month",
            Self::Storage(_) => "storage",
            Self::Corrupt(_) => "corrupt",
        }
    }

    /// Returns a user-friendly suggestion for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        suggestion_for_code(self.code()).unwrap_or_default()
    }
}

/// Suggestion for an error code as returned by [`StoreError::code`].
///
/// Clients only see the code on the wire, so the table is keyed on it.
pub fn suggestion_for_code(code: &str) -> Option<&'static str> {
    let suggestion = match code {
        "active_session_exists" => "先に 'timetrack stop' で記録を停止してください",
        "no_active_session" | "not_active" => "'timetrack start' で記録を開始してください",
        "overlap" => "重複しているセッションを編集または削除してください",
        "invalid_range" => "開始時刻と終了時刻を確認してください",
        "invalid_split" => "分割時刻はセッションの範囲内で指定してください",
        "session_not_found" => "'timetrack list' でIDを確認してください",
        "project_not_found" => "'timetrack project list' でプロジェクトを確認してください",
        "duplicate_project" | "invalid_project_name" => "別の名前を指定してください",
        "project_in_use" => "先にセッションのプロジェクトを変更してください",
        "invalid_month" => "月は1-12の範囲で指定してください",
        "storage" | "corrupt" => {
            "データベースファイルを確認し、アプリケーションを再起動してください"
        }
        _ => return None,
    };
    Some(suggestion)
}

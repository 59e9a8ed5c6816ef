//! Display utilities for the time tracker CLI.
//!
//! This module provides formatted output for:
//! - Success messages
//! - Error messages with a suggestion
//! - Status display
//! - Session, project and report listings

use chrono::{DateTime, Local, Utc};

use crate::mirror::format_hms;
use crate::store::error::suggestion_for_code;
use crate::types::{IpcResponse, MonthlySummary, Project, TimeSession, TimerSnapshot};

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows a success message for start.
    pub fn show_start_success(response: &IpcResponse) {
        println!("▶ {}", response.message);

        if let Some(snapshot) = Self::snapshot(response) {
            if let Some(session) = &snapshot.active_session {
                if !session.description.is_empty() {
                    println!("  内容: {}", session.description);
                }
                println!("  開始: {}", Self::format_time(session.start_time));
                println!("  ID: {}", session.id);
            }
        }
    }

    /// Shows a success message for stop.
    pub fn show_stop_success(response: &IpcResponse) {
        println!("⏹ {}", response.message);

        if let Some(session) = response.data.as_ref().and_then(|d| d.session.as_ref()) {
            if !session.description.is_empty() {
                println!("  内容: {}", session.description);
            }
            println!(
                "  記録時間: {}",
                format_hms(session.duration_seconds.unwrap_or(0))
            );
        }
    }

    /// Shows the result of a toggle.
    pub fn show_toggle_success(response: &IpcResponse) {
        let stopped = response
            .data
            .as_ref()
            .is_some_and(|d| d.session.is_some());
        if stopped {
            Self::show_stop_success(response);
        } else {
            Self::show_start_success(response);
        }
    }

    /// Shows the current state.
    pub fn show_status(response: &IpcResponse) {
        println!("タイムトラッカー ステータス");
        println!("─────────────────────────────");

        match Self::snapshot(response) {
            Some(snapshot) => {
                for line in Self::status_lines(snapshot) {
                    println!("{}", line);
                }
            }
            None => println!("状態を取得できませんでした"),
        }
    }

    /// Shows a plain success message.
    pub fn show_message(response: &IpcResponse) {
        println!("* {}", response.message);
    }

    /// Shows a single session (add/edit).
    pub fn show_session_result(response: &IpcResponse) {
        println!("* {}", response.message);
        if let Some(session) = response.data.as_ref().and_then(|d| d.session.as_ref()) {
            println!("  {}", Self::session_line(session));
        }
    }

    /// Shows a list of sessions.
    pub fn show_sessions(response: &IpcResponse) {
        let sessions = response
            .data
            .as_ref()
            .and_then(|d| d.sessions.as_deref())
            .unwrap_or_default();

        if sessions.is_empty() {
            println!("セッションはありません");
            return;
        }
        for session in sessions {
            println!("{}", Self::session_line(session));
        }
    }

    /// Shows the project list.
    pub fn show_projects(response: &IpcResponse) {
        let projects = response
            .data
            .as_ref()
            .and_then(|d| d.projects.as_deref())
            .unwrap_or_default();

        if projects.is_empty() {
            println!("プロジェクトはありません");
            return;
        }
        for project in projects {
            println!("{}", Self::project_line(project));
        }
    }

    /// Shows a monthly summary.
    pub fn show_report(response: &IpcResponse) {
        match response.data.as_ref().and_then(|d| d.summary.as_ref()) {
            Some(summary) => {
                for line in Self::report_lines(summary) {
                    println!("{}", line);
                }
            }
            None => println!("集計結果がありません"),
        }
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("エラー: {}", message);
    }

    /// Shows an error message followed by the suggestion for `code`.
    pub fn show_error_with_code(message: &str, code: Option<&str>) {
        Self::show_error(message);
        if let Some(suggestion) = code.and_then(suggestion_for_code) {
            eprintln!("  ヒント: {}", suggestion);
        }
    }

    // -- Formatting --

    fn snapshot(response: &IpcResponse) -> Option<&TimerSnapshot> {
        response.data.as_ref().and_then(|d| d.snapshot.as_ref())
    }

    /// Status block for a snapshot.
    fn status_lines(snapshot: &TimerSnapshot) -> Vec<String> {
        let Some(session) = snapshot.active_session.as_ref().filter(|_| snapshot.is_running)
        else {
            return vec!["状態: 停止中".to_string()];
        };

        let mut lines = vec![
            "状態: 記録中".to_string(),
            format!("経過時間: {}", format_hms(snapshot.elapsed_seconds)),
        ];
        if !session.description.is_empty() {
            lines.push(format!("内容: {}", session.description));
        }
        if let Some(project_id) = session.project_id {
            lines.push(format!("プロジェクト: {}", project_id));
        }
        lines.push(format!("開始: {}", Self::format_time(session.start_time)));
        lines.push(format!("ID: {}", session.id));
        lines
    }

    /// One line per session: id, start, duration, description.
    fn session_line(session: &TimeSession) -> String {
        let duration = match session.duration_seconds {
            Some(seconds) => format_hms(seconds),
            None => "記録中  ".to_string(),
        };
        let mut line = format!(
            "{}  {}  {}",
            session.id,
            Self::format_time(session.start_time),
            duration
        );
        if !session.description.is_empty() {
            line.push_str("  ");
            line.push_str(&session.description);
        }
        line
    }

    fn project_line(project: &Project) -> String {
        let mut line = format!("{}  {}  {}", project.id, project.color, project.name);
        if !project.description.is_empty() {
            line.push_str(&format!(" - {}", project.description));
        }
        line
    }

    fn report_lines(summary: &MonthlySummary) -> Vec<String> {
        let mut lines = vec![format!("{} の集計", summary.month)];
        if summary.totals.is_empty() {
            lines.push("記録はありません".to_string());
        }
        for total in &summary.totals {
            lines.push(format!(
                "  {:<24} {:>10}  ({}件)",
                total.project_name.as_deref().unwrap_or("(未分類)"),
                format_hms(total.seconds),
                total.sessions
            ));
        }
        lines.push(format!("  {:<24} {:>10}", "合計", format_hms(summary.total_seconds)));
        lines
    }

    /// Formats an instant in local time.
    fn format_time(instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Title and tooltip text for the menu bar.
//!
//! This module handles:
//! - Generating display text for the menu bar (e.g., "⏱ 01:15:30")
//! - Detecting running/idle changes so the menu is only rebuilt when needed
//!
//! The text generation logic is platform-independent and fully testable.

use crate::mirror::{format_hms, MirrorView};

// ============================================================================
// Constants
// ============================================================================

/// Emoji while recording
const RUNNING_EMOJI: &str = "⏱";

/// Emoji while idle
const STOPPED_EMOJI: &str = "⏸";

/// Application name shown in the tooltip
pub const APP_NAME: &str = "タイムトラッカー";

// ============================================================================
// IconManager
// ============================================================================

/// Generates the menu bar title and tooltip from a mirror view.
#[derive(Debug, Default)]
pub struct IconManager {
    /// Last known running flag
    last_running: Option<bool>,
}

impl IconManager {
    /// Creates a new IconManager.
    pub fn new() -> Self {
        Self { last_running: None }
    }

    /// Generates the title text for display in the menu bar.
    ///
    /// Format:
    /// - Running: "⏱ HH:MM:SS" (or "⏱ HH:MM" without seconds)
    /// - Idle: "⏸ 停止中"
    pub fn generate_title(&self, view: &MirrorView, show_seconds: bool) -> String {
        if !view.is_running {
            return format!("{} 停止中", STOPPED_EMOJI);
        }
        format!(
            "{} {}",
            RUNNING_EMOJI,
            Self::format_elapsed(view.elapsed_seconds, show_seconds)
        )
    }

    /// Generates the tooltip text.
    pub fn generate_tooltip(&self, view: &MirrorView) -> String {
        if !view.is_running {
            return format!("{}: 停止中", APP_NAME);
        }
        match view.description.as_deref() {
            Some(desc) if !desc.is_empty() => format!("{}: 記録中 - {}", APP_NAME, desc),
            _ => format!("{}: 記録中", APP_NAME),
        }
    }

    /// Returns true if the running flag differs from the previous call.
    pub fn status_changed(&mut self, is_running: bool) -> bool {
        let changed = self.last_running != Some(is_running);
        if changed {
            self.last_running = Some(is_running);
        }
        changed
    }

    /// Formats elapsed seconds as HH:MM:SS or HH:MM.
    pub fn format_elapsed(seconds: i64, show_seconds: bool) -> String {
        if show_seconds {
            format_hms(seconds)
        } else {
            let seconds = seconds.max(0);
            format!("{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

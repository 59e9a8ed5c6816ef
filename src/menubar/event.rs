//! Event handling for menu bar interactions.
//!
//! This module handles:
//! - Mapping menu item clicks to intents
//! - Executing intents against the engine, exactly like IPC requests
//! - Update messages sent from the tray mirror to the tray host

use std::fmt;

use crate::daemon::timer::TimerEngine;
use crate::store::StoreError;
use crate::types::TimerSnapshot;

use super::menu::MenuConfig;

// ============================================================================
// MenuAction
// ============================================================================

/// Intents that can be triggered from the menu bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    /// Start recording
    Start,
    /// Stop recording
    Stop,
    /// Stop if running, otherwise start
    Toggle,
    /// Quit the daemon
    Quit,
}

impl fmt::Display for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_command())
    }
}

impl MenuAction {
    /// Returns the IPC command name for this action.
    pub fn as_command(&self) -> &'static str {
        match self {
            MenuAction::Start => "start",
            MenuAction::Stop => "stop",
            MenuAction::Toggle => "toggle",
            MenuAction::Quit => "quit",
        }
    }

    /// Returns a human-readable description of this action.
    pub fn description(&self) -> &'static str {
        match self {
            MenuAction::Start => "記録開始",
            MenuAction::Stop => "記録停止",
            MenuAction::Toggle => "開始/停止",
            MenuAction::Quit => "終了",
        }
    }
}

// ============================================================================
// MenuItemId
// ============================================================================

/// Identifiers for menu items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuItemId {
    /// Start menu item
    Start,
    /// Stop menu item
    Stop,
    /// Click on the title (toggles)
    Title,
    /// Quit menu item
    Quit,
    /// Unknown or unhandled menu item
    Unknown,
}

impl MenuItemId {
    /// Converts a menu item ID to the corresponding action.
    pub fn to_action(&self) -> Option<MenuAction> {
        match self {
            MenuItemId::Start => Some(MenuAction::Start),
            MenuItemId::Stop => Some(MenuAction::Stop),
            MenuItemId::Title => Some(MenuAction::Toggle),
            MenuItemId::Quit => Some(MenuAction::Quit),
            MenuItemId::Unknown => None,
        }
    }
}

// ============================================================================
// EventHandler
// ============================================================================

/// Result of executing a menu action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The engine handled the intent; state after it
    Applied(TimerSnapshot),
    /// The user asked to quit the daemon
    QuitRequested,
}

/// Converts menu clicks to intents and executes them.
#[derive(Debug, Default)]
pub struct EventHandler;

impl EventHandler {
    /// Creates a new EventHandler.
    pub fn new() -> Self {
        Self
    }

    /// Processes a menu item click and returns the corresponding action.
    pub fn handle_click(&self, item_id: MenuItemId) -> Option<MenuAction> {
        let action = item_id.to_action();

        if let Some(ref action) = action {
            tracing::info!(action = %action, "メニューバーからアクションを受信");
        }

        action
    }

    /// Executes `action` against the engine.
    ///
    /// The tray is not a privileged writer: this goes through the same engine
    /// calls as the IPC handler.
    pub fn execute(
        &self,
        action: MenuAction,
        engine: &mut TimerEngine,
    ) -> Result<ActionOutcome, StoreError> {
        let result = match action {
            MenuAction::Start => engine.start(None, None).map(|_| ()),
            MenuAction::Stop => engine.stop(None).map(|_| ()),
            MenuAction::Toggle => engine.toggle(None, None).map(|_| ()),
            MenuAction::Quit => return Ok(ActionOutcome::QuitRequested),
        };

        self.log_action_result(&action, result.is_ok());
        result.map(|()| ActionOutcome::Applied(engine.snapshot()))
    }

    /// Logs the result of an action execution.
    pub fn log_action_result(&self, action: &MenuAction, success: bool) {
        if success {
            tracing::info!(action = %action, "アクション実行成功");
        } else {
            tracing::warn!(action = %action, "アクション実行失敗");
        }
    }
}

// ============================================================================
// TrayUpdate
// ============================================================================

/// Updates sent from the tray mirror (tokio side) to the tray host thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayUpdate {
    /// Update the title text displayed in the menu bar
    SetTitle(String),
    /// Update the tooltip
    SetTooltip(String),
    /// Replace the menu
    RebuildMenu(MenuConfig),
    /// Shutdown the tray icon
    Shutdown,
}

// ============================================================================
// Tests
// ============================================================================

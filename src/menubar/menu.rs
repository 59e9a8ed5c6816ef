//! Menu building and item state management for the menu bar.
//!
//! This module handles:
//! - Menu item configuration and state
//! - Determining which menu items are enabled from the mirror view
//!
//! The configuration logic is platform-independent and fully testable.

use crate::mirror::MirrorView;

use super::icon::{IconManager, APP_NAME};

// ============================================================================
// MenuItemConfig
// ============================================================================

/// Configuration for a menu item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItemConfig {
    /// Display text for the menu item
    pub text: String,
    /// Whether the menu item is enabled (clickable)
    pub enabled: bool,
}

impl MenuItemConfig {
    /// Creates a new menu item configuration.
    pub fn new(text: impl Into<String>, enabled: bool) -> Self {
        Self {
            text: text.into(),
            enabled,
        }
    }
}

// ============================================================================
// MenuConfig
// ============================================================================

/// Complete menu configuration for one engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuConfig {
    /// Title item (always disabled, shows app name)
    pub title: MenuItemConfig,
    /// Status info items (always disabled)
    pub status_items: Vec<MenuItemConfig>,
    /// Start button
    pub start: MenuItemConfig,
    /// Stop button
    pub stop: MenuItemConfig,
    /// Quit button (always enabled)
    pub quit: MenuItemConfig,
}

// ============================================================================
// MenuBuilder
// ============================================================================

/// Builds the menu configuration from a mirror view.
#[derive(Debug, Default)]
pub struct MenuBuilder;

impl MenuBuilder {
    /// Creates a new MenuBuilder.
    pub fn new() -> Self {
        Self
    }

    /// Builds a complete menu configuration.
    pub fn build(&self, view: &MirrorView) -> MenuConfig {
        MenuConfig {
            title: MenuItemConfig::new(APP_NAME, false),
            status_items: self.build_status_items(view),
            start: MenuItemConfig::new("▶ 記録開始", Self::is_start_enabled(view.is_running)),
            stop: MenuItemConfig::new("⏹ 記録停止", Self::is_stop_enabled(view.is_running)),
            quit: MenuItemConfig::new("終了", true),
        }
    }

    fn build_status_items(&self, view: &MirrorView) -> Vec<MenuItemConfig> {
        if !view.is_running {
            return vec![MenuItemConfig::new("停止中", false)];
        }

        let mut items = Vec::new();
        match view.description.as_deref() {
            Some(desc) if !desc.is_empty() => {
                items.push(MenuItemConfig::new(format!("記録中: {}", desc), false));
            }
            _ => items.push(MenuItemConfig::new("記録中", false)),
        }
        items.push(MenuItemConfig::new(
            format!(
                "開始からの経過: {}",
                IconManager::format_elapsed(view.elapsed_seconds, false)
            ),
            false,
        ));
        items
    }

    /// Start is enabled only while idle.
    pub fn is_start_enabled(is_running: bool) -> bool {
        !is_running
    }

    /// Stop is enabled only while running.
    pub fn is_stop_enabled(is_running: bool) -> bool {
        is_running
    }
}

// ============================================================================
// Tests
// ============================================================================

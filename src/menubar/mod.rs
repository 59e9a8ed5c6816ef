//! Menu bar (tray) mirror for the time tracker.
//!
//! This module provides:
//! - Live elapsed time in the menu bar (e.g., "⏱ 01:15:30")
//! - Dropdown menu with start/stop/quit actions
//! - Event handling for menu interactions
//!
//! # Architecture
//!
//! - `icon.rs`: Title and tooltip text generation
//! - `menu.rs`: Menu configuration
//! - `event.rs`: Event types and action execution
//! - `mod.rs`: `TrayMirror` (tokio side) and `TrayHost` (tray thread)
//!
//! # Usage
//!
//! `TrayMirror` is driven by a `MirrorDriver` inside the daemon and pushes
//! `TrayUpdate`s over a crossbeam channel. `TrayHost` owns the receiving end
//! on its own thread and sends clicked actions back to the daemon, which
//! executes them through the engine like any other request.
//!
//! ```ignore
//! use crossbeam_channel::unbounded;
//! use timetrack::menubar::{TrayHost, TrayMirror};
//!
//! let (update_tx, update_rx) = unbounded();
//! let (action_tx, action_rx) = tokio::sync::mpsc::unbounded_channel();
//!
//! let mirror = TrayMirror::new(update_tx, true);
//! let host = TrayHost::new(update_rx, action_tx);
//! std::thread::spawn(move || host.run());
//! ```

pub mod event;
pub mod icon;
pub mod menu;

// Re-export main types
pub use event::{ActionOutcome, EventHandler, MenuAction, MenuItemId, TrayUpdate};
pub use icon::IconManager;
pub use menu::{MenuBuilder, MenuConfig, MenuItemConfig};

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use tokio::sync::mpsc::UnboundedSender;

use crate::mirror::{Mirror, MirrorState, MirrorView};

// ============================================================================
// TrayMirror
// ============================================================================

/// Mirror that renders engine state into tray updates.
///
/// The title is resent only when its text changes. The menu and tooltip are
/// rebuilt when the running flag flips or a new revision arrives.
pub struct TrayMirror {
    state: MirrorState,
    icon_manager: IconManager,
    menu_builder: MenuBuilder,
    show_seconds: bool,
    update_tx: Sender<TrayUpdate>,
    last_title: Option<String>,
    last_revision: Option<u64>,
}

impl TrayMirror {
    /// Creates a tray mirror sending updates on `update_tx`.
    pub fn new(update_tx: Sender<TrayUpdate>, show_seconds: bool) -> Self {
        Self {
            state: MirrorState::new(),
            icon_manager: IconManager::new(),
            menu_builder: MenuBuilder::new(),
            show_seconds,
            update_tx,
            last_title: None,
            last_revision: None,
        }
    }

    /// The title last sent to the host.
    pub fn last_title(&self) -> Option<&str> {
        self.last_title.as_deref()
    }

    fn send(&self, update: TrayUpdate) {
        if self.update_tx.send(update).is_err() {
            tracing::debug!("メニューバーが終了しているため更新を破棄しました");
        }
    }

    fn push_view(&mut self, view: &MirrorView) {
        let status_changed = self.icon_manager.status_changed(view.is_running);
        let revision_changed = self.last_revision != Some(view.revision);
        if status_changed || revision_changed {
            self.last_revision = Some(view.revision);
            self.send(TrayUpdate::RebuildMenu(self.menu_builder.build(view)));
            self.send(TrayUpdate::SetTooltip(
                self.icon_manager.generate_tooltip(view),
            ));
        }

        let title = self.icon_manager.generate_title(view, self.show_seconds);
        if self.last_title.as_deref() != Some(title.as_str()) {
            self.send(TrayUpdate::SetTitle(title.clone()));
            self.last_title = Some(title);
        }
    }
}

impl Mirror for TrayMirror {
    fn name(&self) -> &str {
        "tray"
    }

    fn state(&self) -> &MirrorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut MirrorState {
        &mut self.state
    }

    fn render(&mut self, now: DateTime<Utc>) {
        let view = self.state.view(now);
        self.push_view(&view);
    }

    fn on_shutdown(&mut self) {
        self.send(TrayUpdate::Shutdown);
    }
}

impl std::fmt::Debug for TrayMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrayMirror")
            .field("state", &self.state)
            .field("show_seconds", &self.show_seconds)
            .field("last_title", &self.last_title)
            .field("last_revision", &self.last_revision)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TrayHost
// ============================================================================

/// Owns what the menu bar shows and turns clicks into actions.
///
/// Runs on its own thread. It holds no engine state of its own; everything
/// displayed comes from `TrayUpdate`s.
pub struct TrayHost {
    /// Channel for receiving updates from the tray mirror
    update_rx: Receiver<TrayUpdate>,
    /// Channel for sending clicked actions to the daemon
    action_tx: UnboundedSender<MenuAction>,
    /// Event handler for menu clicks
    event_handler: EventHandler,
    title: String,
    tooltip: String,
    menu: Option<MenuConfig>,
    /// Whether the host is initialized
    initialized: bool,
}

impl TrayHost {
    /// Creates a new TrayHost.
    pub fn new(update_rx: Receiver<TrayUpdate>, action_tx: UnboundedSender<MenuAction>) -> Self {
        Self {
            update_rx,
            action_tx,
            event_handler: EventHandler::new(),
            title: String::new(),
            tooltip: String::new(),
            menu: None,
            initialized: false,
        }
    }

    /// Returns whether the host is initialized.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Current title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Current tooltip.
    pub fn tooltip(&self) -> &str {
        &self.tooltip
    }

    /// Current menu, if one was received.
    pub fn menu(&self) -> Option<&MenuConfig> {
        self.menu.as_ref()
    }

    /// Marks the host ready to display.
    pub fn initialize(&mut self) {
        self.initialized = true;
        tracing::info!("メニューバーを初期化しました");
    }

    /// Processes a pending update from the channel.
    ///
    /// Returns `true` if an update was processed, `false` if the channel was empty.
    pub fn process_pending_update(&mut self) -> bool {
        match self.update_rx.try_recv() {
            Ok(update) => {
                self.handle_update(update);
                true
            }
            Err(crossbeam_channel::TryRecvError::Empty) => false,
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                tracing::warn!("メニューバー更新チャネルが切断されました");
                false
            }
        }
    }

    /// Blocks on updates until shutdown or until the mirror is gone.
    pub fn run(mut self) -> Self {
        self.initialize();
        while self.initialized {
            match self.update_rx.recv() {
                Ok(update) => self.handle_update(update),
                Err(_) => {
                    tracing::warn!("メニューバー更新チャネルが切断されました");
                    self.shutdown();
                }
            }
        }
        self
    }

    /// Handles a click on a menu item.
    ///
    /// Clicks on disabled items are ignored. Returns the action sent.
    pub fn click(&self, item_id: MenuItemId) -> Option<MenuAction> {
        if !self.is_enabled(item_id) {
            tracing::debug!(item = ?item_id, "無効なメニュー項目のクリックを無視しました");
            return None;
        }
        let action = self.event_handler.handle_click(item_id)?;
        if self.action_tx.send(action).is_err() {
            tracing::warn!(action = %action, "デーモンが終了しているためアクションを送信できません");
            return None;
        }
        Some(action)
    }

    fn is_enabled(&self, item_id: MenuItemId) -> bool {
        match (&self.menu, item_id) {
            (Some(menu), MenuItemId::Start) => menu.start.enabled,
            (Some(menu), MenuItemId::Stop) => menu.stop.enabled,
            (_, MenuItemId::Quit) | (_, MenuItemId::Title) => true,
            _ => false,
        }
    }

    fn handle_update(&mut self, update: TrayUpdate) {
        match update {
            TrayUpdate::SetTitle(title) => {
                tracing::debug!(title = %title, "メニューバータイトル更新");
                self.title = title;
            }
            TrayUpdate::SetTooltip(tooltip) => {
                self.tooltip = tooltip;
            }
            TrayUpdate::RebuildMenu(menu) => {
                tracing::debug!("メニュー再構築");
                self.menu = Some(menu);
            }
            TrayUpdate::Shutdown => {
                tracing::info!("メニューバーをシャットダウン");
                self.shutdown();
            }
        }
    }

    /// Shuts down the host.
    pub fn shutdown(&mut self) {
        self.initialized = false;
    }
}

impl std::fmt::Debug for TrayHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrayHost")
            .field("initialized", &self.initialized)
            .field("title", &self.title)
            .field("tooltip", &self.tooltip)
            .field("event_handler", &self.event_handler)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

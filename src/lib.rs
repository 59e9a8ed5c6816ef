//! Timetrack Library
//!
//! This library provides the core functionality for the timetrack CLI.
//! It includes:
//! - SQLite session store with overlap and single-active invariants
//! - Timer engine owning the one active session
//! - Recovery of the active session after a restart
//! - Presentation mirrors (menu bar, terminal view) kept in sync with the engine
//! - IPC server/client for daemon-CLI communication
//! - CLI command parsing and display utilities

pub mod cli;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod menubar;
pub mod mirror;
pub mod store;
pub mod types;

// Re-export commonly used types for convenience
pub use types::{
    IpcRequest, IpcResponse, MonthKey, MonthlySummary, NewProject, NewSession, Project,
    ResponseData, SessionPatch, StartParams, TimeSession, TimerSnapshot,
};

pub use clock::{Clock, MockClock, SystemClock};
pub use config::AppConfig;
pub use daemon::{recover, RecoveryReport, TimerEngine, TimerEvent};
pub use store::{SessionStore, StoreError};

// Re-export mirror types
pub use mirror::{Mirror, MirrorDriver, MirrorState, MirrorView, WindowMirror};

// Re-export menubar types
pub use menubar::{
    EventHandler, MenuAction, MenuBuilder, MenuConfig, MenuItemId, TrayHost, TrayMirror,
    TrayUpdate,
};

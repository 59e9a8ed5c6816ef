//! CLI module for the time tracker.
//!
//! This module provides the command-line interface:
//! - `commands`: Command definitions using clap derive
//! - `client`: IPC client for daemon communication
//! - `display`: Output formatting and display logic
//! - `watch`: Live terminal view of the running session

pub mod client;
pub mod commands;
pub mod display;
pub mod watch;

pub use client::{DaemonError, IpcClient};
pub use commands::{AddArgs, Cli, Commands, EditArgs, ProjectCommands, ReportArgs, StartArgs};
pub use display::Display;
pub use watch::Watcher;

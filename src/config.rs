//! Application configuration.
//!
//! Loaded from `$TIMETRACK_HOME/config.toml` (default home: `~/.timetrack`).
//! Every field is optional; a missing file yields the defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::daemon::timer::EngineOptions;

// ============================================================================
// Constants
// ============================================================================

/// Environment variable overriding the data directory
pub const HOME_ENV: &str = "TIMETRACK_HOME";

/// Data directory name under the user's home
const DEFAULT_HOME_DIR: &str = ".timetrack";

const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "timetrack.db";
const SOCKET_FILE: &str = "timetrack.sock";

// ============================================================================
// TrayConfig
// ============================================================================

/// Menu bar settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrayConfig {
    /// Attach the tray mirror when the daemon starts.
    ///
    /// Off unless the config opts in: no platform status-bar backend drains
    /// the headless host yet.
    pub enabled: bool,
    /// Show seconds in the menu bar title
    pub show_seconds: bool,
}

impl Default for TrayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            show_seconds: true,
        }
    }
}

// ============================================================================
// AppConfig
// ============================================================================

/// Settings shared by the daemon and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database file (default `<home>/timetrack.db`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    /// Daemon socket (default `<home>/timetrack.sock`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
    /// Display tick interval in milliseconds (100-60000)
    pub tick_interval_ms: u64,
    /// Sessions returned by `list` without `--limit` (1-500)
    pub recent_limit: u32,
    /// Menu bar settings
    pub tray: TrayConfig,
    /// Data directory the relative defaults are resolved against
    #[serde(skip)]
    pub home: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            socket_path: None,
            tick_interval_ms: 1000,
            recent_limit: 20,
            tray: TrayConfig::default(),
            home: PathBuf::new(),
        }
    }
}

impl AppConfig {
    /// Default configuration rooted at `home`.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..Self::default()
        }
    }

    /// Loads the configuration.
    ///
    /// `path` overrides `<home>/config.toml`. A missing file yields the
    /// defaults; a malformed or invalid file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let home = home_dir()?;
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| home.join(CONFIG_FILE));
        Self::load_from(&path, home)
    }

    /// Loads `path`, resolving defaults against `home`.
    pub fn load_from(path: &Path, home: PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("設定ファイルを読み込めません: {:?}", path))?;
            toml::from_str::<AppConfig>(&text)
                .with_context(|| format!("設定ファイルの形式が不正です: {:?}", path))?
        } else {
            tracing::debug!(path = ?path, "設定ファイルがないためデフォルト設定を使用します");
            AppConfig::default()
        };
        config.home = home;

        config
            .validate()
            .map_err(|msg| anyhow::anyhow!("{} ({:?})", msg, path))?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !(100..=60_000).contains(&self.tick_interval_ms) {
            return Err("tick_interval_ms は100-60000の範囲で指定してください".to_string());
        }
        if !(1..=500).contains(&self.recent_limit) {
            return Err("recent_limit は1-500の範囲で指定してください".to_string());
        }
        Ok(())
    }

    /// Resolved database path.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.home.join(DATABASE_FILE))
    }

    /// Resolved socket path.
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| self.home.join(SOCKET_FILE))
    }

    /// Engine options derived from the configuration.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            tick_interval: std::time::Duration::from_millis(self.tick_interval_ms),
            ..EngineOptions::default()
        }
    }
}

/// Resolves the data directory: `$TIMETRACK_HOME`, else `~/.timetrack`.
pub fn home_dir() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    let home = dirs::home_dir().context("ホームディレクトリが見つかりません")?;
    Ok(home.join(DEFAULT_HOME_DIR))
}

// ============================================================================
// Tests
// ============================================================================

//! Presentation mirrors.
//!
//! A mirror displays engine state somewhere else (a window, the tray, a
//! terminal) without owning any of it:
//! - `MirrorState` holds the last applied snapshot and ignores stale ones
//! - `DisplayClock` recomputes elapsed time locally, re-anchored on every snapshot
//! - `MirrorDriver` attaches a mirror to the engine and feeds it events
//! - `WindowMirror` is the main-window view model

pub mod driver;
pub mod window;

use chrono::{DateTime, Utc};

use crate::types::{ProjectId, SessionId, TimerSnapshot};

pub use crate::daemon::timer::Attachment;
pub use driver::MirrorDriver;
pub use window::WindowMirror;

// ============================================================================
// DisplayClock
// ============================================================================

/// Local elapsed-time clock of a mirror.
///
/// Its origin is the active session's start time taken from the last
/// snapshot, never a locally accumulated counter, so independent mirrors
/// cannot drift apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayClock {
    origin: Option<DateTime<Utc>>,
}

impl DisplayClock {
    /// Re-anchors the clock on `snapshot`.
    pub fn resync(&mut self, snapshot: &TimerSnapshot) {
        self.origin = snapshot.started_at();
    }

    /// Start time the clock counts from.
    pub fn origin(&self) -> Option<DateTime<Utc>> {
        self.origin
    }

    /// Elapsed seconds at `now` (0 when idle).
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> i64 {
        self.origin
            .map(|origin| (now - origin).num_seconds().max(0))
            .unwrap_or(0)
    }
}

// ============================================================================
// MirrorView
// ============================================================================

/// What a mirror renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorView {
    /// True while a session is active
    pub is_running: bool,
    /// The active session
    pub session_id: Option<SessionId>,
    /// Elapsed seconds of the active session
    pub elapsed_seconds: i64,
    /// Description of the active session
    pub description: Option<String>,
    /// Project of the active session
    pub project_id: Option<ProjectId>,
    /// Engine revision the view is based on
    pub revision: u64,
}

impl MirrorView {
    /// The view an up-to-date mirror renders for `snapshot`.
    pub fn from_snapshot(snapshot: &TimerSnapshot) -> Self {
        Self {
            is_running: snapshot.is_running,
            session_id: snapshot.active_session.as_ref().map(|s| s.id),
            elapsed_seconds: snapshot.elapsed_seconds,
            description: snapshot.description.clone(),
            project_id: snapshot.project_id,
            revision: snapshot.revision,
        }
    }
}

// ============================================================================
// MirrorState
// ============================================================================

/// Cached engine state held by a mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorState {
    snapshot: Option<TimerSnapshot>,
    clock: DisplayClock,
}

impl MirrorState {
    /// Creates a state that has not seen any snapshot yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `snapshot` unless it is older than the one already applied.
    ///
    /// Revisions are only ordered within one engine instance: a snapshot from
    /// another epoch (the daemon was restarted) always replaces the cache.
    /// Returns false for a stale snapshot.
    pub fn apply(&mut self, snapshot: &TimerSnapshot) -> bool {
        if let Some(current) = &self.snapshot {
            if snapshot.epoch == current.epoch && snapshot.revision < current.revision {
                return false;
            }
            if snapshot.epoch != current.epoch {
                tracing::debug!(
                    previous = %current.epoch,
                    epoch = %snapshot.epoch,
                    "エンジンが再起動されたためキャッシュを置き換えます"
                );
            }
        }
        self.clock.resync(snapshot);
        self.snapshot = Some(snapshot.clone());
        true
    }

    /// Returns true once a snapshot was applied.
    pub fn is_synced(&self) -> bool {
        self.snapshot.is_some()
    }

    /// The last applied snapshot.
    pub fn snapshot(&self) -> Option<&TimerSnapshot> {
        self.snapshot.as_ref()
    }

    /// True if the last applied snapshot says running.
    pub fn is_running(&self) -> bool {
        self.snapshot.as_ref().is_some_and(|s| s.is_running)
    }

    /// Id of the active session of the last applied snapshot.
    pub fn session_id(&self) -> Option<SessionId> {
        self.snapshot
            .as_ref()
            .and_then(|s| s.active_session.as_ref())
            .map(|s| s.id)
    }

    /// The local display clock.
    pub fn clock(&self) -> &DisplayClock {
        &self.clock
    }

    /// Renders the state at `now`.
    pub fn view(&self, now: DateTime<Utc>) -> MirrorView {
        match &self.snapshot {
            Some(snapshot) => MirrorView {
                elapsed_seconds: self.clock.elapsed_at(now),
                ..MirrorView::from_snapshot(snapshot)
            },
            None => MirrorView::default(),
        }
    }
}

// ============================================================================
// Mirror
// ============================================================================

/// A read-only observer of the engine.
pub trait Mirror: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Cached state.
    fn state(&self) -> &MirrorState;

    /// Mutable cached state.
    fn state_mut(&mut self) -> &mut MirrorState;

    /// Redraws from `state()` at `now`.
    fn render(&mut self, now: DateTime<Utc>);

    /// Applies a snapshot and redraws. Returns false if it was stale.
    fn on_snapshot(&mut self, snapshot: &TimerSnapshot, now: DateTime<Utc>) -> bool {
        if !self.state_mut().apply(snapshot) {
            tracing::debug!(
                mirror = self.name(),
                revision = snapshot.revision,
                "古いスナップショットを無視しました"
            );
            return false;
        }
        self.render(now);
        true
    }

    /// Local display refresh. Only redraws while running.
    fn on_refresh(&mut self, now: DateTime<Utc>) {
        if self.state().is_running() {
            self.render(now);
        }
    }

    /// Called once when the mirror is detached.
    fn on_shutdown(&mut self) {}
}

/// Formats seconds as `HH:MM:SS` (hours are not wrapped).
pub fn format_hms(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

// ============================================================================
// Tests
// ============================================================================

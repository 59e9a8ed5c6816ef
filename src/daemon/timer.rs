//! Timer engine for the time tracker.
//!
//! This module provides the single authoritative timer:
//! - State transitions (Idle → Running → Idle) backed by the session store
//! - A display tick with tokio::time::interval that never touches the store
//! - Snapshot broadcasting to every attached mirror
//! - Engine-mediated edits that keep the cached active session in sync

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use uuid::Uuid;

use crate::clock::{truncate_to_second, Clock};
use crate::store::{SessionStore, StoreError};
use crate::types::{
    NewProject, NewSession, Project, ProjectAssignment, ProjectId, ProjectPatch, SessionId,
    SessionPatch, TimeSession, TimerSnapshot,
};

/// Default display tick period.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Default capacity of the event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// TimerEvent
// ============================================================================

/// Notifications broadcast by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// A session was started
    Started {
        /// State after the start
        snapshot: TimerSnapshot,
    },
    /// The active session was closed
    Stopped {
        /// The closed session
        session: TimeSession,
        /// State after the stop
        snapshot: TimerSnapshot,
    },
    /// The active session changed without a start/stop (annotate, edit, reconcile)
    Changed {
        /// State after the change
        snapshot: TimerSnapshot,
    },
    /// Display tick (derived from the session start, never persisted)
    Tick {
        /// The running session
        session_id: SessionId,
        /// Seconds since the session started
        elapsed_seconds: i64,
    },
}

impl TimerEvent {
    /// Returns the snapshot carried by a state-change event.
    pub fn snapshot(&self) -> Option<&TimerSnapshot> {
        match self {
            TimerEvent::Started { snapshot }
            | TimerEvent::Stopped { snapshot, .. }
            | TimerEvent::Changed { snapshot } => Some(snapshot),
            TimerEvent::Tick { .. } => None,
        }
    }
}

// ============================================================================
// Options / outcomes
// ============================================================================

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Display tick period
    pub tick_interval: Duration,
    /// Capacity of the broadcast channel
    pub channel_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// A snapshot together with a receiver subscribed at the same instant.
#[derive(Debug)]
pub struct Attachment {
    /// Current state
    pub snapshot: TimerSnapshot,
    /// Every event after `snapshot`
    pub events: broadcast::Receiver<TimerEvent>,
}

/// Result of [`TimerEngine::toggle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The timer was idle and is now running
    Started(TimerSnapshot),
    /// The timer was running and this session was closed
    Stopped(TimeSession),
}

// ============================================================================
// Ticker
// ============================================================================

/// Handle of the running display tick. Aborts the task on drop.
struct Ticker {
    handle: JoinHandle<()>,
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ============================================================================
// TimerEngine
// ============================================================================

/// The single authoritative timer.
///
/// Constructed only by [`crate::daemon::recovery::recover`], so the cached
/// active session always starts out equal to the store's.
pub struct TimerEngine {
    /// Durable storage
    store: SessionStore,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Cached active session (mirror of `store.get_active_session()`)
    active: Option<TimeSession>,
    /// Incremented on every state change
    revision: u64,
    /// Identifies this engine instance; revisions restart at 0 with each one
    epoch: Uuid,
    /// Event sender channel
    event_tx: broadcast::Sender<TimerEvent>,
    /// Display tick period
    tick_interval: Duration,
    /// Running display tick
    ticker: Option<Ticker>,
}

impl TimerEngine {
    pub(crate) fn restore(
        store: SessionStore,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
        active: Option<TimeSession>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(options.channel_capacity.max(1));
        let mut engine = Self {
            store,
            clock,
            active,
            revision: 0,
            epoch: Uuid::new_v4(),
            event_tx,
            tick_interval: options.tick_interval,
            ticker: None,
        };
        engine.spawn_ticker();
        engine
    }

    // -- State reads --

    /// Returns the current state.
    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot::new(self.active.as_ref(), self.revision, self.clock.now())
            .with_epoch(self.epoch)
    }

    /// Returns the current state and a receiver for every later event.
    pub fn attach(&self) -> Attachment {
        Attachment {
            snapshot: self.snapshot(),
            events: self.event_tx.subscribe(),
        }
    }

    /// Returns a receiver for engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.event_tx.subscribe()
    }

    /// Returns true while a session is active.
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Returns the cached active session.
    pub fn active_session(&self) -> Option<&TimeSession> {
        self.active.as_ref()
    }

    /// Returns the current revision.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns true while the display tick task is alive.
    pub fn is_ticking(&self) -> bool {
        self.ticker
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Read access to the store. All writes go through the engine.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    // -- Transitions --

    /// Starts a new session.
    ///
    /// # Errors
    ///
    /// `ActiveSessionExists` if a session is running (checked against the
    /// cache first, then by the store), any other store error unchanged.
    pub fn start(
        &mut self,
        description: Option<String>,
        project_id: Option<ProjectId>,
    ) -> Result<TimerSnapshot, StoreError> {
        if let Some(active) = &self.active {
            return Err(StoreError::ActiveSessionExists { id: active.id });
        }

        let new = NewSession {
            start_time: self.clock.now(),
            end_time: None,
            description: description.unwrap_or_default(),
            project_id,
        };

        match self.store.create_session(new) {
            Ok(session) => {
                tracing::info!(id = %session.id, "記録を開始しました");
                self.active = Some(session);
                self.spawn_ticker();
                let snapshot = self.advance();
                self.emit(TimerEvent::Started {
                    snapshot: snapshot.clone(),
                });
                Ok(snapshot)
            }
            Err(err) => {
                if matches!(err, StoreError::ActiveSessionExists { .. }) {
                    self.resync_after(&err);
                }
                Err(err)
            }
        }
    }

    /// Stops the active session.
    ///
    /// An end time at or before the start is clamped to `start + 1s`.
    ///
    /// # Errors
    ///
    /// `NoActiveSession` if idle, any store error unchanged.
    pub fn stop(&mut self, description: Option<String>) -> Result<TimeSession, StoreError> {
        let Some(active) = self.active.as_ref() else {
            return Err(StoreError::NoActiveSession);
        };

        let id = active.id;
        let earliest = active.start_time + chrono::Duration::seconds(1);
        let now = truncate_to_second(self.clock.now());
        let end = if now < earliest {
            tracing::warn!(
                id = %id,
                now = %now,
                "終了時刻が開始時刻以前のため、開始 + 1秒 に補正します"
            );
            earliest
        } else {
            now
        };

        match self.store.close_session(id, end, description) {
            Ok(session) => {
                tracing::info!(
                    id = %session.id,
                    duration = ?session.duration_seconds,
                    "記録を停止しました"
                );
                self.active = None;
                self.cancel_ticker();
                let snapshot = self.advance();
                self.emit(TimerEvent::Stopped {
                    session: session.clone(),
                    snapshot,
                });
                Ok(session)
            }
            Err(err) => {
                if matches!(
                    err,
                    StoreError::SessionNotFound(_) | StoreError::NotActive(_)
                ) {
                    self.resync_after(&err);
                }
                Err(err)
            }
        }
    }

    /// Stops if running, otherwise starts.
    ///
    /// When stopping, `description` becomes the final description and
    /// `project_id` is ignored.
    pub fn toggle(
        &mut self,
        description: Option<String>,
        project_id: Option<ProjectId>,
    ) -> Result<ToggleOutcome, StoreError> {
        if self.is_running() {
            self.stop(description).map(ToggleOutcome::Stopped)
        } else {
            self.start(description, project_id).map(ToggleOutcome::Started)
        }
    }

    /// Changes description and/or project of the active session.
    ///
    /// # Errors
    ///
    /// `NoActiveSession` if idle, `ProjectNotFound`, storage errors.
    pub fn annotate(
        &mut self,
        description: Option<String>,
        project: Option<ProjectAssignment>,
    ) -> Result<TimerSnapshot, StoreError> {
        let Some(active) = self.active.as_ref() else {
            return Err(StoreError::NoActiveSession);
        };
        let id = active.id;

        let patch = SessionPatch {
            description,
            project,
            ..SessionPatch::default()
        };
        match self.store.update_session(id, patch) {
            Ok(session) => {
                self.active = Some(session);
                let snapshot = self.advance();
                self.emit(TimerEvent::Changed {
                    snapshot: snapshot.clone(),
                });
                Ok(snapshot)
            }
            Err(err) => {
                if matches!(err, StoreError::SessionNotFound(_)) {
                    self.resync_after(&err);
                }
                Err(err)
            }
        }
    }

    // -- Engine-mediated edits --

    /// Records a closed entry `[start, end)`.
    pub fn create_entry(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        description: String,
        project_id: Option<ProjectId>,
    ) -> Result<TimeSession, StoreError> {
        let new = NewSession {
            start_time: start,
            end_time: Some(end),
            description,
            project_id,
        };
        let session = self.store.create_session(new)?;
        tracing::info!(id = %session.id, "エントリを追加しました");
        Ok(session)
    }

    /// Edits any session, the active one included.
    pub fn edit_session(
        &mut self,
        id: SessionId,
        patch: SessionPatch,
    ) -> Result<TimeSession, StoreError> {
        let session = self.store.update_session(id, patch)?;
        self.reconcile()?;
        Ok(session)
    }

    /// Deletes any session, the active one included.
    pub fn delete_session(&mut self, id: SessionId) -> Result<bool, StoreError> {
        let deleted = self.store.delete_session(id)?;
        if deleted {
            self.reconcile()?;
        }
        Ok(deleted)
    }

    /// Splits a closed session at `at`.
    pub fn split_session(
        &mut self,
        id: SessionId,
        at: DateTime<Utc>,
    ) -> Result<(TimeSession, TimeSession), StoreError> {
        self.store.split_session(id, at)
    }

    /// Creates a project.
    pub fn create_project(&mut self, project: NewProject) -> Result<Project, StoreError> {
        self.store.create_project(project)
    }

    /// Updates a project.
    pub fn update_project(
        &mut self,
        id: ProjectId,
        patch: ProjectPatch,
    ) -> Result<Project, StoreError> {
        self.store.update_project(id, patch)
    }

    /// Deletes an unreferenced project.
    pub fn delete_project(&mut self, id: ProjectId) -> Result<bool, StoreError> {
        self.store.delete_project(id)
    }

    /// Re-reads the active session from the store and broadcasts if it differs
    /// from the cache. Returns true if the cache changed.
    pub fn reconcile(&mut self) -> Result<bool, StoreError> {
        let stored = self.store.get_active_session()?;
        if stored == self.active {
            return Ok(false);
        }

        let tick_origin = |s: &Option<TimeSession>| s.as_ref().map(|s| (s.id, s.start_time));
        let restart_tick = tick_origin(&stored) != tick_origin(&self.active);

        tracing::info!(
            cached = ?self.active.as_ref().map(|s| s.id),
            stored = ?stored.as_ref().map(|s| s.id),
            "エンジン状態をストアと同期しました"
        );
        self.active = stored;
        if restart_tick {
            self.spawn_ticker();
        }

        let snapshot = self.advance();
        self.emit(TimerEvent::Changed { snapshot });
        Ok(true)
    }

    /// Cancels the display tick. Called on process teardown.
    pub fn shutdown(&mut self) {
        self.cancel_ticker();
        tracing::info!("タイマーエンジンを停止しました");
    }

    // -- Internals --

    fn advance(&mut self) -> TimerSnapshot {
        self.revision += 1;
        self.snapshot()
    }

    fn emit(&self, event: TimerEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::trace!("購読者がいないためイベントを破棄しました");
        }
    }

    fn resync_after(&mut self, cause: &StoreError) {
        tracing::warn!(error = %cause, "キャッシュとストアの不一致を検出しました");
        if let Err(err) = self.reconcile() {
            tracing::error!(error = %err, "ストアとの同期に失敗しました");
        }
    }

    /// (Re)starts the display tick for the active session, or stops it when idle.
    fn spawn_ticker(&mut self) {
        self.cancel_ticker();

        let Some(session) = self.active.as_ref() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("ランタイム外のため表示ティックを開始しません");
            return;
        };

        let tx = self.event_tx.clone();
        let clock = Arc::clone(&self.clock);
        let session_id = session.id;
        let started_at = session.start_time;
        let period = self.tick_interval;

        let handle = runtime.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let elapsed_seconds = (clock.now() - started_at).num_seconds().max(0);
                let _ = tx.send(TimerEvent::Tick {
                    session_id,
                    elapsed_seconds,
                });
            }
        });

        self.ticker = Some(Ticker { handle });
    }

    fn cancel_ticker(&mut self) {
        if self.ticker.take().is_some() {
            tracing::debug!("表示ティックを停止しました");
        }
    }
}

impl std::fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEngine")
            .field("active", &self.active.as_ref().map(|s| s.id))
            .field("revision", &self.revision)
            .field("epoch", &self.epoch)
            .field("ticking", &self.ticker.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

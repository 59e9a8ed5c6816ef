//! Startup recovery.
//!
//! Re-derives the engine state from the store before the engine accepts any
//! call. A session left open by a crash is resumed as-is: it is never closed
//! automatically, however long ago it started.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::store::{SessionStore, StoreError};
use crate::types::TimeSession;

use super::timer::{EngineOptions, TimerEngine};

/// Elapsed time above which a resumed session is logged as suspicious.
pub const LONG_RUNNING_WARNING_SECS: i64 = 12 * 60 * 60;

/// What recovery found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// The still-open session, if any
    pub resumed: Option<TimeSession>,
    /// Seconds between its start and `recovered_at` (0 when idle)
    pub elapsed_seconds: i64,
    /// Instant recovery ran
    pub recovered_at: DateTime<Utc>,
}

impl RecoveryReport {
    /// Returns true if an open session was resumed.
    pub fn is_resumed(&self) -> bool {
        self.resumed.is_some()
    }

    /// Returns true if the resumed session has been open for a suspiciously long time.
    pub fn is_long_running(&self) -> bool {
        self.is_resumed() && self.elapsed_seconds >= LONG_RUNNING_WARNING_SECS
    }
}

/// Builds the engine from the persisted state.
///
/// # Errors
///
/// Returns a storage error if the active session cannot be read. The caller
/// must treat this as fatal.
pub fn recover(
    store: SessionStore,
    clock: Arc<dyn Clock>,
    options: EngineOptions,
) -> Result<(TimerEngine, RecoveryReport), StoreError> {
    let active = store.get_active_session()?;
    let now = clock.now();

    let report = RecoveryReport {
        elapsed_seconds: active
            .as_ref()
            .map(|s| s.elapsed_seconds_at(now))
            .unwrap_or(0),
        resumed: active.clone(),
        recovered_at: now,
    };

    match &report.resumed {
        Some(session) => {
            tracing::info!(
                id = %session.id,
                started_at = %session.start_time,
                elapsed = report.elapsed_seconds,
                "記録中のセッションを復元しました"
            );
            if report.is_long_running() {
                tracing::warn!(
                    id = %session.id,
                    elapsed = report.elapsed_seconds,
                    "長時間記録中のセッションがあります。必要なら編集してください"
                );
            }
        }
        None => tracing::info!("記録中のセッションはありません"),
    }

    let engine = TimerEngine::restore(store, clock, options, active);
    Ok((engine, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::clock::MockClock;
    use crate::types::NewSession;

    fn at(day: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, h, 0, 0).unwrap()
    }

    #[test]
    fn test_recover_idle() {
        let store = SessionStore::open_in_memory().unwrap();
        let clock = Arc::new(MockClock::new(at(1, 9)));

        let (engine, report) = recover(store, clock, EngineOptions::default()).unwrap();

        assert!(!report.is_resumed());
        assert_eq!(report.elapsed_seconds, 0);
        assert!(!engine.snapshot().is_running);
    }

    #[test]
    fn test_recover_open_session() {
        let mut store = SessionStore::open_in_memory().unwrap();
        let open = store
            .create_session(NewSession::open(at(1, 9)).with_description("crashed"))
            .unwrap();
        let clock = Arc::new(MockClock::new(at(1, 11)));

        let (engine, report) = recover(store, clock, EngineOptions::default()).unwrap();

        assert_eq!(report.resumed.as_ref().map(|s| s.id), Some(open.id));
        assert_eq!(report.elapsed_seconds, 7200);
        assert!(!report.is_long_running());

        let snapshot = engine.snapshot();
        assert!(snapshot.is_running);
        assert_eq!(snapshot.elapsed_seconds, 7200);
        assert_eq!(snapshot.description.as_deref(), Some("crashed"));
    }

    #[test]
    fn test_stale_session_is_not_closed() {
        let mut store = SessionStore::open_in_memory().unwrap();
        store.create_session(NewSession::open(at(1, 9))).unwrap();
        let clock = Arc::new(MockClock::new(at(20, 9)));

        let (engine, report) = recover(store, clock, EngineOptions::default()).unwrap();

        assert!(report.is_long_running());
        assert_eq!(report.elapsed_seconds, 19 * 24 * 3600);
        assert!(engine.store().get_active_session().unwrap().is_some());
    }

    #[test]
    fn test_corrupt_active_row_is_fatal() {
        let store = SessionStore::open_in_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO time_sessions (id, start_time, created_at, updated_at)
                 VALUES ('broken', 100, 'x', 'x')",
                [],
            )
            .unwrap();
        let clock = Arc::new(MockClock::new(at(1, 9)));

        let result = recover(store, clock, EngineOptions::default());

        match result {
            Err(err) => assert!(err.is_fatal()),
            Ok(_) => panic!("Expected a fatal error"),
        }
    }
}

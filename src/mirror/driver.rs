//! Async loop attaching a mirror to the engine.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::clock::Clock;
use crate::daemon::timer::{Attachment, TimerEngine, TimerEvent};

use super::Mirror;

/// Feeds engine events and a local refresh tick to one mirror.
///
/// On start the driver takes a fresh snapshot (never assuming idle). When the
/// mirror falls behind the event channel, or a tick refers to a session the
/// mirror does not know, it re-reads the snapshot from the engine.
pub struct MirrorDriver<M: Mirror> {
    mirror: M,
    engine: Arc<Mutex<TimerEngine>>,
    clock: Arc<dyn Clock>,
    refresh: Duration,
}

impl<M: Mirror> MirrorDriver<M> {
    /// Creates a driver refreshing the display every `refresh`.
    pub fn new(
        mirror: M,
        engine: Arc<Mutex<TimerEngine>>,
        clock: Arc<dyn Clock>,
        refresh: Duration,
    ) -> Self {
        Self {
            mirror,
            engine,
            clock,
            refresh,
        }
    }

    /// Runs until `shutdown` turns true or the engine is dropped, then returns the mirror.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> M {
        let Attachment {
            snapshot,
            mut events,
        } = self.engine.lock().await.attach();
        self.mirror.on_snapshot(&snapshot, self.clock.now());
        tracing::debug!(
            mirror = self.mirror.name(),
            running = snapshot.is_running,
            "ミラーを接続しました"
        );

        let mut refresh = interval(self.refresh);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let stop_requested = *shutdown.borrow();
            if stop_requested {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(TimerEvent::Tick { session_id, .. }) => {
                        if self.mirror.state().session_id() == Some(session_id) {
                            self.mirror.on_refresh(self.clock.now());
                        } else {
                            self.resync().await;
                        }
                    }
                    Ok(event) => {
                        if let Some(snapshot) = event.snapshot() {
                            self.mirror.on_snapshot(snapshot, self.clock.now());
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            mirror = self.mirror.name(),
                            skipped,
                            "ミラーが遅延したため再同期します"
                        );
                        self.resync().await;
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = refresh.tick() => {
                    self.mirror.on_refresh(self.clock.now());
                }
            }
        }

        self.mirror.on_shutdown();
        tracing::debug!(mirror = self.mirror.name(), "ミラーを切断しました");
        self.mirror
    }

    async fn resync(&mut self) {
        let snapshot = self.engine.lock().await.snapshot();
        self.mirror.on_snapshot(&snapshot, self.clock.now());
    }
}

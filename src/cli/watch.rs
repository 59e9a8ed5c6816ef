//! Terminal view of the running session.
//!
//! `timetrack watch` is a mirror like the menu bar: it polls the daemon for a
//! snapshot and redraws one line. Between successful polls the elapsed time
//! keeps advancing from the cached start time.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};

use crate::mirror::{Mirror, WindowMirror};
use crate::types::TimerSnapshot;

use super::client::IpcClient;

/// Clears from the cursor to the end of the line.
const CLEAR_LINE: &str = "\x1b[K";

// ============================================================================
// Watcher
// ============================================================================

/// Polls the daemon and renders a [`WindowMirror`] on the terminal.
#[derive(Debug)]
pub struct Watcher {
    client: IpcClient,
    mirror: WindowMirror,
    poll_interval: Duration,
    /// Whether the last poll failed (logged once per outage)
    offline: bool,
}

impl Watcher {
    /// Creates a watcher polling every `poll_interval`.
    pub fn new(client: IpcClient, poll_interval: Duration) -> Self {
        Self {
            client,
            mirror: WindowMirror::new("watch"),
            poll_interval,
            offline: false,
        }
    }

    /// The mirror being rendered.
    pub fn mirror(&self) -> &WindowMirror {
        &self.mirror
    }

    /// Fetches one snapshot and returns the rendered line.
    pub async fn once(&mut self) -> Result<String> {
        let snapshot = self.fetch().await?;
        self.mirror.on_snapshot(&snapshot, Utc::now());
        Ok(self.mirror.headline())
    }

    /// Redraws until Ctrl-C.
    pub async fn run(mut self) -> Result<()> {
        // The first poll must succeed, otherwise there is nothing to show.
        let line = self.once().await?;
        draw(&line)?;

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll().await;
                    draw(&self.mirror.headline())?;
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        println!();
        Ok(())
    }

    /// One poll: apply a fresh snapshot, or keep counting locally.
    async fn poll(&mut self) {
        let now = Utc::now();
        match self.fetch().await {
            Ok(snapshot) => {
                if self.offline {
                    tracing::info!("Daemonとの接続が回復しました");
                    self.offline = false;
                }
                if !self.mirror.on_snapshot(&snapshot, now) {
                    self.mirror.on_refresh(now);
                }
            }
            Err(e) => {
                if !self.offline {
                    tracing::warn!(error = %e, "状態を取得できません。ローカル表示を続けます");
                    self.offline = true;
                }
                self.mirror.on_refresh(now);
            }
        }
    }

    async fn fetch(&self) -> Result<TimerSnapshot> {
        self.client
            .status()
            .await?
            .data
            .and_then(|d| d.snapshot)
            .context("Daemonの応答に状態が含まれていません")
    }
}

fn draw(line: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    write!(stdout, "\r{}{}", line, CLEAR_LINE)?;
    stdout.flush()?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

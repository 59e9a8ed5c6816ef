//! Daemon module for the time tracker.
//!
//! This module contains the core daemon functionality:
//! - `timer`: Timer engine owning the active session and the display tick
//! - `recovery`: Startup procedure restoring the engine from the store
//! - `ipc`: Unix socket server dispatching requests to the engine

pub mod ipc;
pub mod recovery;
pub mod timer;

pub use ipc::{IpcServer, RequestHandler};
pub use recovery::{recover, RecoveryReport};
pub use timer::{TimerEngine, TimerEvent};

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch, Mutex};

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::menubar::{ActionOutcome, EventHandler, MenuAction, TrayHost, TrayMirror};
use crate::mirror::MirrorDriver;
use crate::store::{SessionStore, StoreError};

/// What the main loop does after a menu bar action.
#[derive(Debug)]
enum LoopControl {
    Continue,
    Quit,
    /// Tear down and exit with the error
    Abort(anyhow::Error),
}

/// Decides how the main loop proceeds after `action` produced `result`.
///
/// A storage failure stops the daemon; a rejected intent only gets logged.
fn action_control(action: MenuAction, result: Result<ActionOutcome, StoreError>) -> LoopControl {
    match result {
        Ok(ActionOutcome::QuitRequested) => {
            tracing::info!("メニューバーから終了が要求されました");
            LoopControl::Quit
        }
        Ok(ActionOutcome::Applied(_)) => LoopControl::Continue,
        Err(e) if e.is_fatal() => {
            tracing::error!(action = %action, error = %e, "ストレージエラーが発生しました");
            LoopControl::Abort(
                anyhow::Error::new(e)
                    .context(format!("メニューバー操作「{}」の実行中にストレージが失敗しました", action)),
            )
        }
        Err(e) => {
            tracing::warn!(action = %action, error = %e, "アクションを実行できません");
            LoopControl::Continue
        }
    }
}

/// Runs the daemon until SIGINT, SIGTERM or a quit from the menu bar.
///
/// Startup: open the store, run recovery, attach the tray mirror, bind the
/// socket. Teardown: stop the mirrors, cancel the engine tick, remove the
/// socket file.
pub async fn run_daemon(config: &AppConfig) -> Result<()> {
    let database_path = config.database_path();
    if let Some(parent) = database_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("データディレクトリを作成できません: {:?}", parent))?;
    }

    let store = SessionStore::open(&database_path)
        .with_context(|| format!("データベースを開けません: {:?}", database_path))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (engine, report) = recover(store, Arc::clone(&clock), config.engine_options())
        .context("起動時の状態復元に失敗しました")?;
    tracing::info!(
        resumed = report.is_resumed(),
        elapsed = report.elapsed_seconds,
        "デーモンを起動しました"
    );
    let engine = Arc::new(Mutex::new(engine));

    let server = IpcServer::new(&config.socket_path())?;
    let handler = RequestHandler::new(Arc::clone(&engine)).with_recent_limit(config.recent_limit);
    tracing::info!(socket = ?server.socket_path(), "IPCサーバーを起動しました");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<MenuAction>();

    let tray = if config.tray.enabled {
        let (update_tx, update_rx) = crossbeam_channel::unbounded();
        let host = TrayHost::new(update_rx, action_tx.clone());
        let host_thread = std::thread::Builder::new()
            .name("tray".to_string())
            .spawn(move || host.run())
            .context("メニューバースレッドを起動できません")?;

        let driver = MirrorDriver::new(
            TrayMirror::new(update_tx, config.tray.show_seconds),
            Arc::clone(&engine),
            Arc::clone(&clock),
            config.engine_options().tick_interval,
        );
        let driver_task = tokio::spawn(driver.run(shutdown_rx.clone()));
        Some((driver_task, host_thread))
    } else {
        None
    };

    let event_handler = EventHandler::new();
    let mut sigterm = signal(SignalKind::terminate()).context("SIGTERMを監視できません")?;

    let mut exit: Result<()> = Ok(());
    loop {
        tokio::select! {
            accepted = server.accept() => match accepted {
                Ok(stream) => {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handler.serve(stream).await {
                            tracing::warn!(error = %e, "リクエスト処理に失敗しました");
                        }
                    });
                }
                Err(e) => tracing::warn!(error = %e, "接続の受け付けに失敗しました"),
            },
            Some(action) = action_rx.recv() => {
                let result = event_handler.execute(action, &mut *engine.lock().await);
                match action_control(action, result) {
                    LoopControl::Continue => {}
                    LoopControl::Quit => break,
                    LoopControl::Abort(e) => {
                        exit = Err(e);
                        break;
                    }
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("SIGINTを受信しました");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("SIGTERMを受信しました");
                break;
            }
        }
    }

    // Teardown
    let _ = shutdown_tx.send(true);
    if let Some((driver_task, host_thread)) = tray {
        if let Err(e) = driver_task.await {
            tracing::warn!(error = %e, "メニューバーミラーの終了に失敗しました");
        }
        let joined = tokio::task::spawn_blocking(move || host_thread.join()).await;
        if !matches!(joined, Ok(Ok(_))) {
            tracing::warn!("メニューバースレッドの終了に失敗しました");
        }
    }
    engine.lock().await.shutdown();
    drop(action_tx);
    drop(server);

    if exit.is_ok() {
        tracing::info!("デーモンを終了しました");
    }
    exit
}

// ============================================================================
// Tests
// ============================================================================

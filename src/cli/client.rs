//! IPC Client for communicating with the time tracker daemon.
//!
//! This module provides:
//! - Unix Domain Socket client
//! - One request per connection, response read until EOF
//! - Connection retry logic (the request itself is never resent)
//! - Timeout handling

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::timeout;

use crate::types::{
    AddParams, EditParams, IpcRequest, IpcResponse, NewProject, ProjectPatch, SessionId,
    StartParams,
};

// ============================================================================
// Constants
// ============================================================================

/// Connection timeout in seconds
const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Read/write timeout in seconds
const IO_TIMEOUT_SECS: u64 = 5;

/// Maximum response size in bytes (4MB, large listings included)
const MAX_RESPONSE_SIZE: u64 = 4 * 1024 * 1024;

/// Maximum connection attempts
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds (base delay, multiplied by attempt number)
const RETRY_DELAY_MS: u64 = 500;

// ============================================================================
// DaemonError
// ============================================================================

/// An error response returned by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DaemonError {
    /// Machine-readable code (e.g. `overlap`)
    pub code: Option<String>,
    /// Human-readable message
    pub message: String,
}

// ============================================================================
// IpcClient
// ============================================================================

/// IPC client for daemon communication.
#[derive(Debug, Clone)]
pub struct IpcClient {
    /// Socket path
    socket_path: PathBuf,
    /// Connection timeout
    timeout: Duration,
}

impl IpcClient {
    /// Creates a new IPC client for the given socket path.
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS),
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    // -- Timer --

    /// Starts tracking.
    pub async fn start(
        &self,
        description: Option<String>,
        project: Option<String>,
    ) -> Result<IpcResponse> {
        self.send(&IpcRequest::Start {
            params: StartParams {
                description,
                project,
            },
        })
        .await
    }

    /// Stops tracking.
    pub async fn stop(&self, description: Option<String>) -> Result<IpcResponse> {
        self.send(&IpcRequest::Stop { description }).await
    }

    /// Stops if running, otherwise starts.
    pub async fn toggle(
        &self,
        description: Option<String>,
        project: Option<String>,
    ) -> Result<IpcResponse> {
        self.send(&IpcRequest::Toggle {
            params: StartParams {
                description,
                project,
            },
        })
        .await
    }

    /// Queries the current state.
    pub async fn status(&self) -> Result<IpcResponse> {
        self.send(&IpcRequest::Status).await
    }

    /// Changes description/project of the active session.
    pub async fn annotate(
        &self,
        description: Option<String>,
        project: Option<String>,
    ) -> Result<IpcResponse> {
        self.send(&IpcRequest::Annotate {
            description,
            project,
        })
        .await
    }

    // -- Sessions --

    /// Most recent sessions.
    pub async fn list(&self, limit: Option<u32>) -> Result<IpcResponse> {
        self.send(&IpcRequest::List { limit }).await
    }

    /// Sessions starting in `[from, to)`.
    pub async fn range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<IpcResponse> {
        self.send(&IpcRequest::Range { from, to }).await
    }

    /// Adds a closed entry.
    pub async fn add(&self, params: AddParams) -> Result<IpcResponse> {
        self.send(&IpcRequest::Add { params }).await
    }

    /// Edits a session.
    pub async fn edit(&self, id: SessionId, params: EditParams) -> Result<IpcResponse> {
        self.send(&IpcRequest::Edit { id, params }).await
    }

    /// Deletes a session.
    pub async fn delete(&self, id: SessionId) -> Result<IpcResponse> {
        self.send(&IpcRequest::Delete { id }).await
    }

    /// Splits a closed session at `at`.
    pub async fn split(&self, id: SessionId, at: DateTime<Utc>) -> Result<IpcResponse> {
        self.send(&IpcRequest::Split { id, at }).await
    }

    /// Monthly per-project summary.
    pub async fn report(&self, year: i32, month: u32, offset_minutes: i32) -> Result<IpcResponse> {
        self.send(&IpcRequest::Report {
            year,
            month,
            offset_minutes,
        })
        .await
    }

    // -- Projects --

    /// Creates a project.
    pub async fn project_add(&self, project: NewProject) -> Result<IpcResponse> {
        self.send(&IpcRequest::ProjectAdd { project }).await
    }

    /// Lists projects.
    pub async fn project_list(&self) -> Result<IpcResponse> {
        self.send(&IpcRequest::ProjectList).await
    }

    /// Applies `patch` to a project given by name or id.
    pub async fn project_edit(&self, project: String, patch: ProjectPatch) -> Result<IpcResponse> {
        self.send(&IpcRequest::ProjectEdit { project, patch }).await
    }

    /// Deletes a project by name or id.
    pub async fn project_delete(&self, project: String) -> Result<IpcResponse> {
        self.send(&IpcRequest::ProjectDelete { project }).await
    }

    // -- Transport --

    /// Sends a request and returns the success response.
    ///
    /// An error response becomes a [`DaemonError`] inside the returned error.
    pub async fn send(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let mut stream = self.connect_with_retry().await?;
        let response = self.exchange(&mut stream, request).await?;

        if !response.is_success() {
            return Err(DaemonError {
                code: response.code,
                message: response.message,
            }
            .into());
        }

        Ok(response)
    }

    /// Connects to the daemon, retrying with a linear backoff.
    async fn connect_with_retry(&self) -> Result<UnixStream> {
        let mut attempt = 1;
        loop {
            match self.connect().await {
                Ok(stream) => return Ok(stream),
                Err(e) if attempt >= MAX_RETRIES => return Err(e),
                Err(e) => {
                    tracing::warn!("接続失敗 (試行 {}/{}): {}", attempt, MAX_RETRIES, e);
                    let delay = Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt));
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn connect(&self) -> Result<UnixStream> {
        timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("接続がタイムアウトしました")?
            .context("Daemonに接続できません。'timetrack daemon' を起動してください")
    }

    async fn exchange(&self, stream: &mut UnixStream, request: &IpcRequest) -> Result<IpcResponse> {
        let request_json =
            serde_json::to_vec(request).context("リクエストのシリアライズに失敗しました")?;

        timeout(
            Duration::from_secs(IO_TIMEOUT_SECS),
            stream.write_all(&request_json),
        )
        .await
        .context("書き込みがタイムアウトしました")?
        .context("リクエストの送信に失敗しました")?;

        // Shutdown write side to signal end of request
        stream
            .shutdown()
            .await
            .context("シャットダウンに失敗しました")?;

        let mut buffer = Vec::new();
        timeout(
            Duration::from_secs(IO_TIMEOUT_SECS),
            (&mut *stream)
                .take(MAX_RESPONSE_SIZE)
                .read_to_end(&mut buffer),
        )
        .await
        .context("読み込みがタイムアウトしました")?
        .context("レスポンスの受信に失敗しました")?;

        if buffer.is_empty() {
            anyhow::bail!("Daemonからの応答がありませんでした");
        }

        serde_json::from_slice(&buffer).context("レスポンスのパースに失敗しました")
    }
}

// ============================================================================
// Tests
// ============================================================================

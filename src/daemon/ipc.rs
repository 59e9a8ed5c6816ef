//! IPC Server for the time tracker daemon.
//!
//! This module provides Unix Domain Socket IPC functionality:
//! - Server that listens on a Unix socket
//! - One JSON request and one JSON response per connection
//! - Dispatch of every request through the single shared `TimerEngine`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::FixedOffset;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};

use crate::store::StoreError;
use crate::types::{
    AddParams, EditParams, IpcRequest, IpcResponse, MonthKey, NewProject, ProjectAssignment,
    ProjectId, ProjectPatch, ResponseData, SessionId, SessionPatch, StartParams,
};

use super::timer::{TimerEngine, ToggleOutcome};

// ============================================================================
// Constants
// ============================================================================

/// Maximum request size in bytes (64KB)
const MAX_REQUEST_SIZE: usize = 64 * 1024;

/// Read timeout in seconds
const READ_TIMEOUT_SECS: u64 = 5;

/// Default number of sessions returned by `list`
pub const DEFAULT_RECENT_LIMIT: u32 = 20;

/// Error code for requests rejected before reaching the engine
const INVALID_REQUEST: &str = "invalid_request";

// ============================================================================
// IpcError
// ============================================================================

/// IPC-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// Socket binding error
    #[error("Failed to bind socket: {0}")]
    BindError(String),

    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Read error
    #[error("Failed to read request: {0}")]
    ReadError(String),

    /// Write error
    #[error("Failed to write response: {0}")]
    WriteError(String),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Request too large
    #[error("Request too large (max {MAX_REQUEST_SIZE} bytes)")]
    RequestTooLarge,
}

// ============================================================================
// IpcServer
// ============================================================================

/// Unix Domain Socket IPC server.
pub struct IpcServer {
    /// Unix socket listener
    listener: UnixListener,
    /// Socket path (for cleanup)
    socket_path: PathBuf,
}

impl IpcServer {
    /// Creates a new IPC server bound to the specified socket path.
    ///
    /// If the socket file already exists, it will be removed before binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub fn new(socket_path: &Path) -> Result<Self> {
        // Remove a socket left behind by a crashed daemon
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .with_context(|| format!("Failed to remove existing socket: {:?}", socket_path))?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {:?}", parent))?;
        }

        let listener = UnixListener::bind(socket_path)
            .map_err(|e| IpcError::BindError(format!("{:?}: {}", socket_path, e)))?;

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
        })
    }

    /// Accepts an incoming client connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be accepted.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| IpcError::ConnectionError(e.to_string()))?;
        Ok(stream)
    }

    /// Receives and deserializes an IPC request from the stream.
    ///
    /// The client closes its write half after the request, so the request is
    /// everything up to EOF. Applies a read timeout to prevent blocking
    /// indefinitely.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or deserialization fails.
    pub async fn receive_request(stream: &mut UnixStream) -> Result<IpcRequest> {
        let mut buffer = Vec::new();
        let limit = (MAX_REQUEST_SIZE + 1) as u64;

        let read_result = timeout(
            Duration::from_secs(READ_TIMEOUT_SECS),
            (&mut *stream).take(limit).read_to_end(&mut buffer),
        )
        .await;

        match read_result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(IpcError::ReadError(e.to_string()).into()),
            Err(_) => return Err(IpcError::Timeout.into()),
        }

        if buffer.is_empty() {
            anyhow::bail!("Connection closed by client");
        }
        if buffer.len() > MAX_REQUEST_SIZE {
            return Err(IpcError::RequestTooLarge.into());
        }

        let request: IpcRequest = serde_json::from_slice(&buffer)
            .with_context(|| "Failed to deserialize IPC request")?;

        Ok(request)
    }

    /// Serializes and sends an IPC response to the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub async fn send_response(stream: &mut UnixStream, response: &IpcResponse) -> Result<()> {
        let json = serde_json::to_vec(response).context("Failed to serialize IPC response")?;

        stream
            .write_all(&json)
            .await
            .map_err(|e| IpcError::WriteError(e.to_string()))?;
        stream.flush().await.context("Failed to flush response")?;
        stream
            .shutdown()
            .await
            .context("Failed to close response stream")?;

        Ok(())
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

// ============================================================================
// RequestHandler
// ============================================================================

/// Handles IPC requests by dispatching to TimerEngine.
///
/// Every request takes the engine lock for its whole duration, so requests
/// are applied one at a time.
#[derive(Clone)]
pub struct RequestHandler {
    /// Shared reference to the timer engine
    engine: Arc<Mutex<TimerEngine>>,
    /// Limit used by `list` when the request has none
    recent_limit: u32,
}

impl RequestHandler {
    /// Creates a new request handler with the given timer engine.
    pub fn new(engine: Arc<Mutex<TimerEngine>>) -> Self {
        Self {
            engine,
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }

    /// Sets the default `list` limit.
    pub fn with_recent_limit(mut self, limit: u32) -> Self {
        self.recent_limit = limit;
        self
    }

    /// Reads one request from `stream`, handles it and writes the response.
    ///
    /// A malformed request gets an `invalid_request` error response.
    pub async fn serve(&self, mut stream: UnixStream) -> Result<()> {
        let response = match IpcServer::receive_request(&mut stream).await {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                tracing::warn!(error = %e, "不正なリクエストを受信しました");
                IpcResponse::error(INVALID_REQUEST, format!("不正なリクエストです: {}", e))
            }
        };
        IpcServer::send_response(&mut stream, &response).await
    }

    /// Handles an IPC request and returns the appropriate response.
    pub async fn handle(&self, request: IpcRequest) -> IpcResponse {
        tracing::debug!(request = ?request, "リクエストを処理します");
        match request {
            IpcRequest::Start { params } => self.handle_start(params).await,
            IpcRequest::Stop { description } => self.handle_stop(description).await,
            IpcRequest::Toggle { params } => self.handle_toggle(params).await,
            IpcRequest::Status => self.handle_status().await,
            IpcRequest::Annotate {
                description,
                project,
            } => self.handle_annotate(description, project).await,
            IpcRequest::List { limit } => self.handle_list(limit).await,
            IpcRequest::Range { from, to } => self.handle_range(from, to).await,
            IpcRequest::Add { params } => self.handle_add(params).await,
            IpcRequest::Edit { id, params } => self.handle_edit(id, params).await,
            IpcRequest::Delete { id } => self.handle_delete(id).await,
            IpcRequest::Split { id, at } => self.handle_split(id, at).await,
            IpcRequest::Report {
                year,
                month,
                offset_minutes,
            } => self.handle_report(year, month, offset_minutes).await,
            IpcRequest::ProjectAdd { project } => self.handle_project_add(project).await,
            IpcRequest::ProjectList => self.handle_project_list().await,
            IpcRequest::ProjectEdit { project, patch } => {
                self.handle_project_edit(project, patch).await
            }
            IpcRequest::ProjectDelete { project } => self.handle_project_delete(project).await,
        }
    }

    // -- Timer --

    async fn handle_start(&self, params: StartParams) -> IpcResponse {
        let mut engine = self.engine.lock().await;

        let project_id = match resolve_optional(&engine, params.project.as_deref()) {
            Ok(id) => id,
            Err(e) => return error_response(&e),
        };

        match engine.start(params.description, project_id) {
            Ok(snapshot) => IpcResponse::success(
                "記録を開始しました",
                Some(ResponseData::from_snapshot(snapshot)),
            ),
            Err(e) => error_response(&e),
        }
    }

    async fn handle_stop(&self, description: Option<String>) -> IpcResponse {
        let mut engine = self.engine.lock().await;

        match engine.stop(description) {
            Ok(session) => IpcResponse::success(
                "記録を停止しました",
                Some(ResponseData::from_session(session).with_snapshot(engine.snapshot())),
            ),
            Err(e) => error_response(&e),
        }
    }

    async fn handle_toggle(&self, params: StartParams) -> IpcResponse {
        let mut engine = self.engine.lock().await;

        // The project only matters when the toggle starts a session
        let project_id = if engine.is_running() {
            None
        } else {
            match resolve_optional(&engine, params.project.as_deref()) {
                Ok(id) => id,
                Err(e) => return error_response(&e),
            }
        };

        match engine.toggle(params.description, project_id) {
            Ok(ToggleOutcome::Started(snapshot)) => IpcResponse::success(
                "記録を開始しました",
                Some(ResponseData::from_snapshot(snapshot)),
            ),
            Ok(ToggleOutcome::Stopped(session)) => IpcResponse::success(
                "記録を停止しました",
                Some(ResponseData::from_session(session).with_snapshot(engine.snapshot())),
            ),
            Err(e) => error_response(&e),
        }
    }

    async fn handle_status(&self) -> IpcResponse {
        let engine = self.engine.lock().await;
        IpcResponse::success("", Some(ResponseData::from_snapshot(engine.snapshot())))
    }

    async fn handle_annotate(
        &self,
        description: Option<String>,
        project: Option<String>,
    ) -> IpcResponse {
        if description.is_none() && project.is_none() {
            return IpcResponse::error(INVALID_REQUEST, "変更内容が指定されていません");
        }
        let mut engine = self.engine.lock().await;

        let assignment = match resolve_optional(&engine, project.as_deref()) {
            Ok(id) => id.map(ProjectAssignment::Project),
            Err(e) => return error_response(&e),
        };

        match engine.annotate(description, assignment) {
            Ok(snapshot) => IpcResponse::success(
                "記録中のセッションを更新しました",
                Some(ResponseData::from_snapshot(snapshot)),
            ),
            Err(e) => error_response(&e),
        }
    }

    // -- Queries --

    async fn handle_list(&self, limit: Option<u32>) -> IpcResponse {
        let engine = self.engine.lock().await;
        let limit = limit.unwrap_or(self.recent_limit);

        match engine.store().recent_sessions(limit) {
            Ok(sessions) => IpcResponse::success(
                format!("{}件のセッション", sessions.len()),
                Some(ResponseData::from_sessions(sessions).with_snapshot(engine.snapshot())),
            ),
            Err(e) => error_response(&e),
        }
    }

    async fn handle_range(
        &self,
        from: chrono::DateTime<chrono::Utc>,
        to: chrono::DateTime<chrono::Utc>,
    ) -> IpcResponse {
        let engine = self.engine.lock().await;

        match engine.store().query_by_date_range(from, to) {
            Ok(sessions) => IpcResponse::success(
                format!("{}件のセッション", sessions.len()),
                Some(ResponseData::from_sessions(sessions)),
            ),
            Err(e) => error_response(&e),
        }
    }

    async fn handle_report(&self, year: i32, month: u32, offset_minutes: i32) -> IpcResponse {
        let Some(offset) = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
        else {
            return IpcResponse::error(
                INVALID_REQUEST,
                format!("無効なUTCオフセットです: {}分", offset_minutes),
            );
        };
        let engine = self.engine.lock().await;

        match engine
            .store()
            .monthly_summary(MonthKey::new(year, month), offset)
        {
            Ok(summary) => IpcResponse::success(
                format!("{} の集計", summary.month),
                Some(ResponseData::from_summary(summary)),
            ),
            Err(e) => error_response(&e),
        }
    }

    // -- Edits --

    async fn handle_add(&self, params: AddParams) -> IpcResponse {
        let mut engine = self.engine.lock().await;

        let project_id = match resolve_optional(&engine, params.project.as_deref()) {
            Ok(id) => id,
            Err(e) => return error_response(&e),
        };

        match engine.create_entry(params.start, params.end, params.description, project_id) {
            Ok(session) => IpcResponse::success(
                "エントリを追加しました",
                Some(ResponseData::from_session(session)),
            ),
            Err(e) => error_response(&e),
        }
    }

    async fn handle_edit(&self, id: SessionId, params: EditParams) -> IpcResponse {
        if params.unassign && params.project.is_some() {
            return IpcResponse::error(
                INVALID_REQUEST,
                "プロジェクトの指定と解除は同時に行えません",
            );
        }
        let mut engine = self.engine.lock().await;

        let project = if params.unassign {
            Some(ProjectAssignment::Unassigned)
        } else {
            match resolve_optional(&engine, params.project.as_deref()) {
                Ok(id) => id.map(ProjectAssignment::Project),
                Err(e) => return error_response(&e),
            }
        };

        let patch = SessionPatch {
            start_time: params.start,
            end_time: params.end,
            description: params.description,
            project,
        };
        if patch.is_empty() {
            return IpcResponse::error(INVALID_REQUEST, "変更内容が指定されていません");
        }

        match engine.edit_session(id, patch) {
            Ok(session) => IpcResponse::success(
                "セッションを更新しました",
                Some(ResponseData::from_session(session).with_snapshot(engine.snapshot())),
            ),
            Err(e) => error_response(&e),
        }
    }

    async fn handle_delete(&self, id: SessionId) -> IpcResponse {
        let mut engine = self.engine.lock().await;

        match engine.delete_session(id) {
            Ok(true) => IpcResponse::success(
                "セッションを削除しました",
                Some(ResponseData::from_snapshot(engine.snapshot())),
            ),
            Ok(false) => error_response(&StoreError::SessionNotFound(id)),
            Err(e) => error_response(&e),
        }
    }

    async fn handle_split(&self, id: SessionId, at: chrono::DateTime<chrono::Utc>) -> IpcResponse {
        let mut engine = self.engine.lock().await;

        match engine.split_session(id, at) {
            Ok((first, second)) => IpcResponse::success(
                "セッションを分割しました",
                Some(ResponseData::from_sessions(vec![first, second])),
            ),
            Err(e) => error_response(&e),
        }
    }

    // -- Projects --

    async fn handle_project_add(&self, project: NewProject) -> IpcResponse {
        let mut engine = self.engine.lock().await;

        match engine.create_project(project) {
            Ok(project) => IpcResponse::success(
                format!("プロジェクト「{}」を作成しました", project.name),
                Some(ResponseData::from_projects(vec![project])),
            ),
            Err(e) => error_response(&e),
        }
    }

    async fn handle_project_list(&self) -> IpcResponse {
        let engine = self.engine.lock().await;

        match engine.store().list_projects() {
            Ok(projects) => IpcResponse::success(
                format!("{}件のプロジェクト", projects.len()),
                Some(ResponseData::from_projects(projects)),
            ),
            Err(e) => error_response(&e),
        }
    }

    async fn handle_project_edit(&self, reference: String, patch: ProjectPatch) -> IpcResponse {
        if patch.is_empty() {
            return IpcResponse::error(INVALID_REQUEST, "変更内容が指定されていません");
        }
        let mut engine = self.engine.lock().await;

        let project = match engine.store().resolve_project(&reference) {
            Ok(project) => project,
            Err(e) => return error_response(&e),
        };

        match engine.update_project(project.id, patch) {
            Ok(updated) => IpcResponse::success(
                format!("プロジェクト「{}」を更新しました", updated.name),
                Some(ResponseData::from_projects(vec![updated])),
            ),
            Err(e) => error_response(&e),
        }
    }

    async fn handle_project_delete(&self, reference: String) -> IpcResponse {
        let mut engine = self.engine.lock().await;

        let project = match engine.store().resolve_project(&reference) {
            Ok(project) => project,
            Err(e) => return error_response(&e),
        };

        match engine.delete_project(project.id) {
            Ok(true) => IpcResponse::success(
                format!("プロジェクト「{}」を削除しました", project.name),
                None,
            ),
            Ok(false) => error_response(&StoreError::ProjectNotFound(reference)),
            Err(e) => error_response(&e),
        }
    }
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler")
            .field("recent_limit", &self.recent_limit)
            .finish_non_exhaustive()
    }
}

/// Resolves an optional project name or id.
fn resolve_optional(
    engine: &TimerEngine,
    reference: Option<&str>,
) -> Result<Option<ProjectId>, StoreError> {
    reference
        .map(|r| engine.store().resolve_project(r).map(|p| p.id))
        .transpose()
}

/// Builds the error response for a store error.
fn error_response(err: &StoreError) -> IpcResponse {
    if err.is_fatal() {
        tracing::error!(error = %err, "ストレージエラーが発生しました");
    } else {
        tracing::debug!(code = err.code(), error = %err, "リクエストを拒否しました");
    }
    IpcResponse::error(err.code(), err.to_string())
}

// ============================================================================
// Tests
// ============================================================================

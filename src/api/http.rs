//! HTTP API Server
//!
//! Login, listing, folder creation and file transfer endpoints. Every
//! authenticated request resolves its token and opens a fresh backend
//! session; nothing is cached between requests except the token table.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Json, Multipart,
        Path as UrlPath, Query, State,
    },
    http::{header, HeaderMap, HeaderValue},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::error::{ApiError, ApiResult, TextError};
use crate::auth::{IssuedToken, TokenBroker};
use crate::backend::{SessionFactory, StorageSession};
use crate::config::{ServerConfig, WolfDriveConfig};
use crate::error::{Error, Result};
use crate::listing::{project, Listing};
use crate::locator::locate;
use crate::transfer::{stream_down, stream_up, StagedFile};

/// Shared application state
pub struct AppState {
    /// Token table and credential checks
    pub broker: Arc<TokenBroker>,
    /// Per-request backend sessions
    pub sessions: Arc<SessionFactory>,
    /// Where multipart uploads are staged
    pub staging_dir: PathBuf,
    pub max_upload_bytes: u64,
    /// Upload completion limit
    pub transfer_timeout: Option<Duration>,
    /// Per-chunk download limit
    pub idle_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(config: &WolfDriveConfig, broker: Arc<TokenBroker>, sessions: Arc<SessionFactory>) -> Self {
        Self {
            broker,
            sessions,
            staging_dir: config.staging.dir.clone(),
            max_upload_bytes: config.staging.max_upload_bytes,
            transfer_timeout: config.transfer_timeout(),
            idle_timeout: config.transfer_idle_timeout(),
        }
    }

    /// Open a backend session for the token carried by a request
    async fn session(&self, headers: &HeaderMap, query_token: Option<&str>) -> ApiResult<Box<dyn StorageSession>> {
        let credentials = self
            .broker
            .resolve(headers, query_token)
            .await
            .ok_or_else(ApiError::unauthorized)?;
        Ok(self.sessions.open(&credentials).await?)
    }
}

/// HTTP API server
pub struct HttpServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Get the state for sharing with other components
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Start the HTTP server and run until `shutdown` completes
    pub async fn start<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = create_router(Arc::clone(&self.state), &self.config);

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Internal(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let upload_limit = usize::try_from(state.max_upload_bytes).unwrap_or(usize::MAX);

    let mut router = Router::new()
        // Session
        .route("/api/login", post(handle_login))
        .route("/api/logout", post(handle_logout))
        // Node graph
        .route("/api/files", get(handle_files))
        .route("/api/folder", post(handle_create_folder))
        // Transfers
        .route("/api/download/:file_id", get(handle_download))
        .route(
            "/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/health", get(handle_health))
        .with_state(state);

    if let Some(dir) = &config.static_dir {
        tracing::info!("Serving static files from {}", dir.display());
        router = router.fallback_service(ServeDir::new(dir));
    }
    if config.cors_enabled {
        router = router.layer(CorsLayer::permissive());
    }

    router.layer(TraceLayer::new_for_http())
}

// ============ Request/Response Types ============

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Token carried in the query string
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Listing query
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesQuery {
    pub folder_id: Option<String>,
    pub token: Option<String>,
}

/// Folder creation request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Folder creation response
#[derive(Debug, Serialize)]
pub struct CreateFolderResponse {
    pub success: bool,
    pub message: String,
    pub folder: FolderSummary,
}

/// A newly created folder
#[derive(Debug, Serialize)]
pub struct FolderSummary {
    pub name: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// Logout response
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub backend: &'static str,
    pub active_sessions: usize,
}

// ============ Handlers ============

async fn handle_login(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<IssuedToken>> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let issued = state.broker.issue(&req.email, &req.password).await?;
    Ok(Json(issued))
}

async fn handle_logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> ApiResult<Json<LogoutResponse>> {
    if !state.broker.revoke(&headers, query.token.as_deref()).await {
        return Err(ApiError::unauthorized());
    }
    Ok(Json(LogoutResponse { success: true }))
}

async fn handle_files(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<FilesQuery>,
) -> ApiResult<Json<Listing>> {
    let session = state.session(&headers, query.token.as_deref()).await?;
    let root = session.root().clone();

    let dir = match query.folder_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => locate(session.as_ref(), &root, id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Folder not found".into()))?,
        None => root,
    };
    if !dir.is_directory() {
        return Err(ApiError::BadRequest("Not a folder".into()));
    }

    let listing = project(session.as_ref(), &dir).await.map_err(|e| {
        tracing::error!("Error listing {}: {}", dir.id, e);
        ApiError::from(e)
    })?;
    Ok(Json(listing))
}

async fn handle_create_folder(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    payload: std::result::Result<Json<CreateFolderRequest>, JsonRejection>,
) -> ApiResult<Json<CreateFolderResponse>> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if req.name.is_empty() {
        return Err(ApiError::BadRequest("Folder name is required".into()));
    }

    let session = state.session(&headers, query.token.as_deref()).await?;
    let root = session.root().clone();

    let parent = match req.parent_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => {
            let node = locate(session.as_ref(), &root, id)
                .await?
                .ok_or_else(|| ApiError::NotFound("Parent folder not found".into()))?;
            if !node.is_directory() {
                return Err(ApiError::BadRequest("Parent is not a folder".into()));
            }
            node
        }
        None => root,
    };

    let folder = session.mkdir(&parent, &req.name).await.map_err(|e| {
        tracing::error!("Error creating folder {}: {}", req.name, e);
        ApiError::from(e)
    })?;
    tracing::info!("Created folder {} ({}) in {}", folder.name, folder.id, parent.name);

    Ok(Json(CreateFolderResponse {
        success: true,
        message: format!("Folder \"{}\" created successfully", req.name),
        folder: FolderSummary {
            name: folder.name,
            id: folder.id,
            kind: "folder",
        },
    }))
}

async fn handle_download(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    UrlPath(file_id): UrlPath<String>,
    Query(query): Query<TokenQuery>,
) -> std::result::Result<Response, TextError> {
    let session = state
        .session(&headers, query.token.as_deref())
        .await
        .map_err(ApiError::into_text)?;
    let root = session.root().clone();

    let file = match locate(session.as_ref(), &root, &file_id).await {
        Ok(Some(node)) if node.is_file() => node,
        Ok(_) => return Err(ApiError::NotFound("File not found".into()).into_text()),
        Err(e) => return Err(download_error(e)),
    };

    let download = stream_down(session.as_ref(), &file, state.idle_timeout)
        .await
        .map_err(download_error)?;

    let disposition = HeaderValue::from_str(&download.content_disposition)
        .map_err(|e| download_error(Error::Internal(e.to_string())))?;

    Response::builder()
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, download.size)
        .body(Body::from_stream(download.body))
        .map_err(|e| download_error(Error::Internal(e.to_string())))
}

fn download_error(e: Error) -> TextError {
    tracing::error!("File download error: {}", e);
    if e.is_auth_failure() {
        return ApiError::unauthorized().into_text();
    }
    ApiError::Internal(format!("File download error: {}", e)).into_text()
}

/// Parsed multipart upload form
#[derive(Default)]
struct UploadForm {
    staged: Option<StagedFile>,
    folder_id: Option<String>,
}

async fn handle_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<String, TextError> {
    // credentials are checked before any of the body is read
    let credentials = state
        .broker
        .resolve(&headers, query.token.as_deref())
        .await
        .ok_or_else(|| ApiError::unauthorized().into_text())?;

    let mut multipart = multipart.map_err(form_error)?;
    let form = read_upload_form(&mut multipart, &state.staging_dir).await?;
    let staged = form
        .staged
        .ok_or_else(|| ApiError::BadRequest("File not found".into()).into_text())?;
    let file_name = staged.file_name().to_string();

    let session = match state.sessions.open(&credentials).await {
        Ok(session) => session,
        Err(e) => {
            staged.discard().await;
            return Err(ApiError::from(e).into_text());
        }
    };

    stream_up(
        session.as_ref(),
        form.folder_id.as_deref(),
        staged,
        state.transfer_timeout,
    )
    .await
    .map_err(|e| ApiError::Internal(format!("Upload error: {}", e)).into_text())?;

    Ok(format!("File \"{}\" uploaded successfully!", file_name))
}

/// Stage the `file` part to disk and collect `folderId`.
///
/// Only the first `file` part is kept; unknown parts are skipped.
async fn read_upload_form(multipart: &mut Multipart, staging_dir: &Path) -> std::result::Result<UploadForm, TextError> {
    let mut form = UploadForm::default();

    while let Some(mut field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") if form.staged.is_none() => {
                let file_name = field
                    .file_name()
                    .filter(|n| !n.is_empty())
                    .unwrap_or("upload")
                    .to_string();
                let (staged, mut handle) = StagedFile::create(staging_dir, &file_name)
                    .await
                    .map_err(form_error)?;
                while let Some(chunk) = field.chunk().await.map_err(form_error)? {
                    handle.write_all(&chunk).await.map_err(form_error)?;
                }
                handle.flush().await.map_err(form_error)?;
                form.staged = Some(staged);
            }
            Some("folderId") => {
                form.folder_id = Some(field.text().await.map_err(form_error)?);
            }
            _ => {}
        }
    }

    Ok(form)
}

fn form_error(e: impl std::fmt::Display) -> TextError {
    tracing::error!("Form parsing error: {}", e);
    ApiError::Internal(format!("File upload error: {}", e)).into_text()
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        backend: state.sessions.backend_name(),
        active_sessions: state.broker.active_sessions().await,
    })
}

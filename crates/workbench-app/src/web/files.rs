// File manager routes under /api/files
//
// Every handler maps the optional workspace id to a root, then defers to the
// sandboxed operations, which resolve each path before touching the disk.

use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, Query, State},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio_util::io::ReaderStream;
use tracing::info;
use workbench_sandbox::{ops, EntryKind, FileNode};

use super::error::AppError;
use super::routes::{AppState, Authenticated};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceQuery {
    pub workspace_id: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    pub workspace_id: Option<String>,
    pub path: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub workspace_id: Option<String>,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    pub workspace_id: Option<String>,
    pub old_path: String,
    pub new_path: String,
}

/// Path for DELETE; read from the JSON body before the query string
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub workspace_id: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadQuery {
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub target_dir: String,
}

fn root_for(state: &AppState, query_id: Option<&str>, body_id: Option<&str>) -> Result<PathBuf, AppError> {
    // Query string wins over the body, like the front-end sends it
    Ok(state.roots.root_for(query_id.or(body_id))?)
}

fn required<'a>(value: &'a Option<String>, message: &str) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(message.to_string()))
}

fn success() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": true }))
}

/// Content type served for a file, by extension
fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "html" => "text/html",
        "json" => "application/json",
        "js" => "text/javascript",
        "css" => "text/css",
        _ => "application/octet-stream",
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

/// GET /api/files/tree
pub async fn tree(
    _auth: Authenticated,
    State(state): State<AppState>,
    Query(query): Query<WorkspaceQuery>,
) -> Result<Json<Vec<FileNode>>, AppError> {
    let root = root_for(&state, query.workspace_id.as_deref(), None)?;
    Ok(Json(ops::tree(&root).await?))
}

/// GET /api/files/read?path=...
pub async fn read(
    _auth: Authenticated,
    State(state): State<AppState>,
    Query(query): Query<WorkspaceQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let path = required(&query.path, "Path required")?;
    let root = root_for(&state, query.workspace_id.as_deref(), None)?;
    let content = ops::read_to_string(&root, path).await?;
    Ok(Json(serde_json::json!({ "content": content })))
}

/// GET /api/files/raw?path=...
///
/// Streams the file without buffering it, for images and downloads.
pub async fn raw(
    _auth: Authenticated,
    State(state): State<AppState>,
    Query(query): Query<WorkspaceQuery>,
) -> Result<Response, AppError> {
    let path = required(&query.path, "Path required")?;
    let root = root_for(&state, query.workspace_id.as_deref(), None)?;
    let (full_path, file) = ops::open(&root, path).await?;

    let body = Body::from_stream(ReaderStream::new(file));
    Ok(([(CONTENT_TYPE, content_type_for(&full_path))], body).into_response())
}

/// POST /api/files/write
pub async fn write(
    _auth: Authenticated,
    State(state): State<AppState>,
    Query(query): Query<WorkspaceQuery>,
    Json(body): Json<WriteRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if body.path.is_empty() {
        return Err(AppError::BadRequest("Path required".to_string()));
    }
    let root = root_for(&state, query.workspace_id.as_deref(), body.workspace_id.as_deref())?;
    let written = ops::write(&root, &body.path, body.content.as_bytes()).await?;
    info!(path = %written.display(), bytes = body.content.len(), "file written");
    Ok(success())
}

/// POST /api/files/create
pub async fn create(
    _auth: Authenticated,
    State(state): State<AppState>,
    Query(query): Query<WorkspaceQuery>,
    Json(body): Json<CreateRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if body.path.is_empty() {
        return Err(AppError::BadRequest("Path and type required".to_string()));
    }
    let root = root_for(&state, query.workspace_id.as_deref(), body.workspace_id.as_deref())?;
    let created = ops::create(&root, &body.path, body.kind).await?;
    info!(path = %created.display(), kind = %body.kind, "entry created");
    Ok(success())
}

/// POST /api/files/upload?targetDir=... (multipart)
///
/// Stores the first file part under the target directory, keeping its name.
pub async fn upload(
    _auth: Authenticated,
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let root = root_for(&state, query.workspace_id.as_deref(), None)?;

    while let Some(field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content = field.bytes().await?;
        let stored = ops::save_upload(&root, &query.target_dir, &file_name, &content).await?;
        info!(path = %stored, bytes = content.len(), "file uploaded");
        return Ok(Json(serde_json::json!({ "success": true, "path": stored })));
    }

    Err(AppError::BadRequest("No file uploaded".to_string()))
}

/// POST /api/files/rename
pub async fn rename(
    _auth: Authenticated,
    State(state): State<AppState>,
    Query(query): Query<WorkspaceQuery>,
    Json(body): Json<RenameRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if body.old_path.is_empty() || body.new_path.is_empty() {
        return Err(AppError::BadRequest("Old and new path required".to_string()));
    }
    let root = root_for(&state, query.workspace_id.as_deref(), body.workspace_id.as_deref())?;
    ops::rename(&root, &body.old_path, &body.new_path).await?;
    info!(from = %body.old_path, to = %body.new_path, "entry renamed");
    Ok(success())
}

/// DELETE /api/files/delete, path in a JSON body or `?path=...`
pub async fn remove(
    _auth: Authenticated,
    State(state): State<AppState>,
    Query(query): Query<WorkspaceQuery>,
    body: Option<Json<DeleteRequest>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let path = match required(&body.path, "Path required") {
        Ok(path) => path,
        Err(_) => required(&query.path, "Path required")?,
    };
    let root = root_for(&state, query.workspace_id.as_deref(), body.workspace_id.as_deref())?;
    ops::remove(&root, path).await?;
    info!(path, "entry removed");
    Ok(success())
}

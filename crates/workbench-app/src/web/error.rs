use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::fmt::Display;
use tracing::error;
use workbench_sandbox::{FileOpError, PathSecurityError};
use workbench_terminal::TerminalError;

use crate::auth::AuthError;

/// Error type for HTTP handlers
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(&'static str),
    NotFound(String),
    Internal(String),
}

impl AppError {
    /// Log the host-side detail and answer with a generic message
    fn internal(context: &str, err: impl Display) -> Self {
        error!(error = %err, "{}", context);
        AppError::Internal("Internal Server Error".to_string())
    }
}

impl From<PathSecurityError> for AppError {
    fn from(err: PathSecurityError) -> Self {
        if err.is_rejection() {
            AppError::BadRequest(err.to_string())
        } else {
            AppError::internal("path resolution failed", err)
        }
    }
}

impl From<FileOpError> for AppError {
    fn from(err: FileOpError) -> Self {
        if err.is_not_found() {
            return AppError::NotFound("File not found".to_string());
        }
        match err {
            FileOpError::Security(e) => e.into(),
            e @ (FileOpError::RootProtected
            | FileOpError::NotADirectory(_)
            | FileOpError::IsADirectory(_)
            | FileOpError::InvalidFileName(_)) => AppError::BadRequest(e.to_string()),
            FileOpError::Io(e) => AppError::internal("file operation failed", e),
        }
    }
}

impl From<TerminalError> for AppError {
    fn from(err: TerminalError) -> Self {
        match err {
            e @ TerminalError::SessionNotFound(_) => AppError::NotFound(e.to_string()),
            other => AppError::internal("terminal operation failed", other),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::internal("auth store lookup failed", err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

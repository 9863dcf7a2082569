// src/error.rs
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;

use crate::youtube_client::YouTubeError;

/// Workflow-level failure taxonomy. Handlers catch these and turn them into a
/// flash message plus a redirect; the `IntoResponse` impl is the fallback for
/// errors that escape (infrastructure failures, unknown ids).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("security error: {0}")]
    Security(String),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("upload error: {0}")]
    Upload(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Maps a client error to the taxonomy: token-refresh class failures
    /// become `Credential` (forcing re-authorization upstream), everything
    /// else from an upload attempt is an `Upload` failure.
    pub fn from_upload_failure(err: YouTubeError) -> Self {
        if err.is_credential_failure() {
            AppError::Credential(err.to_string())
        } else {
            AppError::Upload(err.to_string())
        }
    }

    pub fn is_credential_failure(&self) -> bool {
        matches!(self, AppError::Credential(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                Html("<h1>404</h1><p>Video no encontrado.</p>".to_string()),
            )
                .into_response(),
            AppError::Security(reason) => {
                tracing::warn!("request rejected: {}", reason);
                StatusCode::FORBIDDEN.into_response()
            }
            other => {
                tracing::error!("unhandled application error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html("<h1>500</h1><p>Error interno del servidor.</p>".to_string()),
                )
                    .into_response()
            }
        }
    }
}

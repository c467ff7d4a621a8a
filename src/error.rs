//! Error taxonomy and the JSON error envelope.
//!
//! Handlers return [`AppResult`]; any error that escapes a handler is
//! rendered by the [`IntoResponse`] impl as the registry's envelope
//! `{"error": <reason phrase>, "reason": <free text>}`. Library errors are
//! classified at the boundary where they originate (see
//! [`StoreError`](crate::store::StoreError)), so this module never inspects
//! libgit2 error classes.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::store::StoreError;

/// JSON body returned by every failing endpoint.
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    /// Reason phrase of the HTTP status code.
    pub error: String,
    /// Free-text explanation.
    pub reason: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            reason: reason.into(),
        }
    }
}

/// Application-level error classification.
///
/// Validation failures map to 400, missing packages and objects to 404,
/// everything else to 500 with a generic reason so internal details never
/// leak into responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid name")]
    InvalidName,

    #[error("version is not a valid git object id")]
    InvalidObjectId,

    #[error("package not found")]
    PackageNotFound,

    #[error("no upstream configured")]
    UpstreamNotConfigured,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to build response: {0}")]
    Http(#[from] axum::http::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidName | AppError::InvalidObjectId => StatusCode::BAD_REQUEST,
            AppError::PackageNotFound | AppError::UpstreamNotConfigured => StatusCode::NOT_FOUND,
            AppError::Store(StoreError::RepoNotFound | StoreError::ObjectNotFound) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Free-text `reason` for the envelope. Internal errors all collapse
    /// into the same generic phrase.
    fn reason(&self) -> String {
        let status = self.status();
        if status == StatusCode::BAD_REQUEST {
            self.to_string()
        } else if status == StatusCode::NOT_FOUND {
            match self {
                AppError::UpstreamNotConfigured => self.to_string(),
                _ => "package not found".to_string(),
            }
        } else {
            "unexpected internal error".to_string()
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "handler failed");
        }
        let envelope = ErrorResponse::new(status, self.reason());
        match json_response(status, &envelope) {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(error = %err, "failed to write error response");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Convenient result type for handlers and fallible helpers.
pub type AppResult<T> = Result<T, AppError>;

/// Serializes `data` and responds with the registry's JSON content type.
pub fn json_response<T: Serialize>(status: StatusCode, data: &T) -> AppResult<Response> {
    let body = serde_json::to_vec(data)?;
    let response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .body(Body::from(body))?;
    Ok(response)
}

use std::fmt;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use kbase::{ErrorKind, KbaseError};
use serde_json::json;

/// Failures while starting the server.
#[derive(Debug)]
pub enum ServerError {
    Io(std::io::Error),
    TomlDeserialize(toml::de::Error),
    Config(String),
    Vault(KbaseError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(error) => write!(formatter, "IO error: {error}"),
            Self::TomlDeserialize(error) => write!(formatter, "TOML parse error: {error}"),
            Self::Config(detail) => write!(formatter, "Invalid configuration: {detail}"),
            Self::Vault(error) => write!(formatter, "Vault error: {error}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(error) => Some(error),
            Self::TomlDeserialize(error) => Some(error),
            Self::Vault(error) => Some(error),
            Self::Config(_) => None,
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<toml::de::Error> for ServerError {
    fn from(error: toml::de::Error) -> Self {
        Self::TomlDeserialize(error)
    }
}

impl From<KbaseError> for ServerError {
    fn from(error: KbaseError) -> Self {
        Self::Vault(error)
    }
}

/// An HTTP error response with a `{"detail": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
    bearer_challenge: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            bearer_challenge: false,
        }
    }

    /// 401 carrying `WWW-Authenticate: Bearer`.
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self {
            bearer_challenge: true,
            ..Self::new(StatusCode::UNAUTHORIZED, detail)
        }
    }

    pub fn unprocessable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, detail)
    }

    /// Maps a vault error, naming `subject` ("Note", "Directory") in not-found details.
    pub fn vault(error: KbaseError, subject: &str) -> Self {
        let status = status_for(error.kind());
        match error {
            KbaseError::NotFound(path) => Self::new(status, format!("{subject} not found: {path}")),
            KbaseError::Unauthorized => Self::unauthorized("Invalid authentication credentials"),
            error if status == StatusCode::INTERNAL_SERVER_ERROR => {
                log::error!("{subject} operation failed: {error}");
                Self::new(status, error.to_string())
            }
            error => Self::new(status, error.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Network => StatusCode::BAD_GATEWAY,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "detail": self.detail }));
        if self.bearer_challenge {
            (self.status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (self.status, body).into_response()
        }
    }
}

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use log::warn;
use thiserror::Error;

/// Error category reported to API clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Validation,
    NotFound,
    Upstream,
    Network,
    Unauthorized,
    Conflict,
    Internal,
}

/// Body returned by every failing endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("upstream responded with {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("upstream unreachable: {0}")]
    Network(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl ProxyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::Configuration(_) => ErrorKind::Configuration,
            ProxyError::Validation(_) => ErrorKind::Validation,
            ProxyError::NotFound(_) => ErrorKind::NotFound,
            ProxyError::Upstream { .. } => ErrorKind::Upstream,
            ProxyError::Network(_) => ErrorKind::Network,
            ProxyError::Unauthorized(_) => ErrorKind::Unauthorized,
            ProxyError::Conflict(_) => ErrorKind::Conflict,
            ProxyError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Configuration(_) | ProxyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::Validation(_) => StatusCode::BAD_REQUEST,
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
            // Forward the provider's status when it is a usable error code
            ProxyError::Upstream { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            // No upstream status to forward
            ProxyError::Network(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ProxyError::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let (upstream_status, message) = match self {
            ProxyError::Upstream { status, message } => (Some(*status), message.clone()),
            other => (None, other.to_string()),
        };
        ErrorEnvelope {
            kind: self.kind(),
            upstream_status,
            message,
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        // Request URLs carry the REST key as a path segment
        let e = e.without_url();
        warn!("Upstream request failed: {}", e);
        match e.status() {
            Some(status) => ProxyError::Upstream {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None if e.is_decode() => {
                ProxyError::Internal(format!("Invalid upstream payload: {}", e))
            }
            None => ProxyError::Network(e.to_string()),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.envelope())).into_response()
    }
}

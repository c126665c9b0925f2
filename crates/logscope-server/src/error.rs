//! Error types for the logscope server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use logscope_core::SearchError;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(std::net::SocketAddr, std::io::Error),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The search failed.
    #[error("search failed: {0}")]
    Search(#[from] SearchError),

    /// Too many live-tail connections.
    #[error("too many connections: {0} active, limit is {1}")]
    TooManyConnections(usize, usize),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Self::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Self::Search(SearchError::InvalidQuery(_)) => (StatusCode::BAD_REQUEST, "invalid_query"),
            Self::Search(_) => (StatusCode::INTERNAL_SERVER_ERROR, "search_failed"),
            Self::TooManyConnections(_, _) => {
                (StatusCode::SERVICE_UNAVAILABLE, "too_many_connections")
            }
            Self::BindFailed(_, _) | Self::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
        };

        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"error":"internal_error","message":"failed to serialize error"}"#.to_string()
        });

        (status, [("content-type", "application/json")], json).into_response()
    }
}

/// Errors ending a live-tail session.
#[derive(Debug, Error)]
pub enum LiveTailError {
    /// The WebSocket failed.
    #[error("websocket error: {0}")]
    Socket(#[from] axum::Error),

    /// A message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The client closed the connection.
    #[error("connection closed by client")]
    Closed,
}

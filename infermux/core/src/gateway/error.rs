use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use super::dto::ErrorResponse;
use crate::routing::{ErrorKind, RouterError};

/// HTTP server lifecycle errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound
    #[error("failed to bind HTTP listener on {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },
    /// The server stopped with an IO error
    #[error("HTTP server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Error reply from a handler: a status code plus `{error, kind}` JSON
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, kind: &str, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.into(),
                kind: kind.to_string(),
            },
        }
    }

    /// Malformed request body or envelope
    pub fn invalid_request(error: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ErrorKind::InvalidRequest.as_str(),
            error,
        )
    }

    /// Failure outside the routing taxonomy
    pub fn internal(error: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", error)
    }

    /// Status code of this reply
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// Status code for each router error class
#[must_use]
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::ModelNotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::ProviderError => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Canceled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<RouterError> for ApiError {
    fn from(err: RouterError) -> Self {
        let kind = err.kind();
        Self::new(status_for(kind), kind.as_str(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_every_kind_has_a_distinct_status() {
        let kinds = [
            ErrorKind::InvalidRequest,
            ErrorKind::ModelNotFound,
            ErrorKind::Conflict,
            ErrorKind::ProviderError,
            ErrorKind::Timeout,
            ErrorKind::Canceled,
        ];
        let mut statuses: Vec<u16> = kinds.iter().map(|k| status_for(*k).as_u16()).collect();
        statuses.sort_unstable();
        statuses.dedup();
        assert_eq!(statuses.len(), kinds.len());
    }

    #[test]
    fn test_router_error_conversion() {
        let err = ApiError::from(RouterError::Timeout {
            provider: "echo".into(),
            elapsed: Duration::from_millis(20),
        });
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.body.kind, "timeout");
        assert!(err.body.error.contains("echo"));
    }
}

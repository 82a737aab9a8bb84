use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised by the admission-control core and its store adapters.
#[derive(Debug, Error)]
pub enum GatekeeperError {
    /// Rate limit configuration rejected at construction time
    #[error("Invalid configuration: {0}")]
    ConfigValidation(String),

    /// A fingerprint could not be formed for the request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An atomic batch came back malformed or empty
    #[error("Unexpected result from store: {0}")]
    StoreProtocol(String),

    /// The shared store stayed unreachable after the client's own retries
    #[error("Store connection error: {0}")]
    StoreConnectivity(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatekeeperError>;

impl From<redis::RedisError> for GatekeeperError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
            || err.is_io_error()
        {
            GatekeeperError::StoreConnectivity(err.to_string())
        } else {
            GatekeeperError::StoreProtocol(err.to_string())
        }
    }
}

impl From<validator::ValidationErrors> for GatekeeperError {
    fn from(errors: validator::ValidationErrors) -> Self {
        GatekeeperError::ConfigValidation(errors.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_error(err: &GatekeeperError) -> Self {
        match err {
            GatekeeperError::InvalidRequest(msg) => Self::new("bad_request", msg, 400),
            GatekeeperError::StoreConnectivity(msg) => Self::new("service_unavailable", msg, 503),
            GatekeeperError::ConfigValidation(msg) => Self::new("configuration_error", msg, 500),
            other => Self::new("internal_error", &other.to_string(), 500),
        }
    }

    /// Generic server error, used when the cause must not leak to clients.
    pub fn internal() -> Self {
        Self::new("internal_error", "Internal Server Error", 500)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl IntoResponse for GatekeeperError {
    fn into_response(self) -> Response {
        ErrorResponse::from_error(&self).into_response()
    }
}

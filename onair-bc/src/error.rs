//! Error types for onair-bc
//!
//! Only probing failures are absorbed locally (the orchestrator falls back to
//! the configured bit rate); every other variant is reported to the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for onair-bc
#[derive(Error, Debug)]
pub enum Error {
    /// External audio tool missing or could not be spawned
    #[error("Audio tool unavailable: {0}")]
    ToolUnavailable(String),

    /// Bit rate inspection failed (tool wrote to stderr or output was unparsable)
    #[error("Bit rate probe failed: {0}")]
    Probe(String),

    /// Effect name matched no file in the effects directory
    #[error("Effect not found: {0}")]
    EffectNotFound(String),

    /// Effect requested while nothing is broadcasting
    #[error("Not playing")]
    NotPlaying,

    /// Effect requested while another splice is still pending
    #[error("Splice already in progress")]
    SpliceInProgress,

    /// Mixing subprocess or one of its pipes failed
    #[error("Mix failure: {0}")]
    MixFailure(String),

    /// Pacer or orchestrator invariant broken
    #[error("Playback error: {0}")]
    Playback(String),

    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using onair-bc Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status reported for this error by the control API
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::EffectNotFound(_) => StatusCode::NOT_FOUND,
            Error::NotPlaying | Error::SpliceInProgress => StatusCode::CONFLICT,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::ToolUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "result": "error",
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

//! Failure taxonomy for the request pipeline.
//!
//! Every backend interaction resolves to exactly one [`ApiError`] variant.
//! Classification is priority-ordered and happens in one place
//! ([`crate::http`]); no other component re-interprets status codes.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Backend error code: a newer login on another device revoked this token.
pub(crate) const CODE_TOKEN_MISMATCH: &str = "TOKEN_MISMATCH";

/// Backend error code: login refused because a session is already active.
pub(crate) const CODE_ALREADY_LOGGED_IN: &str = "ALREADY_LOGGED_IN";

/// Errors produced by the request pipeline.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport failure - no response reached the server.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The stored token was revoked by a newer login elsewhere.
    ///
    /// By the time this variant reaches the caller, the pipeline has already
    /// cleared the credential store, demoted the session to anonymous, and
    /// directed the consumer to the login surface.
    #[error("session superseded by a newer login")]
    SessionSuperseded,

    /// Stale or invalid credential. No forced action; the caller decides,
    /// typically by re-prompting login.
    #[error("not authenticated")]
    Unauthenticated,

    /// Login attempt blocked by an existing active session. No local state
    /// was created, so nothing is cleared; the login surface renders a
    /// specific message from this.
    #[error("already logged in on another device")]
    ConcurrentSessionConflict,

    /// Any other non-success response.
    #[error("request failed with {status}: {message}")]
    RequestFailed {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Backend-provided message, or the canonical status reason.
        message: String,
    },

    /// A success response whose body could not be decoded.
    #[error("response parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Error body shape used by the backend: `{ code, message }`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Best-effort parse. Non-JSON error pages yield an empty body so that
    /// classification can still fall back to the status code.
    pub(crate) fn from_text(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_default()
    }
}

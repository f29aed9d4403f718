//! Backend error types.

use thiserror::Error;

/// Errors that can occur when talking to the identity provider or document
/// store.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing the local session file failed.
    #[error("session file error: {0}")]
    SessionFile(#[from] std::io::Error),

    /// An account with this email already exists.
    #[error("email already registered")]
    EmailExists,

    /// Wrong email or password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Password rejected by the identity provider.
    #[error("weak password: {0}")]
    WeakPassword(String),

    /// No signed-in session, or the session token was rejected.
    #[error("not authenticated")]
    Unauthenticated,

    /// Document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limited by the backend.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The backend answered with an error not covered above.
    #[error("backend rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// A response could not be decoded into the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Backend unreachable or unavailable.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Whether this is an authentication failure a user can fix by retyping.
    #[must_use]
    pub const fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Self::EmailExists | Self::InvalidCredentials | Self::WeakPassword(_)
        )
    }
}

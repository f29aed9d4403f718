//! Firebase REST backend.
//!
//! - [`FirebaseAuth`] talks to Identity Toolkit and Secure Token
//! - [`Firestore`] talks to the Firestore v1 REST API
//!
//! Both share the response handling below: rate limits surface as
//! [`BackendError::RateLimited`] and the `{"error": {"message": ...}}`
//! envelope is mapped onto the backend error variants.

mod auth;
mod firestore;
mod session_file;
pub mod value;

use serde::Deserialize;

use crate::backend::BackendError;

pub use auth::FirebaseAuth;
pub use firestore::Firestore;

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Pass successful responses through, turn everything else into an error.
pub(crate) async fn check_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(BackendError::RateLimited(retry_after));
    }

    let body = response.text().await?;
    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        Ok(envelope) => envelope.error.status.unwrap_or_default(),
        Err(_) => body.chars().take(200).collect(),
    };

    tracing::debug!(status = %status, message = %message, "Firebase returned non-success status");
    Err(classify(status.as_u16(), &message))
}

/// Map an HTTP status and Firebase error message onto a [`BackendError`].
fn classify(status: u16, message: &str) -> BackendError {
    // Identity Toolkit messages look like "CODE" or "CODE : detail".
    let (code, detail) = message
        .split_once(" : ")
        .map_or((message.trim(), ""), |(c, d)| (c.trim(), d.trim()));

    match code {
        "EMAIL_EXISTS" => BackendError::EmailExists,
        "INVALID_PASSWORD"
        | "EMAIL_NOT_FOUND"
        | "INVALID_LOGIN_CREDENTIALS"
        | "INVALID_EMAIL"
        | "USER_DISABLED" => BackendError::InvalidCredentials,
        "WEAK_PASSWORD" => BackendError::WeakPassword(if detail.is_empty() {
            "Password should be at least 6 characters".to_string()
        } else {
            detail.to_string()
        }),
        "TOKEN_EXPIRED" | "INVALID_ID_TOKEN" | "INVALID_REFRESH_TOKEN" | "USER_NOT_FOUND"
        | "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => BackendError::Unauthenticated,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => BackendError::RateLimited(60),
        _ => match status {
            401 | 403 => BackendError::Unauthenticated,
            404 => BackendError::NotFound(message.to_string()),
            503 => BackendError::Unavailable(message.to_string()),
            _ => BackendError::Rejected {
                status,
                message: message.to_string(),
            },
        },
    }
}

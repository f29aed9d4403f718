//! Store error types with Sentry integration.
//!
//! Store operations return [`StoreError`]. Failures that happen while syncing
//! with the backend are also published as [`SyncError`] events so a view can
//! show them even when the failing call was not its own (for example the
//! session listener's hydration).

use thiserror::Error;

use vintage_core::EmailError;

use crate::backend::BackendError;

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Identity provider rejected or failed a sign-up, sign-in, or sign-out.
    #[error("Authentication error: {0}")]
    Auth(BackendError),

    /// Document read or write failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Email failed validation before reaching the identity provider.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Cart quantity above the allowed maximum.
    #[error("Quantity {quantity} exceeds the maximum of {max}")]
    InvalidQuantity { quantity: u32, max: u32 },

    /// Profile image over the inline size limit.
    #[error("Image is {size} bytes, the limit is {max} bytes")]
    ImageTooLarge { size: usize, max: usize },

    /// Profile image with a non-image MIME type.
    #[error("Unsupported image type: {0}")]
    UnsupportedImageType(String),

    /// Register called while a user is signed in.
    #[error("Already signed in")]
    AlreadySignedIn,

    /// Profile data could not be encoded or decoded.
    #[error("Profile data error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StoreError {
    /// Form-level message suitable for showing to the user.
    ///
    /// Backend details stay out of the message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(err) => match err {
                BackendError::EmailExists => {
                    "An account with this email already exists".to_string()
                }
                BackendError::InvalidCredentials => "Invalid email or password".to_string(),
                BackendError::WeakPassword(msg) => msg.clone(),
                BackendError::RateLimited(_) => {
                    "Too many attempts, please try again later".to_string()
                }
                _ => "Authentication failed, please try again".to_string(),
            },
            Self::Backend(BackendError::Unauthenticated) => {
                "Your session has expired, please sign in again".to_string()
            }
            Self::Backend(_) | Self::Decode(_) => {
                "Could not reach the store, please try again".to_string()
            }
            Self::InvalidEmail(_) => "Invalid email address".to_string(),
            Self::InvalidQuantity { max, .. } => format!("You can order at most {max} of an item"),
            Self::ImageTooLarge { max, .. } => {
                format!("Image is too large (max {} KB)", max / 1024)
            }
            Self::UnsupportedImageType(_) => "Please choose an image file".to_string(),
            Self::AlreadySignedIn => "You are already signed in".to_string(),
        }
    }

    /// Whether this failure is worth a Sentry event.
    ///
    /// User mistakes (bad input, wrong password) are not.
    #[must_use]
    pub const fn is_reportable(&self) -> bool {
        match self {
            Self::Backend(err) => !matches!(err, BackendError::Unauthenticated),
            Self::Auth(err) => !err.is_credential_error(),
            Self::Decode(_) => true,
            Self::InvalidEmail(_)
            | Self::InvalidQuantity { .. }
            | Self::ImageTooLarge { .. }
            | Self::UnsupportedImageType(_)
            | Self::AlreadySignedIn => false,
        }
    }
}

/// Result type alias for `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// When a [`SyncError`] happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorKind {
    /// Loading the profile after sign-in or session restore.
    Hydration,
    /// Persisting a change.
    Write,
}

/// A failed sync with the backend, broadcast to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncError {
    /// Store operation that failed (e.g. `add_to_cart`).
    pub operation: &'static str,
    pub kind: SyncErrorKind,
    pub message: String,
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.operation, self.message)
    }
}

/// Send an error to Sentry if it is worth reporting.
///
/// Returns the event id when one was captured.
pub fn capture(operation: &'static str, error: &StoreError) -> Option<sentry::types::Uuid> {
    if !error.is_reportable() {
        return None;
    }
    let event_id = sentry::with_scope(
        |scope| scope.set_tag("operation", operation),
        || sentry::capture_error(error),
    );
    Some(event_id)
}

/// Set the Sentry user context.
///
/// Call this after sign-in or session restore to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for a store action.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

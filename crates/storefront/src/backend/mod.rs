//! Backend collaborators: identity provider and document store.
//!
//! # Architecture
//!
//! - The store never talks HTTP directly; it only sees the
//!   [`IdentityService`] and [`DocumentStore`] traits
//! - [`firebase`] implements both over the Firebase REST APIs
//! - [`memory`] implements both in-process for tests and offline runs
//!
//! # Writes
//!
//! Document updates are field-level [`DocumentPatch`]es applied atomically by
//! the backend. A patch only names the fields it touches, so two clients
//! editing different cart lines never overwrite each other, and quantity
//! bumps use a server-side increment rather than a locally computed value.

mod error;
pub mod firebase;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::watch;

use vintage_core::{Email, UserId};

use crate::config::{BackendKind, StorefrontConfig};

pub use error::BackendError;

/// A document's fields as a JSON object.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A document read from a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document id within its collection.
    pub id: String,
    pub fields: Fields,
}

/// An identity as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIdentity {
    pub uid: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Path to a (possibly nested) field, e.g. `cart` → `p1` → `quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Build a path from its segments.
    ///
    /// Segments are taken verbatim, so product ids containing dots or dashes
    /// stay a single segment.
    #[must_use]
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Extend the path by one segment.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// One field-level change inside a [`DocumentPatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Replace the value at `path`, creating intermediate maps as needed.
    Set(FieldPath, serde_json::Value),
    /// Remove the field at `path` if present.
    Delete(FieldPath),
    /// Add `by` to the integer at `path` (missing counts as zero).
    Increment(FieldPath, i64),
}

impl FieldOp {
    #[must_use]
    pub const fn path(&self) -> &FieldPath {
        match self {
            Self::Set(path, _) | Self::Delete(path) | Self::Increment(path, _) => path,
        }
    }
}

/// An ordered set of field changes applied to one document atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    ops: Vec<FieldOp>,
}

impl DocumentPatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, path: FieldPath, value: serde_json::Value) -> Self {
        self.ops.push(FieldOp::Set(path, value));
        self
    }

    #[must_use]
    pub fn delete(mut self, path: FieldPath) -> Self {
        self.ops.push(FieldOp::Delete(path));
        self
    }

    #[must_use]
    pub fn increment(mut self, path: FieldPath, by: i64) -> Self {
        self.ops.push(FieldOp::Increment(path, by));
        self
    }

    #[must_use]
    pub fn ops(&self) -> &[FieldOp] {
        &self.ops
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Identity provider.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Create an account and sign it in.
    async fn create_account(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthIdentity, BackendError>;

    /// Set the display name of the signed-in account.
    async fn set_display_name(
        &self,
        identity: &AuthIdentity,
        name: &str,
    ) -> Result<AuthIdentity, BackendError>;

    /// Sign in with email and password.
    async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthIdentity, BackendError>;

    /// End the current session.
    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Session changes.
    ///
    /// The receiver's current value is the session at subscription time;
    /// every sign-in and sign-out afterwards is a change notification.
    fn session_changes(&self) -> watch::Receiver<Option<AuthIdentity>>;
}

/// Document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document in a collection, in backend listing order.
    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, BackendError>;

    /// One document, or `None` if it does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, BackendError>;

    /// Create or fully overwrite a document.
    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<(), BackendError>;

    /// Apply a patch to an existing document.
    ///
    /// Fails with [`BackendError::NotFound`] if the document does not exist.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: DocumentPatch,
    ) -> Result<(), BackendError>;
}

/// Both collaborators, ready to hand to the store.
#[derive(Clone)]
pub struct Backend {
    pub identity: Arc<dyn IdentityService>,
    pub documents: Arc<dyn DocumentStore>,
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}

/// Build the backend selected by configuration.
///
/// # Errors
///
/// Returns a [`BackendError`] if the HTTP client cannot be built or a stored
/// session file cannot be read.
pub async fn connect(config: &StorefrontConfig) -> Result<Backend, BackendError> {
    match &config.backend {
        BackendKind::Memory => {
            tracing::info!("Using in-memory backend");
            let backend = Arc::new(memory::InMemoryBackend::new());
            Ok(Backend {
                identity: backend.clone(),
                documents: backend,
            })
        }
        BackendKind::Firebase(firebase) => {
            tracing::info!(project = %firebase.project_id, "Using Firebase backend");
            let auth = Arc::new(
                firebase::FirebaseAuth::connect(
                    firebase,
                    config.http_timeout,
                    config.session_file.clone(),
                )
                .await?,
            );
            let documents = Arc::new(firebase::Firestore::new(
                firebase,
                config.http_timeout,
                Some(auth.clone()),
            )?);
            Ok(Backend {
                identity: auth,
                documents,
            })
        }
    }
}

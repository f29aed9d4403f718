//! CLI command implementations.

pub mod account;
pub mod shop;

use vintage_storefront::backend::{self, BackendError};
use vintage_storefront::{AppStore, SessionListener, SessionState, StoreError, StorefrontConfig};

/// Errors surfaced to the command line.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("{}", .0.user_message())]
    Store(#[from] StoreError),

    #[error("Not signed in; run `vm-cli login` first")]
    NotSignedIn,

    #[error("No product with id {0}")]
    UnknownProduct(String),

    #[error("Cannot read {path}: {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },
}

/// A connected store with its session listener running.
pub struct Session {
    pub store: AppStore,
    listener: SessionListener,
}

impl Session {
    /// Connect to the configured backend and wait for the stored session
    /// (if any) to be restored and hydrated.
    pub async fn start(config: &StorefrontConfig) -> Result<Self, CliError> {
        let backend = backend::connect(config).await?;
        let store = AppStore::new(backend);
        let listener = SessionListener::spawn(store.clone());

        let state = listener.wait_until_ready().await;
        tracing::debug!(?state, "Session restored");

        Ok(Self { store, listener })
    }

    /// Fail unless a user is signed in.
    pub fn require_user(&self) -> Result<(), CliError> {
        match self.listener.state() {
            SessionState::ReadyAuthenticated { .. } => Ok(()),
            _ if self.store.snapshot().is_logged_in() => Ok(()),
            _ => Err(CliError::NotSignedIn),
        }
    }

    /// Wait until the listener has caught up with a sign-in or sign-out.
    pub async fn settle(&self, signed_in: bool) {
        let mut rx = self.listener.subscribe();
        let _ = rx
            .wait_for(|state| match state {
                SessionState::ReadyAuthenticated { .. } => signed_in,
                SessionState::ReadyAnonymous => !signed_in,
                _ => false,
            })
            .await;
    }
}

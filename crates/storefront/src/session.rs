//! Session listener.
//!
//! Follows the identity provider's session and keeps the store in step:
//! a signed-in identity is mirrored as the user and hydrated, a signed-out
//! session clears everything user-specific. The listener's progress is
//! published as a [`SessionState`] so callers can wait for the first
//! session to settle before rendering.
//!
//! ```text
//! Anonymous ──identity──▶ Authenticating ──hydrated──▶ ReadyAuthenticated
//!     │                          ▲                            │
//!     └──no identity──▶ ReadyAnonymous ◀────signed out────────┘
//! ```

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use vintage_core::UserId;

use crate::backend::AuthIdentity;
use crate::store::AppStore;

/// Where the listener is in the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Nothing processed yet.
    #[default]
    Anonymous,
    /// Signed in, profile still loading.
    Authenticating { uid: UserId },
    /// Signed in and hydrated (or hydration failed and was reported).
    ReadyAuthenticated { uid: UserId },
    /// Signed out and cleared.
    ReadyAnonymous,
}

impl SessionState {
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::ReadyAuthenticated { .. } | Self::ReadyAnonymous)
    }

    #[must_use]
    pub const fn uid(&self) -> Option<&UserId> {
        match self {
            Self::Authenticating { uid } | Self::ReadyAuthenticated { uid } => Some(uid),
            Self::Anonymous | Self::ReadyAnonymous => None,
        }
    }
}

/// Handle to a running session listener.
///
/// Dropping the handle stops the listener.
#[derive(Debug)]
pub struct SessionListener {
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl SessionListener {
    /// Start following the store's identity service.
    ///
    /// The current session is handled right away, then every change after
    /// it. Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(store: AppStore) -> Self {
        let (tx, state) = watch::channel(SessionState::Anonymous);
        let changes = store.identity_service().session_changes();
        let task = tokio::spawn(listen(store, changes, tx));
        Self { state, task }
    }

    /// The listener's current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait until the first session has been fully processed.
    ///
    /// Returns the current state if the listener stopped before that.
    pub async fn wait_until_ready(&self) -> SessionState {
        let mut rx = self.state.clone();
        let ready = rx
            .wait_for(SessionState::is_ready)
            .await
            .map(|state| state.clone());
        ready.unwrap_or_else(|_| rx.borrow().clone())
    }
}

impl Drop for SessionListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn listen(
    store: AppStore,
    mut changes: watch::Receiver<Option<AuthIdentity>>,
    tx: watch::Sender<SessionState>,
) {
    loop {
        let identity = changes.borrow_and_update().clone();
        handle_session(&store, identity, &tx).await;

        if changes.changed().await.is_err() {
            debug!("Identity service closed, session listener stopping");
            break;
        }
    }
}

async fn handle_session(
    store: &AppStore,
    identity: Option<AuthIdentity>,
    tx: &watch::Sender<SessionState>,
) {
    let _guard = store.lock_writes().await;

    let next = match identity {
        Some(identity) => {
            let uid = identity.uid.clone();
            store.set_user(&identity);
            tx.send_replace(SessionState::Authenticating { uid: uid.clone() });
            info!(uid = %uid, "Session active, loading user data");

            if let Err(e) = store.hydrate(&uid).await {
                store.report_hydration_failure(&uid, &e);
            }
            SessionState::ReadyAuthenticated { uid }
        }
        None => {
            store.clear_session();
            info!("No active session");
            SessionState::ReadyAnonymous
        }
    };

    store.mark_auth_ready();
    tx.send_replace(next);
}

//! Firebase Authentication over the Identity Toolkit REST API.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::{Mutex, watch};
use tracing::instrument;
use url::Url;

use vintage_core::{Email, UserId};

use super::check_response;
use super::session_file::{self, StoredSession};
use crate::backend::{AuthIdentity, BackendError, IdentityService};
use crate::config::FirebaseConfig;

/// Refresh the id token when it expires within this many seconds.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Identity Toolkit token lifetime when the response omits it.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default, alias = "profilePicture")]
    photo_url: Option<String>,
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResponse {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
}

/// Secure Token responses use snake case.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

/// Firebase Authentication client.
///
/// Keeps the signed-in session in memory and, when a session file is
/// configured, on disk so a later process starts signed in.
pub struct FirebaseAuth {
    client: reqwest::Client,
    api_key: SecretString,
    sign_up_url: Url,
    sign_in_url: Url,
    update_url: Url,
    refresh_url: Url,
    session_file: Option<PathBuf>,
    session: Mutex<Option<StoredSession>>,
    changes: watch::Sender<Option<AuthIdentity>>,
}

impl std::fmt::Debug for FirebaseAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseAuth")
            .field("api_key", &"[REDACTED]")
            .field("sign_in_url", &self.sign_in_url.as_str())
            .field("session_file", &self.session_file)
            .finish_non_exhaustive()
    }
}

impl FirebaseAuth {
    /// Create a client with no session and no session file.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or an endpoint
    /// URL cannot be derived from the configured base URLs.
    pub fn new(config: &FirebaseConfig, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let (changes, _) = watch::channel(None);

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            sign_up_url: endpoint(&config.auth_url, "accounts:signUp")?,
            sign_in_url: endpoint(&config.auth_url, "accounts:signInWithPassword")?,
            update_url: endpoint(&config.auth_url, "accounts:update")?,
            refresh_url: endpoint(&config.token_url, "token")?,
            session_file: None,
            session: Mutex::new(None),
            changes,
        })
    }

    /// Create a client that persists its session to `session_file`,
    /// restoring any session already stored there.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built or the session file
    /// exists but cannot be read.
    pub async fn connect(
        config: &FirebaseConfig,
        timeout: Duration,
        session_file: PathBuf,
    ) -> Result<Self, BackendError> {
        let mut auth = Self::new(config, timeout)?;

        if let Some(stored) = session_file::load(&session_file).await? {
            tracing::debug!(uid = %stored.uid, "Restored session from file");
            auth.changes.send_replace(Some(identity_of(&stored)));
            *auth.session.get_mut() = Some(stored);
        }
        auth.session_file = Some(session_file);

        Ok(auth)
    }

    /// Current id token, refreshed if it is about to expire.
    ///
    /// Returns `None` when signed out. A rejected refresh token ends the
    /// session.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh request fails.
    pub async fn id_token(&self) -> Result<Option<String>, BackendError> {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_ref() else {
            return Ok(None);
        };
        if !session.expires_within(Utc::now(), REFRESH_MARGIN_SECS) {
            return Ok(Some(session.id_token.clone()));
        }

        let mut updated = session.clone();
        match self.refresh(&updated.refresh_token).await {
            Ok(refreshed) => {
                updated.id_token = refreshed.id_token;
                updated.refresh_token = refreshed.refresh_token;
                updated.expires_at = expires_at(refreshed.expires_in.as_deref());
                self.persist(&updated).await;
                let token = updated.id_token.clone();
                *guard = Some(updated);
                tracing::debug!("Refreshed id token");
                Ok(Some(token))
            }
            Err(BackendError::Unauthenticated) => {
                tracing::warn!("Refresh token rejected, signing out");
                *guard = None;
                self.forget().await;
                self.changes.send_replace(None);
                Err(BackendError::Unauthenticated)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, BackendError> {
        let response = self
            .client
            .post(self.refresh_url.clone())
            .query(&[("key", self.api_key.expose_secret())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        Ok(check_response(response).await?.json().await?)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        url: &Url,
        body: &serde_json::Value,
    ) -> Result<T, BackendError> {
        let response = self
            .client
            .post(url.clone())
            .query(&[("key", self.api_key.expose_secret())])
            .json(body)
            .send()
            .await?;
        Ok(check_response(response).await?.json().await?)
    }

    /// Store a fresh sign-in and announce it.
    async fn start_session(&self, response: SignInResponse, email: &Email) -> AuthIdentity {
        let stored = StoredSession {
            uid: response.local_id,
            email: response.email.unwrap_or_else(|| email.as_str().to_string()),
            display_name: response.display_name.filter(|n| !n.is_empty()),
            photo_url: response.photo_url.filter(|p| !p.is_empty()),
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            expires_at: expires_at(response.expires_in.as_deref()),
        };
        let identity = identity_of(&stored);

        self.persist(&stored).await;
        *self.session.lock().await = Some(stored);
        self.changes.send_replace(Some(identity.clone()));
        identity
    }

    async fn persist(&self, stored: &StoredSession) {
        if let Some(path) = &self.session_file
            && let Err(e) = session_file::save(path, stored).await
        {
            tracing::warn!(path = %path.display(), error = %e, "Failed to save session file");
        }
    }

    async fn forget(&self) {
        if let Some(path) = &self.session_file
            && let Err(e) = session_file::remove(path).await
        {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove session file");
        }
    }
}

#[async_trait]
impl IdentityService for FirebaseAuth {
    #[instrument(skip(self, password), fields(email = %email))]
    async fn create_account(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthIdentity, BackendError> {
        let response: SignInResponse = self
            .post(
                &self.sign_up_url,
                &json!({
                    "email": email.as_str(),
                    "password": password.expose_secret(),
                    "returnSecureToken": true,
                }),
            )
            .await?;
        tracing::info!(uid = %response.local_id, "Account created");
        Ok(self.start_session(response, email).await)
    }

    #[instrument(skip(self, identity), fields(uid = %identity.uid))]
    async fn set_display_name(
        &self,
        identity: &AuthIdentity,
        name: &str,
    ) -> Result<AuthIdentity, BackendError> {
        let token = self.id_token().await?.ok_or(BackendError::Unauthenticated)?;
        let response: UpdateResponse = self
            .post(
                &self.update_url,
                &json!({
                    "idToken": token,
                    "displayName": name,
                    "returnSecureToken": true,
                }),
            )
            .await?;

        let mut guard = self.session.lock().await;
        let Some(stored) = guard.as_mut() else {
            return Err(BackendError::Unauthenticated);
        };
        stored.display_name = response.display_name.or_else(|| Some(name.to_string()));
        if response.photo_url.is_some() {
            stored.photo_url = response.photo_url;
        }
        if let (Some(id_token), Some(refresh_token)) = (response.id_token, response.refresh_token)
        {
            stored.id_token = id_token;
            stored.refresh_token = refresh_token;
            stored.expires_at = expires_at(response.expires_in.as_deref());
        }
        let updated = identity_of(stored);
        let snapshot = stored.clone();
        drop(guard);

        self.persist(&snapshot).await;
        // A profile edit is not a session change.
        self.changes.send_if_modified(|current| {
            *current = Some(updated.clone());
            false
        });
        Ok(updated)
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthIdentity, BackendError> {
        let response: SignInResponse = self
            .post(
                &self.sign_in_url,
                &json!({
                    "email": email.as_str(),
                    "password": password.expose_secret(),
                    "returnSecureToken": true,
                }),
            )
            .await?;
        tracing::info!(uid = %response.local_id, "Signed in");
        Ok(self.start_session(response, email).await)
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), BackendError> {
        let previous = self.session.lock().await.take();
        self.forget().await;
        self.changes.send_replace(None);
        if let Some(previous) = previous {
            tracing::info!(uid = %previous.uid, "Signed out");
        }
        Ok(())
    }

    fn session_changes(&self) -> watch::Receiver<Option<AuthIdentity>> {
        self.changes.subscribe()
    }
}

fn endpoint(base: &Url, path: &str) -> Result<Url, BackendError> {
    // "./" keeps "accounts:signUp" from parsing as a URL scheme
    base.join(&format!("./{path}"))
        .map_err(|e| BackendError::Unavailable(format!("invalid endpoint URL for {path}: {e}")))
}

fn expires_at(expires_in: Option<&str>) -> chrono::DateTime<Utc> {
    let secs = expires_in
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    Utc::now() + chrono::Duration::seconds(secs)
}

fn identity_of(stored: &StoredSession) -> AuthIdentity {
    AuthIdentity {
        uid: UserId::new(stored.uid.clone()),
        email: stored.email.clone(),
        display_name: stored.display_name.clone(),
        photo_url: stored.photo_url.clone(),
    }
}

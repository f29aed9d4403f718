//! Signed-in session persisted between CLI runs.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::backend::BackendError;

/// Tokens and identity of the last signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredSession {
    /// Whether the id token expires within `margin_secs`.
    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, margin_secs: i64) -> bool {
        self.expires_at - now <= chrono::Duration::seconds(margin_secs)
    }
}

/// Read a session file. A missing file means no session.
pub async fn load(path: &Path) -> Result<Option<StoredSession>, BackendError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable session file");
                Ok(None)
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write a session file, readable by the owner only.
pub async fn save(path: &Path, session: &StoredSession) -> Result<(), BackendError> {
    let bytes = serde_json::to_vec_pretty(session)?;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;

    // The mode only applies on create; an existing file is tightened here.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600)).await?;
    }

    file.write_all(&bytes).await?;
    file.flush().await?;
    Ok(())
}

/// Delete a session file if it exists.
pub async fn remove(path: &Path) -> Result<(), BackendError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

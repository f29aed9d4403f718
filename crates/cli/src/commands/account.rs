//! Account commands: register, login, logout, whoami, profile image.

use std::path::Path;

use secrecy::SecretString;

use super::{CliError, Session};
use crate::output;

/// Create an account and sign in.
pub async fn register(
    session: &Session,
    email: &str,
    password: &SecretString,
    full_name: &str,
    username: &str,
) -> Result<(), CliError> {
    let user = session
        .store
        .register(email, password, full_name, username)
        .await?;
    session.settle(true).await;

    tracing::info!(uid = %user.uid, "Account created");
    output::user(&user);
    Ok(())
}

pub async fn login(session: &Session, email: &str, password: &SecretString) -> Result<(), CliError> {
    let user = session.store.login(email, password).await?;
    session.settle(true).await;

    output::user(&user);
    Ok(())
}

pub async fn logout(session: &Session) -> Result<(), CliError> {
    session.store.logout().await?;
    session.settle(false).await;

    output::done("Signed out");
    Ok(())
}

pub fn whoami(session: &Session) {
    match session.store.snapshot().current_user() {
        Some(user) => output::user(user),
        None => output::signed_out(),
    }
}

/// Upload a profile picture, inferring its type from the file extension.
pub async fn profile_image(session: &Session, path: &Path) -> Result<(), CliError> {
    session.require_user()?;

    let bytes = tokio::fs::read(path).await.map_err(|source| CliError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    let mime = mime_for(path);

    session.store.update_profile_image(&bytes, &mime).await?;
    output::done("Profile picture updated");
    Ok(())
}

fn mime_for(path: &Path) -> String {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "png" => "image/png".to_string(),
        "gif" => "image/gif".to_string(),
        "webp" => "image/webp".to_string(),
        "svg" => "image/svg+xml".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

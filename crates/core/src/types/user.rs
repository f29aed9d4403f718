//! Signed-in user identity.

use serde::{Deserialize, Serialize};

use super::{ProfileImage, UserId};

/// The authenticated user as mirrored by the client.
///
/// Owned by the identity provider; the client copies it after each sign-in
/// or session restore and only ever replaces `photo` locally (from the
/// profile document's inlined image).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: UserId,
    pub email: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo: ProfileImage,
}

impl User {
    /// Name to greet the user with: display name, else the email local part.
    #[must_use]
    pub fn greeting_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.email.split('@').next().unwrap_or(&self.email))
    }
}

//! Account operations: registration, sign-in, sign-out, seller store, and
//! profile image.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, info, instrument};

use vintage_core::{Email, ProfileImage, StoreProfile, USERS_COLLECTION, User, UserProfile, fields};

use super::{AppStore, MAX_PROFILE_IMAGE_BYTES, to_fields};
use crate::backend::{DocumentPatch, FieldPath};
use crate::error::{Result, StoreError, add_breadcrumb};

impl AppStore {
    /// Create an account, its profile document, and sign it in.
    ///
    /// The profile starts with an empty cart and wishlist, no store, and no
    /// image.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidEmail`] if the email is malformed
    /// - [`StoreError::AlreadySignedIn`] if a user is signed in
    /// - [`StoreError::Auth`] if the identity provider refuses the account
    /// - [`StoreError::Backend`] if the profile document cannot be written
    #[instrument(skip(self, password, full_name, username), fields(email = %email))]
    pub async fn register(
        &self,
        email: &str,
        password: &SecretString,
        full_name: &str,
        username: &str,
    ) -> Result<User> {
        let email = Email::parse(email)?;
        let _guard = self.lock_writes().await;
        if self.current_uid().is_some() {
            return Err(StoreError::AlreadySignedIn);
        }

        let identity = self
            .inner
            .identity
            .create_account(&email, password)
            .await
            .map_err(StoreError::Auth)?;
        let identity = self
            .inner
            .identity
            .set_display_name(&identity, full_name)
            .await
            .map_err(StoreError::Auth)?;

        let profile = UserProfile::new(
            identity.uid.clone(),
            full_name.to_string(),
            username.to_string(),
            identity.email.clone(),
        );
        self.inner
            .documents
            .set(USERS_COLLECTION, identity.uid.as_str(), to_fields(&profile)?)
            .await
            .map_err(|e| self.write_failed("register", e.into()))?;

        let user = self.set_user(&identity);
        info!(uid = %user.uid, "Registered");
        Ok(user)
    }

    /// Sign in and load the user's data.
    ///
    /// The user is visible in state before hydration finishes. A hydration
    /// failure does not fail the sign-in; it is reported on
    /// [`Self::sync_errors`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidEmail`] for a malformed email and
    /// [`StoreError::Auth`] if the identity provider refuses the credentials.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<User> {
        let email = Email::parse(email)?;
        let _guard = self.lock_writes().await;

        let identity = self
            .inner
            .identity
            .sign_in(&email, password)
            .await
            .map_err(StoreError::Auth)?;
        let user = self.set_user(&identity);
        info!(uid = %user.uid, "Logged in");

        if let Err(e) = self.hydrate(&user.uid).await {
            self.report_hydration_failure(&user.uid, &e);
        }
        Ok(self.current_user().unwrap_or(user))
    }

    /// Sign out and clear everything loaded for the user.
    ///
    /// Local state is cleared even when the identity provider fails.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Auth`] if ending the backend session failed.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        let _guard = self.lock_writes().await;
        let result = self.inner.identity.sign_out().await;
        self.clear_session();
        info!("Logged out");
        result.map_err(StoreError::Auth)
    }

    /// Open a seller store for the signed-in user. No-op when signed out.
    ///
    /// `created_at` is filled in if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile document cannot be updated.
    #[instrument(skip(self, store), fields(store_name = %store.name))]
    pub async fn register_store(&self, mut store: StoreProfile) -> Result<()> {
        let _guard = self.lock_writes().await;
        let Some(uid) = self.current_uid() else {
            debug!("Not signed in, ignoring");
            return Ok(());
        };

        store.created_at.get_or_insert_with(Utc::now);
        let patch =
            DocumentPatch::new().set(FieldPath::new([fields::STORE]), serde_json::to_value(&store)?);
        self.write_profile("register_store", &uid, patch).await?;

        add_breadcrumb("store", "Opened store", Some(&[("name", store.name.as_str())]));
        self.update(|state| state.user_store = Some(store));
        Ok(())
    }

    /// Inline an image as the user's profile picture. No-op when signed out.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnsupportedImageType`] unless `mime` is `image/*`
    /// - [`StoreError::ImageTooLarge`] above [`MAX_PROFILE_IMAGE_BYTES`]
    /// - [`StoreError::Backend`] if the profile document cannot be updated
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn update_profile_image(&self, bytes: &[u8], mime: &str) -> Result<()> {
        if !is_image_mime(mime) {
            return Err(StoreError::UnsupportedImageType(mime.to_string()));
        }
        if bytes.len() > MAX_PROFILE_IMAGE_BYTES {
            return Err(StoreError::ImageTooLarge {
                size: bytes.len(),
                max: MAX_PROFILE_IMAGE_BYTES,
            });
        }

        let _guard = self.lock_writes().await;
        let Some(uid) = self.current_uid() else {
            debug!("Not signed in, ignoring");
            return Ok(());
        };

        let data_uri = format!("data:{mime};base64,{}", STANDARD.encode(bytes));
        let patch = DocumentPatch::new().set(
            FieldPath::new([fields::IMAGE_PROFILE]),
            Value::String(data_uri.clone()),
        );
        self.write_profile("update_profile_image", &uid, patch).await?;

        self.update(|state| {
            if let Some(user) = state.user.as_mut() {
                user.photo = ProfileImage::Inline(data_uri);
            }
        });
        Ok(())
    }

    fn current_user(&self) -> Option<User> {
        self.inner.state.borrow().user.clone()
    }
}

/// `image/<subtype>` with a plain subtype (no parameters).
fn is_image_mime(mime: &str) -> bool {
    mime.strip_prefix("image/").is_some_and(|subtype| {
        !subtype.is_empty()
            && subtype
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::BackendError;
    use crate::store::testing::{PASSWORD, account, backend, product, signed_in, store_over};

    fn secret(s: &str) -> SecretString {
        SecretString::from(s)
    }

    #[tokio::test]
    async fn test_register_writes_empty_profile() {
        let backend = backend();
        let store = store_over(&backend);

        let user = store
            .register("  Rina@Example.com", &secret(PASSWORD), "Rina Wijaya", "rina")
            .await
            .unwrap();

        assert_eq!(user.email, "rina@example.com");
        assert_eq!(user.display_name.as_deref(), Some("Rina Wijaya"));
        let document = backend.document("users", user.uid.as_str()).unwrap();
        assert_eq!(document["fullname"], json!("Rina Wijaya"));
        assert_eq!(document["username"], json!("rina"));
        assert_eq!(document["cart"], json!({}));
        assert_eq!(document["wishlist"], json!({}));
        assert_eq!(document["imageProfile"], Value::Null);
        assert_eq!(store.snapshot().user, Some(user));
    }

    #[tokio::test]
    async fn test_register_rejections() {
        let backend = backend();
        let store = store_over(&backend);

        let err = store
            .register("not-an-email", &secret(PASSWORD), "X", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidEmail(_)));

        let err = store
            .register("x@example.com", &secret("123"), "X", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Auth(BackendError::WeakPassword(_))));
        assert!(store.snapshot().user.is_none());

        store
            .register("x@example.com", &secret(PASSWORD), "X", "x")
            .await
            .unwrap();
        let err = store
            .register("y@example.com", &secret(PASSWORD), "Y", "y")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadySignedIn));
    }

    #[tokio::test]
    async fn test_register_existing_email() {
        let backend = backend();
        account(&backend, "ayu@example.com");
        let store = store_over(&backend);

        let err = store
            .register("ayu@example.com", &secret(PASSWORD), "Ayu", "ayu")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Auth(BackendError::EmailExists)));
        assert_eq!(
            err.user_message(),
            "An account with this email already exists"
        );
    }

    #[tokio::test]
    async fn test_login_sets_user_and_hydrates() {
        let backend = backend();
        let identity = account(&backend, "ayu@example.com");
        backend.insert_document(
            "users",
            identity.uid.as_str(),
            crate::store::testing::fields(json!({
                "cart": {"p1": {"id": "p1", "quantity": 3}},
                "wishlist": {}
            })),
        );
        let store = store_over(&backend);

        let user = store.login("ayu@example.com", &secret(PASSWORD)).await.unwrap();

        assert_eq!(user.uid, identity.uid);
        assert!(user.photo.is_none());
        assert_eq!(store.snapshot().cart[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let backend = backend();
        account(&backend, "ayu@example.com");
        let store = store_over(&backend);

        let err = store
            .login("ayu@example.com", &secret("wrong-password"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Auth(BackendError::InvalidCredentials)));
        assert!(store.snapshot().user.is_none());
    }

    #[tokio::test]
    async fn test_login_survives_hydration_failure() {
        let backend = backend();
        account(&backend, "ayu@example.com");
        let store = store_over(&backend);
        let mut errors = store.sync_errors();

        backend.set_fail_reads(true);
        let user = store.login("ayu@example.com", &secret(PASSWORD)).await.unwrap();

        let state = store.snapshot();
        assert_eq!(state.user.unwrap().uid, user.uid);
        assert!(state.cart.is_empty());
        assert_eq!(errors.try_recv().unwrap().operation, "load_user_data");
    }

    #[tokio::test]
    async fn test_logout_clears_user_data() {
        let (store, _backend, _identity) = signed_in().await;
        store.add_to_cart(&product("p1", 350_000)).await.unwrap();
        store.toggle_wishlist(&product("p2", 85_000)).await.unwrap();
        store
            .register_store(StoreProfile::new("Toko Ayu", "Bandung"))
            .await
            .unwrap();
        store.set_checkout_items(store.snapshot().cart);

        store.logout().await.unwrap();

        let state = store.snapshot();
        assert!(state.user.is_none());
        assert!(state.cart.is_empty());
        assert!(state.wishlist.is_empty());
        assert!(state.user_store.is_none());
        assert!(state.checkout_items.is_empty());
    }

    #[tokio::test]
    async fn test_register_store_merges_field() {
        let (store, backend, identity) = signed_in().await;
        store.add_to_cart(&product("p1", 10)).await.unwrap();

        store
            .register_store(StoreProfile::new("Toko Ayu", "Bandung"))
            .await
            .unwrap();

        let document = backend.document("users", identity.uid.as_str()).unwrap();
        assert_eq!(document["store"]["name"], json!("Toko Ayu"));
        assert!(document["store"]["createdAt"].is_string());
        // Other fields untouched
        assert_eq!(document["cart"]["p1"]["quantity"], json!(1));
        assert_eq!(store.snapshot().user_store.unwrap().location, "Bandung");
    }

    #[tokio::test]
    async fn test_register_store_signed_out_is_noop() {
        let backend = backend();
        let store = store_over(&backend);

        store
            .register_store(StoreProfile::new("Toko", "Bali"))
            .await
            .unwrap();

        assert!(store.snapshot().user_store.is_none());
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn test_update_profile_image() {
        let (store, backend, identity) = signed_in().await;

        store
            .update_profile_image(&[0x89, b'P', b'N', b'G'], "image/png")
            .await
            .unwrap();

        let expected = "data:image/png;base64,iVBORw==";
        let document = backend.document("users", identity.uid.as_str()).unwrap();
        assert_eq!(document["imageProfile"], json!(expected));
        assert_eq!(
            store.snapshot().user.unwrap().photo,
            ProfileImage::Inline(expected.to_string())
        );
    }

    #[tokio::test]
    async fn test_update_profile_image_validation() {
        let (store, backend, _identity) = signed_in().await;
        let writes = backend.write_count();

        let err = store
            .update_profile_image(b"%PDF", "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedImageType(_)));

        let big = vec![0_u8; MAX_PROFILE_IMAGE_BYTES + 1];
        let err = store.update_profile_image(&big, "image/jpeg").await.unwrap_err();
        assert!(matches!(err, StoreError::ImageTooLarge { .. }));

        assert_eq!(backend.write_count(), writes);
    }

    #[test]
    fn test_is_image_mime() {
        assert!(is_image_mime("image/png"));
        assert!(is_image_mime("image/svg+xml"));
        assert!(!is_image_mime("image/"));
        assert!(!is_image_mime("image/png;base64,"));
        assert!(!is_image_mime("text/plain"));
    }
}

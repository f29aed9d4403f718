//! Integration tests for Vintage Market.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory backend, no network
//! cargo test -p vintage-integration-tests
//!
//! # Against a Firebase project or the local emulators
//! FIREBASE_PROJECT_ID=demo-vintage \
//! FIREBASE_API_KEY=any \
//! FIREBASE_AUTH_URL=http://127.0.0.1:9099/identitytoolkit.googleapis.com/v1/ \
//! FIREBASE_TOKEN_URL=http://127.0.0.1:9099/securetoken.googleapis.com/v1/ \
//! FIREBASE_FIRESTORE_URL=http://127.0.0.1:8080/v1/ \
//! cargo test -p vintage-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `storefront_flow` - Store and session listener end to end
//! - `legacy_profiles` - Profiles written in the array layout
//! - `firebase_live` - Live backend round trips (ignored by default)

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use vintage_core::{Email, Product};
use vintage_storefront::backend::memory::InMemoryBackend;
use vintage_storefront::backend::{AuthIdentity, Backend, Fields};
use vintage_storefront::{AppStore, SessionListener, SessionState};

/// Password used for every fixture account.
pub const PASSWORD: &str = "kebaya-biru-42";

/// How long any single wait may take before a test fails.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// An in-memory backend shared by every store a test opens.
///
/// Opening a second store over the same world behaves like restarting the
/// app: documents survive, local state does not.
pub struct TestWorld {
    pub backend: Arc<InMemoryBackend>,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorld {
    #[must_use]
    pub fn new() -> Self {
        Self {
            backend: Arc::new(InMemoryBackend::new()),
        }
    }

    /// A fresh store over this world.
    #[must_use]
    pub fn open_store(&self) -> AppStore {
        AppStore::new(Backend {
            identity: self.backend.clone(),
            documents: self.backend.clone(),
        })
    }

    /// A fresh store with its session listener running and settled.
    pub async fn open_app(&self) -> (AppStore, SessionListener) {
        let store = self.open_store();
        let listener = SessionListener::spawn(store.clone());
        tokio::time::timeout(TIMEOUT, listener.wait_until_ready())
            .await
            .expect("listener did not become ready");
        (store, listener)
    }

    /// Put products in the catalog.
    pub fn stock(&self, products: &[(&str, &str, u64)]) {
        for (id, name, price) in products {
            self.backend.insert_document(
                "products",
                id,
                fields(json!({
                    "name": name,
                    "price": price,
                    "categories": "Outerwear",
                    "condition": "Second",
                    "storeName": "Pasar Loak",
                    "storeLocation": "Yogyakarta"
                })),
            );
        }
    }

    /// An account with a profile document in the legacy array layout.
    pub fn legacy_account(&self, email: &str, cart: Value, wishlist: Value) -> AuthIdentity {
        let email = Email::parse(email).expect("fixture email");
        let identity = self.backend.add_account(&email, PASSWORD, Some("Sari"));
        self.backend.insert_document(
            "users",
            identity.uid.as_str(),
            fields(json!({
                "uid": identity.uid.as_str(),
                "fullname": "Sari Dewi",
                "username": "sari",
                "email": email.as_str(),
                "cart": cart,
                "wishlist": wishlist,
                "imageProfile": null
            })),
        );
        identity
    }

    /// The stored profile document for a user.
    #[must_use]
    pub fn profile(&self, identity: &AuthIdentity) -> Fields {
        self.backend
            .document("users", identity.uid.as_str())
            .expect("profile document")
    }
}

/// Wait until the listener reaches a state.
pub async fn wait_for(listener: &SessionListener, wanted: impl Fn(&SessionState) -> bool) {
    let mut rx = listener.subscribe();
    tokio::time::timeout(TIMEOUT, rx.wait_for(|state| wanted(state)))
        .await
        .expect("timed out waiting for session state")
        .expect("session listener stopped");
}

/// Find a catalog product by id.
#[must_use]
pub fn product(store: &AppStore, id: &str) -> Product {
    store
        .snapshot()
        .all_products()
        .iter()
        .find(|product| product.id.as_str() == id)
        .cloned()
        .expect("product in catalog")
}

/// Unique email for tests that share a live backend.
#[must_use]
pub fn unique_email() -> String {
    format!("it-{}@example.com", uuid::Uuid::new_v4().simple())
}

#[must_use]
pub fn fields(value: Value) -> Fields {
    value.as_object().cloned().expect("fixture is not an object")
}

//! Application state store.
//!
//! [`AppStore`] is the single state container of the storefront: catalog,
//! cart, wishlist, signed-in user, seller store, and checkout staging. Views
//! read it through [`AppStore::snapshot`] or [`AppStore::subscribe`] and the
//! derived views in [`crate::views`]; they change it only through the
//! operations below.
//!
//! # Consistency
//!
//! - Every mutating operation holds the store's write lock from its first
//!   read to its last local update, so operations issued through one store
//!   never interleave
//! - Remote first: local state changes only after the backend accepted the
//!   write. A failed write returns the error, leaves local state untouched,
//!   and is published on [`AppStore::sync_errors`]
//! - Cart and wishlist writes are field-level patches on the profile
//!   document, so other clients' unrelated entries are never overwritten

mod account;
mod cart;

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard, broadcast, watch};
use tracing::{debug, info, instrument, warn};

use vintage_core::{
    CartItem, Keyed, PRODUCTS_COLLECTION, Product, ProfileImage, StoreProfile, USERS_COLLECTION,
    User, UserId, WishlistEntry, decode_entries, fields,
};

use crate::backend::{
    AuthIdentity, Backend, Document, DocumentPatch, DocumentStore, FieldPath, Fields,
    IdentityService,
};
use crate::error::{
    Result, StoreError, SyncError, SyncErrorKind, capture, clear_sentry_user, set_sentry_user,
};

/// Largest quantity a single cart line may hold.
pub const MAX_CART_QUANTITY: u32 = 999;

/// Largest profile image accepted for inlining (700 KiB).
///
/// Base64 grows this by a third, which keeps the profile document well under
/// the 1 MiB document limit.
pub const MAX_PROFILE_IMAGE_BYTES: usize = 700 * 1024;

/// Capacity of the sync error channel; slow observers miss older events.
const SYNC_ERROR_CAPACITY: usize = 64;

/// Everything the storefront keeps locally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    /// Catalog, in backend listing order.
    pub products: Vec<Product>,
    pub search_query: String,
    /// Cart lines, one per product id, in insertion order.
    pub cart: Vec<CartItem>,
    /// Wishlist entries, one per product id, in insertion order.
    pub wishlist: Vec<WishlistEntry>,
    pub user: Option<User>,
    /// Set once the first session state has been processed.
    pub auth_ready: bool,
    /// The signed-in user's seller store, if they opened one.
    pub user_store: Option<StoreProfile>,
    /// Lines staged for checkout. Never persisted.
    pub checkout_items: Vec<CartItem>,
}

/// The application state store.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct AppStore {
    inner: Arc<Inner>,
}

struct Inner {
    identity: Arc<dyn IdentityService>,
    documents: Arc<dyn DocumentStore>,
    state: watch::Sender<StoreState>,
    writes: Mutex<()>,
    errors: broadcast::Sender<SyncError>,
    /// Profile fields still stored in the legacy array layout.
    unmigrated: std::sync::Mutex<BTreeSet<&'static str>>,
}

impl std::fmt::Debug for AppStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppStore")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl AppStore {
    /// Create an empty store over a backend.
    #[must_use]
    pub fn new(backend: Backend) -> Self {
        let (state, _) = watch::channel(StoreState::default());
        let (errors, _) = broadcast::channel(SYNC_ERROR_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                identity: backend.identity,
                documents: backend.documents,
                state,
                writes: Mutex::new(()),
                errors,
                unmigrated: std::sync::Mutex::new(BTreeSet::new()),
            }),
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// A copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> StoreState {
        self.inner.state.borrow().clone()
    }

    /// Watch the state; the receiver is notified after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.inner.state.subscribe()
    }

    /// Receive sync failures (hydration and write errors).
    #[must_use]
    pub fn sync_errors(&self) -> broadcast::Receiver<SyncError> {
        self.inner.errors.subscribe()
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Replace the catalog with the `products` collection.
    ///
    /// Documents that do not decode as products are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read; the catalog is left
    /// as it was.
    #[instrument(skip(self))]
    pub async fn load_products(&self) -> Result<()> {
        let documents = self.inner.documents.get_all(PRODUCTS_COLLECTION).await?;
        let products: Vec<Product> = documents.into_iter().filter_map(decode_product).collect();

        info!(count = products.len(), "Loaded products");
        self.update(|state| state.products = products);
        Ok(())
    }

    // =========================================================================
    // Hydration
    // =========================================================================

    /// Load the user's cart, wishlist, store, and profile image.
    ///
    /// Failures are logged and published on [`Self::sync_errors`]; local
    /// state is left as it was.
    #[instrument(skip(self), fields(uid = %uid))]
    pub async fn load_user_data(&self, uid: &UserId) {
        let _guard = self.lock_writes().await;
        if let Err(e) = self.hydrate(uid).await {
            self.report_hydration_failure(uid, &e);
        }
    }

    /// Like [`Self::load_user_data`], but returns the failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile document cannot be read or decoded.
    #[instrument(skip(self), fields(uid = %uid))]
    pub async fn try_load_user_data(&self, uid: &UserId) -> Result<()> {
        let _guard = self.lock_writes().await;
        self.hydrate(uid).await
    }

    /// Read the profile document into local state. Caller holds the write
    /// lock.
    pub(crate) async fn hydrate(&self, uid: &UserId) -> Result<()> {
        let Some(document) = self
            .inner
            .documents
            .get(USERS_COLLECTION, uid.as_str())
            .await?
        else {
            debug!("No profile document");
            return Ok(());
        };
        let profile = HydratedProfile::decode(&document.fields);

        let current = self.current_uid();
        if current.as_ref().is_some_and(|signed_in| signed_in != uid) {
            warn!("Signed-in user changed during hydration, discarding");
            return Ok(());
        }

        self.set_unmigrated(profile.legacy_fields.iter().copied());
        let legacy = !profile.legacy_fields.is_empty();
        let (cart, wishlist) = (profile.cart.clone(), profile.wishlist.clone());

        debug!(
            cart = profile.cart.len(),
            wishlist = profile.wishlist.len(),
            has_store = profile.store.is_some(),
            "Hydrated user data"
        );
        self.update(|state| {
            state.cart = profile.cart;
            state.wishlist = profile.wishlist;
            state.user_store = profile.store;
            if !profile.image.is_none()
                && let Some(user) = state.user.as_mut()
            {
                user.photo = profile.image;
            }
        });

        if legacy {
            self.migrate_legacy_layout(uid, &cart, &wishlist).await;
        }
        Ok(())
    }

    /// Rewrite array-layout cart/wishlist fields as keyed maps.
    ///
    /// A failed migration is retried implicitly: the next write to the field
    /// sends the whole collection.
    async fn migrate_legacy_layout(
        &self,
        uid: &UserId,
        cart: &[CartItem],
        wishlist: &[WishlistEntry],
    ) {
        let pending = self.unmigrated_fields();
        let mut patch = DocumentPatch::new();
        for field in &pending {
            let value = match *field {
                fields::CART => keyed_value(cart),
                _ => keyed_value(wishlist),
            };
            match value {
                Ok(value) => patch = patch.set(FieldPath::new([*field]), value),
                Err(e) => {
                    warn!(field, error = %e, "Cannot encode field for migration");
                    return;
                }
            }
        }

        match self
            .inner
            .documents
            .update(USERS_COLLECTION, uid.as_str(), patch)
            .await
        {
            Ok(()) => {
                info!(fields = ?pending, "Migrated profile to keyed layout");
                self.mark_migrated(&pending);
            }
            Err(e) => warn!(error = %e, "Profile layout migration failed"),
        }
    }

    // =========================================================================
    // Session helpers (shared with the session listener)
    // =========================================================================

    pub(crate) fn identity_service(&self) -> Arc<dyn IdentityService> {
        Arc::clone(&self.inner.identity)
    }

    pub(crate) async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.inner.writes.lock().await
    }

    /// Mirror an identity as the local user, photo absent until hydration.
    pub(crate) fn set_user(&self, identity: &AuthIdentity) -> User {
        let user = User {
            uid: identity.uid.clone(),
            email: identity.email.clone(),
            display_name: identity.display_name.clone(),
            photo: ProfileImage::None,
        };
        set_sentry_user(&user.uid, Some(&user.email));
        let mirrored = user.clone();
        self.update(|state| state.user = Some(mirrored));
        user
    }

    /// Forget the signed-in user and everything loaded for them.
    pub(crate) fn clear_session(&self) {
        clear_sentry_user();
        self.set_unmigrated(std::iter::empty());
        self.update(|state| {
            state.user = None;
            state.cart.clear();
            state.wishlist.clear();
            state.user_store = None;
            state.checkout_items.clear();
        });
    }

    pub(crate) fn mark_auth_ready(&self) {
        self.inner.state.send_if_modified(|state| {
            let changed = !state.auth_ready;
            state.auth_ready = true;
            changed
        });
    }

    pub(crate) fn report_hydration_failure(&self, uid: &UserId, error: &StoreError) {
        warn!(uid = %uid, error = %error, "Failed to load user data");
        self.publish(SyncError {
            operation: "load_user_data",
            kind: SyncErrorKind::Hydration,
            message: error.to_string(),
        });
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn update(&self, modify: impl FnOnce(&mut StoreState)) {
        self.inner.state.send_modify(modify);
    }

    fn current_uid(&self) -> Option<UserId> {
        self.inner
            .state
            .borrow()
            .user
            .as_ref()
            .map(|user| user.uid.clone())
    }

    fn publish(&self, error: SyncError) {
        // No subscribers is fine.
        let _ = self.inner.errors.send(error);
    }

    /// Log, capture, and publish a failed write, handing the error back.
    fn write_failed(&self, operation: &'static str, error: StoreError) -> StoreError {
        let event_id = capture(operation, &error);
        tracing::error!(
            operation,
            error = %error,
            sentry_event_id = ?event_id,
            "Write failed"
        );
        self.publish(SyncError {
            operation,
            kind: SyncErrorKind::Write,
            message: error.to_string(),
        });
        error
    }

    /// Apply a patch to the user's profile document.
    async fn write_profile(
        &self,
        operation: &'static str,
        uid: &UserId,
        patch: DocumentPatch,
    ) -> Result<()> {
        self.inner
            .documents
            .update(USERS_COLLECTION, uid.as_str(), patch)
            .await
            .map_err(|e| self.write_failed(operation, e.into()))
    }

    /// Persist a cart or wishlist change.
    ///
    /// `delta` touches only the changed entry. While the remote field still
    /// has the legacy array layout, the whole collection (`after`) is written
    /// instead.
    async fn write_entries<T: Serialize + Keyed>(
        &self,
        operation: &'static str,
        uid: &UserId,
        field: &'static str,
        delta: DocumentPatch,
        after: &[T],
    ) -> Result<()> {
        let legacy = self.unmigrated_fields().contains(&field);
        let patch = if legacy {
            DocumentPatch::new().set(FieldPath::new([field]), keyed_value(after)?)
        } else {
            delta
        };
        self.write_profile(operation, uid, patch).await?;
        if legacy {
            self.mark_migrated(&[field]);
        }
        Ok(())
    }

    fn unmigrated_fields(&self) -> Vec<&'static str> {
        self.inner
            .unmigrated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    fn set_unmigrated(&self, fields: impl Iterator<Item = &'static str>) {
        let mut unmigrated = self
            .inner
            .unmigrated
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        unmigrated.clear();
        unmigrated.extend(fields);
    }

    fn mark_migrated(&self, fields: &[&'static str]) {
        let mut unmigrated = self
            .inner
            .unmigrated
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for field in fields {
            unmigrated.remove(field);
        }
    }
}

/// The parts of a profile document the store mirrors.
struct HydratedProfile {
    cart: Vec<CartItem>,
    wishlist: Vec<WishlistEntry>,
    store: Option<StoreProfile>,
    image: ProfileImage,
    /// Fields found in the legacy array layout.
    legacy_fields: Vec<&'static str>,
}

impl HydratedProfile {
    /// Each field decodes on its own; a bad field or entry is logged and
    /// left out rather than failing the whole profile.
    fn decode(document: &Fields) -> Self {
        let field = |name: &str| document.get(name).unwrap_or(&Value::Null);

        let store = match field(fields::STORE) {
            Value::Null => None,
            value => serde_json::from_value(value.clone())
                .map_err(|e| warn!(error = %e, "Ignoring malformed store profile"))
                .ok(),
        };
        let legacy_fields = [fields::CART, fields::WISHLIST]
            .into_iter()
            .filter(|name| field(*name).is_array())
            .collect();

        Self {
            cart: decode_field(fields::CART, field(fields::CART)),
            wishlist: decode_field(fields::WISHLIST, field(fields::WISHLIST)),
            store,
            image: ProfileImage::from_reference(field(fields::IMAGE_PROFILE).as_str()),
            legacy_fields,
        }
    }
}

fn decode_field<T: DeserializeOwned + Keyed>(name: &'static str, value: &Value) -> Vec<T> {
    match decode_entries::<T>(value) {
        Ok(decoded) => {
            for reason in &decoded.skipped {
                warn!(field = name, reason = %reason, "Skipping malformed entry");
            }
            decoded.entries
        }
        Err(e) => {
            warn!(field = name, error = %e, "Ignoring malformed field");
            Vec::new()
        }
    }
}

/// Decode a product document, taking the id from the document id.
fn decode_product(document: Document) -> Option<Product> {
    let Document { id, mut fields } = document;
    fields.insert("id".to_string(), Value::String(id.clone()));
    match serde_json::from_value(Value::Object(fields)) {
        Ok(product) => Some(product),
        Err(e) => {
            warn!(product_id = %id, error = %e, "Skipping malformed product");
            None
        }
    }
}

/// Encode entries as a map keyed by product id.
fn keyed_value<T: Serialize + Keyed>(entries: &[T]) -> Result<Value> {
    let mut map = serde_json::Map::new();
    for entry in entries {
        map.insert(entry.key().to_string(), serde_json::to_value(entry)?);
    }
    Ok(Value::Object(map))
}

/// Encode a value as document fields.
fn to_fields<T: Serialize>(value: &T) -> Result<Fields> {
    Ok(serde_json::from_value(serde_json::to_value(value)?)?)
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::testing::{account, backend, fields, product, signed_in, store_over};
    use super::*;

    #[tokio::test]
    async fn test_load_products_takes_ids_from_documents() {
        let backend = backend();
        backend.insert_document(
            "products",
            "abc123",
            fields(json!({"name": "Basic White Oversized Tee", "price": 85_000})),
        );
        backend.insert_document("products", "broken", fields(json!({"price": "free"})));
        let store = store_over(&backend);

        store.load_products().await.unwrap();

        let products = store.snapshot().products;
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id.as_str(), "abc123");
        assert_eq!(products[0].price.amount(), 85_000);
    }

    #[tokio::test]
    async fn test_load_products_failure_keeps_catalog() {
        let backend = backend();
        backend.insert_document("products", "p1", fields(json!({"name": "Tee"})));
        let store = store_over(&backend);
        store.load_products().await.unwrap();

        backend.set_fail_reads(true);
        assert!(store.load_products().await.is_err());
        assert_eq!(store.snapshot().products.len(), 1);
    }

    #[tokio::test]
    async fn test_hydration_reads_cart_wishlist_store_and_image() {
        let backend = backend();
        let identity = account(&backend, "ayu@example.com");
        backend.insert_document(
            "users",
            identity.uid.as_str(),
            fields(json!({
                "cart": {"p1": {"id": "p1", "price": 350_000, "quantity": 2}},
                "wishlist": {"p2": {"id": "p2"}},
                "store": {"name": "Toko Ayu", "location": "Bandung", "tagline": "thrift"},
                "imageProfile": "data:image/png;base64,iVBOR"
            })),
        );
        let store = store_over(&backend);
        store.set_user(&identity);

        store.try_load_user_data(&identity.uid).await.unwrap();

        let state = store.snapshot();
        assert_eq!(state.cart.len(), 1);
        assert_eq!(state.cart[0].quantity, 2);
        assert_eq!(state.wishlist[0].product_id().as_str(), "p2");
        let shop = state.user_store.unwrap();
        assert_eq!(shop.name, "Toko Ayu");
        assert_eq!(shop.extra["tagline"], json!("thrift"));
        assert!(matches!(
            state.user.unwrap().photo,
            ProfileImage::Inline(_)
        ));
    }

    #[tokio::test]
    async fn test_bad_legacy_line_does_not_block_hydration() {
        let backend = backend();
        let identity = account(&backend, "ayu@example.com");
        backend.insert_document(
            "users",
            identity.uid.as_str(),
            fields(json!({
                "cart": [{"id": "p1", "quantity": 2}, {"id": "p2", "quantity": -1}],
                "wishlist": [{"id": "w1"}],
                "store": {"name": "Toko Ayu", "location": "Bandung"}
            })),
        );
        let store = store_over(&backend);
        store.set_user(&identity);

        store.try_load_user_data(&identity.uid).await.unwrap();

        let state = store.snapshot();
        assert_eq!(state.cart.len(), 1);
        assert_eq!(state.cart[0].product_id().as_str(), "p1");
        assert_eq!(state.wishlist[0].product_id().as_str(), "w1");
        assert_eq!(state.user_store.unwrap().name, "Toko Ayu");
        // Migration rewrites the field with the readable lines only.
        let document = backend.document("users", identity.uid.as_str()).unwrap();
        assert_eq!(document["cart"]["p1"]["quantity"], json!(2));
        assert!(document["cart"].get("p2").is_none());
    }

    #[tokio::test]
    async fn test_malformed_store_keeps_cart_and_wishlist() {
        let backend = backend();
        let identity = account(&backend, "ayu@example.com");
        backend.insert_document(
            "users",
            identity.uid.as_str(),
            fields(json!({
                "cart": {"p1": {"id": "p1", "quantity": 1}},
                "wishlist": {"w1": {"id": "w1"}},
                "store": "closed"
            })),
        );
        let store = store_over(&backend);
        store.set_user(&identity);

        store.try_load_user_data(&identity.uid).await.unwrap();

        let state = store.snapshot();
        assert_eq!(state.cart.len(), 1);
        assert_eq!(state.wishlist.len(), 1);
        assert!(state.user_store.is_none());
    }

    #[tokio::test]
    async fn test_zero_quantity_line_is_not_loaded() {
        let backend = backend();
        let identity = account(&backend, "ayu@example.com");
        backend.insert_document(
            "users",
            identity.uid.as_str(),
            fields(json!({"cart": {"p1": {"id": "p1", "quantity": 0}}})),
        );
        let store = store_over(&backend);
        store.set_user(&identity);

        store.try_load_user_data(&identity.uid).await.unwrap();
        assert!(store.snapshot().cart.is_empty());

        // Adding it again starts a fresh line.
        store.add_to_cart(&product("p1", 10)).await.unwrap();
        assert_eq!(store.snapshot().cart[0].quantity, 1);
        let document = backend.document("users", identity.uid.as_str()).unwrap();
        assert_eq!(document["cart"]["p1"]["quantity"], json!(1));
    }

    #[tokio::test]
    async fn test_hydration_failure_is_reported_and_swallowed() {
        let (store, backend, identity) = signed_in().await;
        store.add_to_cart(&product("p1", 10)).await.unwrap();
        let mut errors = store.sync_errors();

        backend.set_fail_reads(true);
        store.load_user_data(&identity.uid).await;

        assert_eq!(store.snapshot().cart.len(), 1);
        let error = errors.try_recv().unwrap();
        assert_eq!(error.operation, "load_user_data");
        assert_eq!(error.kind, SyncErrorKind::Hydration);
        assert!(store.try_load_user_data(&identity.uid).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_profile_document_leaves_state() {
        let store = store_over(&backend());
        store.try_load_user_data(&UserId::new("ghost")).await.unwrap();
        assert_eq!(store.snapshot(), StoreState::default());
    }

    #[tokio::test]
    async fn test_legacy_array_layout_is_migrated() {
        let backend = backend();
        let identity = account(&backend, "ayu@example.com");
        backend.insert_document(
            "users",
            identity.uid.as_str(),
            fields(json!({"cart": [], "wishlist": [{"id": "p1"}]})),
        );
        let store = store_over(&backend);
        store.set_user(&identity);

        store.try_load_user_data(&identity.uid).await.unwrap();

        assert_eq!(store.snapshot().wishlist[0].product_id().as_str(), "p1");
        let document = backend.document("users", identity.uid.as_str()).unwrap();
        assert_eq!(document["cart"], json!({}));
        assert_eq!(document["wishlist"]["p1"]["id"], json!("p1"));
        assert!(store.unmigrated_fields().is_empty());
    }

    #[tokio::test]
    async fn test_failed_migration_falls_back_to_whole_field_write() {
        let backend = backend();
        let identity = account(&backend, "ayu@example.com");
        backend.insert_document(
            "users",
            identity.uid.as_str(),
            fields(json!({"cart": [{"id": "p1", "quantity": 1}], "wishlist": []})),
        );
        let store = store_over(&backend);
        store.set_user(&identity);

        backend.set_fail_writes(true);
        store.try_load_user_data(&identity.uid).await.unwrap();
        assert_eq!(store.unmigrated_fields(), ["cart", "wishlist"]);

        backend.set_fail_writes(false);
        store.add_to_cart(&product("p2", 5)).await.unwrap();

        let document = backend.document("users", identity.uid.as_str()).unwrap();
        assert_eq!(document["cart"]["p1"]["quantity"], json!(1));
        assert_eq!(document["cart"]["p2"]["quantity"], json!(1));
        assert_eq!(store.unmigrated_fields(), ["wishlist"]);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let (store, _backend, _identity) = signed_in().await;
        let mut rx = store.subscribe();

        store.set_search_query("denim");

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().search_query, "denim");
    }
}

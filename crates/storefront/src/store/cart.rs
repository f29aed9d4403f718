//! Cart, wishlist, search, and checkout operations.

use chrono::Utc;
use tracing::{debug, instrument};

use vintage_core::{CartItem, Product, ProductId, WishlistEntry, fields};

use super::{AppStore, MAX_CART_QUANTITY};
use crate::backend::{DocumentPatch, FieldPath};
use crate::error::{Result, StoreError, add_breadcrumb};

impl AppStore {
    /// Add or remove a product from the wishlist. No-op when signed out.
    ///
    /// Returns whether the product is wishlisted afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; the wishlist is left as it was.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn toggle_wishlist(&self, product: &Product) -> Result<bool> {
        let _guard = self.lock_writes().await;
        let Some(uid) = self.current_uid() else {
            debug!("Not signed in, ignoring");
            return Ok(false);
        };

        let mut wishlist = self.inner.state.borrow().wishlist.clone();
        let path = FieldPath::new([fields::WISHLIST, product.id.as_str()]);
        let before = wishlist.len();
        wishlist.retain(|entry| entry.product_id() != &product.id);
        let added = wishlist.len() == before;

        let delta = if added {
            let entry = WishlistEntry::new(product.clone(), Utc::now());
            let patch = DocumentPatch::new().set(path, serde_json::to_value(&entry)?);
            wishlist.push(entry);
            patch
        } else {
            DocumentPatch::new().delete(path)
        };
        self.write_entries("toggle_wishlist", &uid, fields::WISHLIST, delta, &wishlist)
            .await?;

        self.update(|state| state.wishlist = wishlist);
        Ok(added)
    }

    /// Add one of a product to the cart. No-op when signed out.
    ///
    /// An existing line is incremented server-side, and its snapshot fields
    /// are rewritten so a line deleted by another device comes back whole.
    /// Otherwise a new line with quantity 1 is appended.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidQuantity`] if the line is already at
    /// [`MAX_CART_QUANTITY`], or an error if the write fails.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add_to_cart(&self, product: &Product) -> Result<()> {
        let _guard = self.lock_writes().await;
        let Some(uid) = self.current_uid() else {
            debug!("Not signed in, ignoring");
            return Ok(());
        };

        let mut cart = self.inner.state.borrow().cart.clone();
        let path = FieldPath::new([fields::CART, product.id.as_str()]);

        let delta = if let Some(item) = cart.iter_mut().find(|i| i.product_id() == &product.id) {
            if item.quantity >= MAX_CART_QUANTITY {
                return Err(StoreError::InvalidQuantity {
                    quantity: item.quantity.saturating_add(1),
                    max: MAX_CART_QUANTITY,
                });
            }
            item.quantity += 1;
            line_refresh(&path, item)?.increment(path.child(fields::QUANTITY), 1)
        } else {
            let item = CartItem::new(product.clone(), Utc::now());
            let patch = DocumentPatch::new().set(path, serde_json::to_value(&item)?);
            cart.push(item);
            patch
        };
        self.write_entries("add_to_cart", &uid, fields::CART, delta, &cart)
            .await?;

        add_breadcrumb(
            "cart",
            "Added to cart",
            Some(&[("product_id", product.id.as_str())]),
        );
        self.update(|state| state.cart = cart);
        Ok(())
    }

    /// Remove a product's line from the cart. No-op when signed out or when
    /// the product is not in the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; the cart is left as it was.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_from_cart(&self, product_id: &ProductId) -> Result<()> {
        let _guard = self.lock_writes().await;
        let Some(uid) = self.current_uid() else {
            debug!("Not signed in, ignoring");
            return Ok(());
        };

        let mut cart = self.inner.state.borrow().cart.clone();
        let before = cart.len();
        cart.retain(|item| item.product_id() != product_id);
        if cart.len() == before {
            debug!("Not in cart");
            return Ok(());
        }

        let delta = DocumentPatch::new().delete(FieldPath::new([fields::CART, product_id.as_str()]));
        self.write_entries("remove_from_cart", &uid, fields::CART, delta, &cart)
            .await?;

        self.update(|state| state.cart = cart);
        Ok(())
    }

    /// Set the quantity of a cart line. No-op when signed out or when the
    /// product is not in the cart.
    ///
    /// A quantity of 0 removes the line.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidQuantity`] above [`MAX_CART_QUANTITY`],
    /// or an error if the write fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn update_cart_quantity(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        if quantity > MAX_CART_QUANTITY {
            return Err(StoreError::InvalidQuantity {
                quantity,
                max: MAX_CART_QUANTITY,
            });
        }

        let _guard = self.lock_writes().await;
        let Some(uid) = self.current_uid() else {
            debug!("Not signed in, ignoring");
            return Ok(());
        };

        let mut cart = self.inner.state.borrow().cart.clone();
        let line = FieldPath::new([fields::CART, product_id.as_str()]);

        let delta = if quantity == 0 {
            let before = cart.len();
            cart.retain(|item| item.product_id() != product_id);
            if cart.len() == before {
                debug!("Not in cart");
                return Ok(());
            }
            DocumentPatch::new().delete(line)
        } else {
            let Some(item) = cart.iter_mut().find(|i| i.product_id() == product_id) else {
                debug!("Not in cart");
                return Ok(());
            };
            if item.quantity == quantity {
                return Ok(());
            }
            item.quantity = quantity;
            line_refresh(&line, item)?.set(line.child(fields::QUANTITY), quantity.into())
        };
        self.write_entries("update_cart_quantity", &uid, fields::CART, delta, &cart)
            .await?;

        self.update(|state| state.cart = cart);
        Ok(())
    }

    /// Set the catalog search query.
    pub fn set_search_query(&self, query: impl Into<String>) {
        let query = query.into();
        self.inner.state.send_if_modified(|state| {
            if state.search_query == query {
                return false;
            }
            state.search_query = query;
            true
        });
    }

    /// Stage cart lines for checkout. Purely local.
    pub fn set_checkout_items(&self, items: Vec<CartItem>) {
        self.update(|state| state.checkout_items = items);
    }
}

/// Set every field of a cart line except its quantity, one path each.
fn line_refresh(line: &FieldPath, item: &CartItem) -> Result<DocumentPatch> {
    let serde_json::Value::Object(snapshot) = serde_json::to_value(item)? else {
        return Ok(DocumentPatch::new());
    };
    Ok(snapshot
        .into_iter()
        .filter(|(key, _)| key != fields::QUANTITY)
        .fold(DocumentPatch::new(), |patch, (key, value)| {
            patch.set(line.child(key), value)
        }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::SyncErrorKind;
    use crate::store::testing::{backend, fields, id, product, signed_in, store_over};

    #[tokio::test]
    async fn test_add_to_cart_twice_increments() {
        let (store, backend, identity) = signed_in().await;
        let tee = product("p1", 85_000);

        store.add_to_cart(&tee).await.unwrap();
        store.add_to_cart(&tee).await.unwrap();

        let cart = store.snapshot().cart;
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].quantity, 2);

        let document = backend.document("users", identity.uid.as_str()).unwrap();
        assert_eq!(document["cart"]["p1"]["quantity"], json!(2));
        assert_eq!(document["cart"]["p1"]["name"], json!("Product p1"));
    }

    #[tokio::test]
    async fn test_add_restores_line_deleted_elsewhere() {
        let (store, backend, identity) = signed_in().await;
        let tee = product("p1", 85_000);
        store.add_to_cart(&tee).await.unwrap();

        // Another device empties the cart.
        backend.insert_document("users", identity.uid.as_str(), fields(json!({"cart": {}})));
        store.add_to_cart(&tee).await.unwrap();

        let document = backend.document("users", identity.uid.as_str()).unwrap();
        let line = &document["cart"]["p1"];
        assert_eq!(line["id"], json!("p1"));
        assert_eq!(line["name"], json!("Product p1"));
        assert_eq!(line["price"], json!(85_000));
        assert_eq!(line["quantity"], json!(1));
        assert_eq!(store.snapshot().cart[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_quantity_update_restores_line_deleted_elsewhere() {
        let (store, backend, identity) = signed_in().await;
        store.add_to_cart(&product("p1", 10)).await.unwrap();

        backend.insert_document("users", identity.uid.as_str(), fields(json!({"cart": {}})));
        store.update_cart_quantity(&id("p1"), 3).await.unwrap();

        let document = backend.document("users", identity.uid.as_str()).unwrap();
        assert_eq!(document["cart"]["p1"]["name"], json!("Product p1"));
        assert_eq!(document["cart"]["p1"]["quantity"], json!(3));
    }

    #[tokio::test]
    async fn test_add_to_cart_keeps_insertion_order() {
        let (store, _backend, _identity) = signed_in().await;

        for product_id in ["p3", "p1", "p2"] {
            store.add_to_cart(&product(product_id, 1)).await.unwrap();
        }

        let ids: Vec<_> = store
            .snapshot()
            .cart
            .iter()
            .map(|item| item.product_id().to_string())
            .collect();
        assert_eq!(ids, ["p3", "p1", "p2"]);
    }

    #[tokio::test]
    async fn test_signed_out_operations_are_noops() {
        let backend = backend();
        let store = store_over(&backend);
        let tee = product("p1", 85_000);

        store.add_to_cart(&tee).await.unwrap();
        assert!(!store.toggle_wishlist(&tee).await.unwrap());
        store.remove_from_cart(&id("p1")).await.unwrap();
        store.update_cart_quantity(&id("p1"), 3).await.unwrap();

        let state = store.snapshot();
        assert!(state.cart.is_empty());
        assert!(state.wishlist.is_empty());
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn test_toggle_wishlist_twice_restores() {
        let (store, backend, identity) = signed_in().await;
        let jacket = product("p7", 350_000);
        let before = store.snapshot().wishlist;

        assert!(store.toggle_wishlist(&jacket).await.unwrap());
        let document = backend.document("users", identity.uid.as_str()).unwrap();
        assert_eq!(document["wishlist"]["p7"]["id"], json!("p7"));

        assert!(!store.toggle_wishlist(&jacket).await.unwrap());
        assert_eq!(store.snapshot().wishlist, before);
        let document = backend.document("users", identity.uid.as_str()).unwrap();
        assert_eq!(document["wishlist"], json!({}));
    }

    #[tokio::test]
    async fn test_remove_absent_item_skips_write() {
        let (store, backend, _identity) = signed_in().await;
        store.add_to_cart(&product("p1", 10)).await.unwrap();
        let before = store.snapshot().cart;
        let writes = backend.write_count();

        store.remove_from_cart(&id("missing")).await.unwrap();

        assert_eq!(store.snapshot().cart, before);
        assert_eq!(backend.write_count(), writes);
    }

    #[tokio::test]
    async fn test_remove_from_cart() {
        let (store, backend, identity) = signed_in().await;
        store.add_to_cart(&product("p1", 10)).await.unwrap();
        store.add_to_cart(&product("p2", 20)).await.unwrap();

        store.remove_from_cart(&id("p1")).await.unwrap();

        let cart = store.snapshot().cart;
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].product_id().as_str(), "p2");
        let document = backend.document("users", identity.uid.as_str()).unwrap();
        assert!(document["cart"].get("p1").is_none());
    }

    #[tokio::test]
    async fn test_update_cart_quantity() {
        let (store, backend, identity) = signed_in().await;
        store.add_to_cart(&product("p1", 10)).await.unwrap();

        store.update_cart_quantity(&id("p1"), 5).await.unwrap();
        assert_eq!(store.snapshot().cart[0].quantity, 5);
        let document = backend.document("users", identity.uid.as_str()).unwrap();
        assert_eq!(document["cart"]["p1"]["quantity"], json!(5));

        // Unknown id
        store.update_cart_quantity(&id("p9"), 2).await.unwrap();
        assert_eq!(store.snapshot().cart.len(), 1);
    }

    #[tokio::test]
    async fn test_update_cart_quantity_zero_removes() {
        let (store, _backend, _identity) = signed_in().await;
        store.add_to_cart(&product("p1", 10)).await.unwrap();

        store.update_cart_quantity(&id("p1"), 0).await.unwrap();

        assert!(store.snapshot().cart.is_empty());
    }

    #[tokio::test]
    async fn test_quantity_limit() {
        let (store, _backend, _identity) = signed_in().await;
        store.add_to_cart(&product("p1", 10)).await.unwrap();

        let err = store
            .update_cart_quantity(&id("p1"), MAX_CART_QUANTITY + 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuantity { quantity: 1000, max: 999 }));

        store
            .update_cart_quantity(&id("p1"), MAX_CART_QUANTITY)
            .await
            .unwrap();
        let err = store.add_to_cart(&product("p1", 10)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuantity { .. }));
        assert_eq!(store.snapshot().cart[0].quantity, MAX_CART_QUANTITY);
    }

    #[tokio::test]
    async fn test_write_failure_leaves_state_and_reports() {
        let (store, backend, _identity) = signed_in().await;
        store.add_to_cart(&product("p1", 10)).await.unwrap();
        let before = store.snapshot();
        let mut errors = store.sync_errors();

        backend.set_fail_writes(true);
        assert!(store.add_to_cart(&product("p1", 10)).await.is_err());
        assert!(store.add_to_cart(&product("p2", 10)).await.is_err());
        assert!(store.toggle_wishlist(&product("p2", 10)).await.is_err());
        assert!(store.remove_from_cart(&id("p1")).await.is_err());

        assert_eq!(store.snapshot(), before);
        let first = errors.try_recv().unwrap();
        assert_eq!(first.operation, "add_to_cart");
        assert_eq!(first.kind, SyncErrorKind::Write);
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_serialized() {
        let (store, backend, identity) = signed_in().await;
        let tee = product("p1", 10);
        store.add_to_cart(&tee).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let tee = tee.clone();
                tokio::spawn(async move { store.add_to_cart(&tee).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.snapshot().cart[0].quantity, 9);
        let document = backend.document("users", identity.uid.as_str()).unwrap();
        assert_eq!(document["cart"]["p1"]["quantity"], json!(9));
    }

    #[tokio::test]
    async fn test_search_and_checkout_are_local() {
        let (store, backend, _identity) = signed_in().await;
        store.add_to_cart(&product("p1", 10)).await.unwrap();
        let writes = backend.write_count();

        store.set_search_query("tee");
        store.set_checkout_items(store.snapshot().cart);

        let state = store.snapshot();
        assert_eq!(state.search_query, "tee");
        assert_eq!(state.checkout_items.len(), 1);
        assert_eq!(backend.write_count(), writes);
    }
}

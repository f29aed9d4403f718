//! Derived views over a [`StoreState`].
//!
//! Pure reads; nothing here touches the backend.

use vintage_core::{CartItem, Price, Product, ProductId, StoreProfile, User, WishlistEntry};

use crate::store::StoreState;

impl StoreState {
    #[must_use]
    pub fn all_products(&self) -> &[Product] {
        &self.products
    }

    #[must_use]
    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    /// Products matching the search query; all products when it is empty.
    #[must_use]
    pub fn search_results(&self) -> Vec<&Product> {
        self.products
            .iter()
            .filter(|product| product.matches(&self.search_query))
            .collect()
    }

    #[must_use]
    pub const fn current_user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    #[must_use]
    pub const fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    #[must_use]
    pub fn wishlist_items(&self) -> &[WishlistEntry] {
        &self.wishlist
    }

    #[must_use]
    pub fn wishlist_count(&self) -> usize {
        self.wishlist.len()
    }

    #[must_use]
    pub fn is_in_wishlist(&self, product_id: &ProductId) -> bool {
        self.wishlist
            .iter()
            .any(|entry| entry.product_id() == product_id)
    }

    #[must_use]
    pub fn cart_items(&self) -> &[CartItem] {
        &self.cart
    }

    /// Sum of price × quantity over the cart. Saturates instead of
    /// overflowing.
    #[must_use]
    pub fn cart_total_price(&self) -> Price {
        self.cart.iter().map(CartItem::line_total).sum()
    }

    /// Number of units in the cart (not lines).
    #[must_use]
    pub fn cart_item_count(&self) -> u64 {
        self.cart.iter().map(|item| u64::from(item.quantity)).sum()
    }

    #[must_use]
    pub const fn auth_ready(&self) -> bool {
        self.auth_ready
    }

    #[must_use]
    pub fn checkout_items(&self) -> &[CartItem] {
        &self.checkout_items
    }

    #[must_use]
    pub fn checkout_total(&self) -> Price {
        self.checkout_items.iter().map(CartItem::line_total).sum()
    }

    #[must_use]
    pub const fn user_store(&self) -> Option<&StoreProfile> {
        self.user_store.as_ref()
    }

    #[must_use]
    pub const fn has_store(&self) -> bool {
        self.user_store.is_some()
    }
}

#[cfg(test)]
mod tests {
    use vintage_core::Currency;

    use super::*;
    use crate::store::testing::{id, price, product};

    fn line(product_id: &str, unit_price: u64, quantity: u32) -> CartItem {
        CartItem {
            product: product(product_id, unit_price),
            quantity,
            added_at: None,
        }
    }

    #[test]
    fn test_cart_total_price() {
        let state = StoreState {
            cart: vec![line("a", 350_000, 2), line("b", 85_000, 1)],
            ..StoreState::default()
        };

        assert_eq!(state.cart_total_price(), price(785_000));
        assert_eq!(state.cart_total_price().display(Currency::IDR), "Rp 785.000");
        assert_eq!(state.cart_item_count(), 3);
    }

    #[test]
    fn test_cart_total_saturates() {
        let state = StoreState {
            cart: vec![line("a", u64::MAX, 2), line("b", 1, 1)],
            ..StoreState::default()
        };
        assert_eq!(state.cart_total_price(), price(u64::MAX));
    }

    #[test]
    fn test_empty_state_views() {
        let state = StoreState::default();
        assert!(!state.is_logged_in());
        assert!(!state.auth_ready());
        assert!(!state.has_store());
        assert_eq!(state.cart_total_price(), Price::ZERO);
        assert_eq!(state.wishlist_count(), 0);
        assert!(state.current_user().is_none());
    }

    #[test]
    fn test_wishlist_membership() {
        let state = StoreState {
            wishlist: vec![WishlistEntry {
                product: product("p1", 10),
                added_at: None,
            }],
            ..StoreState::default()
        };
        assert!(state.is_in_wishlist(&id("p1")));
        assert!(!state.is_in_wishlist(&id("p2")));
        assert_eq!(state.wishlist_items().len(), 1);
    }

    #[test]
    fn test_search_results() {
        let mut denim = product("p2", 10);
        denim.name = "Vintage Denim Jacket".to_string();
        let state = StoreState {
            products: vec![product("p1", 10), denim],
            search_query: "DENIM".to_string(),
            ..StoreState::default()
        };

        let results = state.search_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id.as_str(), "p2");

        let everything = StoreState {
            search_query: String::new(),
            ..state
        };
        assert_eq!(everything.search_results().len(), 2);
    }

    #[test]
    fn test_checkout_total() {
        let state = StoreState {
            checkout_items: vec![line("a", 120_000, 1), line("b", 40_000, 3)],
            ..StoreState::default()
        };
        assert_eq!(state.checkout_total(), price(240_000));
        assert_eq!(state.checkout_items().len(), 2);
    }
}

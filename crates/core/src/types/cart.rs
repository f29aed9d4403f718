//! Cart items and wishlist entries.
//!
//! Both are product snapshots taken when the shopper added them, so a later
//! catalog edit does not silently change what sits in a cart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Price, Product, ProductId};

/// A product in the shopper's cart.
///
/// Invariant: a cart holds at most one item per product id, and
/// `quantity >= 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(flatten)]
    pub product: Product,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

impl CartItem {
    /// A fresh cart line with quantity 1.
    #[must_use]
    pub const fn new(product: Product, added_at: DateTime<Utc>) -> Self {
        Self {
            product,
            quantity: 1,
            added_at: Some(added_at),
        }
    }

    /// Product id this line is keyed by.
    #[must_use]
    pub const fn product_id(&self) -> &ProductId {
        &self.product.id
    }

    /// Price × quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price.times(self.quantity)
    }
}

/// A product the shopper saved for later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistEntry {
    #[serde(flatten)]
    pub product: Product,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

impl WishlistEntry {
    #[must_use]
    pub const fn new(product: Product, added_at: DateTime<Utc>) -> Self {
        Self {
            product,
            added_at: Some(added_at),
        }
    }

    #[must_use]
    pub const fn product_id(&self) -> &ProductId {
        &self.product.id
    }
}

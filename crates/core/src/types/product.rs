//! Catalog products.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Price, ProductId};

/// Item condition as listed by the seller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Condition {
    /// Never worn, tags attached.
    New,
    /// Preloved.
    #[default]
    Second,
}

impl Condition {
    /// Label shown in listings.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Second => "Second",
        }
    }
}

/// A catalog item.
///
/// Field names follow the `products` collection documents. The `id` is the
/// document id; it is not stored inside the document itself but is kept in
/// cart and wishlist snapshots. Every other field tolerates absence, since
/// older snapshots were written with fewer fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: Price,
    #[serde(default)]
    pub categories: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub store_name: String,
    #[serde(default)]
    pub store_location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Whether the product matches a free-text search query.
    ///
    /// Matches case-insensitively against name, category, color, and the
    /// seller's store name. An empty (or whitespace) query matches everything.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }

        [
            &self.name,
            &self.categories,
            &self.color,
            &self.store_name,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
    }
}

//! The per-user profile document.
//!
//! One document per user in the `users` collection, keyed by uid. It holds
//! everything the storefront persists for a shopper: identity details, the
//! cart, the wishlist, an optional seller store, and an optional inlined
//! profile image.
//!
//! # Cart and wishlist layout
//!
//! Cart and wishlist are stored as maps keyed by product id:
//!
//! ```json
//! {
//!   "cart": { "p1": { "id": "p1", "name": "...", "quantity": 2, "addedAt": "..." } },
//!   "wishlist": { "p7": { "id": "p7", "name": "...", "addedAt": "..." } }
//! }
//! ```
//!
//! Keying by product id lets every write touch a single entry
//! (`cart.p1.quantity`) instead of re-sending the whole collection, and
//! enforces one entry per product at the storage level. Documents written
//! before the switch stored plain arrays; [`decode_entries`] reads both.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};

use super::{CartItem, ProductId, StoreProfile, UserId, WishlistEntry};

/// Collection holding profile documents.
pub const USERS_COLLECTION: &str = "users";
/// Collection holding catalog products.
pub const PRODUCTS_COLLECTION: &str = "products";

/// Field names inside a profile document.
pub mod fields {
    pub const CART: &str = "cart";
    pub const WISHLIST: &str = "wishlist";
    pub const STORE: &str = "store";
    pub const IMAGE_PROFILE: &str = "imageProfile";
    pub const QUANTITY: &str = "quantity";
}

/// Where a user's avatar comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ProfileImage {
    #[default]
    None,
    /// A remote image URL from the identity provider.
    Url(String),
    /// An image inlined as a `data:` URI in the profile document.
    Inline(String),
}

impl ProfileImage {
    /// Classify an image reference as stored by the backend.
    #[must_use]
    pub fn from_reference(reference: Option<&str>) -> Self {
        match reference.map(str::trim) {
            None | Some("") => Self::None,
            Some(r) if r.starts_with("data:") => Self::Inline(r.to_owned()),
            Some(r) => Self::Url(r.to_owned()),
        }
    }

    /// The reference a view would put in an `img` tag.
    #[must_use]
    pub fn as_src(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Url(s) | Self::Inline(s) => Some(s),
        }
    }

    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Entries keyed by product id.
pub trait Keyed {
    fn key(&self) -> &ProductId;
    fn order_hint(&self) -> Option<chrono::DateTime<chrono::Utc>>;

    /// Whether a decoded entry is fit to keep locally.
    fn is_usable(&self) -> bool {
        true
    }
}

impl Keyed for CartItem {
    fn key(&self) -> &ProductId {
        self.product_id()
    }

    fn order_hint(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.added_at
    }

    /// A line with quantity 0 is a removed line.
    fn is_usable(&self) -> bool {
        self.quantity >= 1
    }
}

impl Keyed for WishlistEntry {
    fn key(&self) -> &ProductId {
        self.product_id()
    }

    fn order_hint(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.added_at
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EntriesRepr {
    List(Vec<serde_json::Value>),
    Keyed(BTreeMap<String, serde_json::Value>),
}

/// A cart or wishlist field after decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEntries<T> {
    /// Usable entries, one per product id.
    pub entries: Vec<T>,
    /// Why each dropped entry was dropped, prefixed with its key or index.
    pub skipped: Vec<String>,
}

impl<T> Default for DecodedEntries<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Decode a cart or wishlist field in either the keyed or legacy list layout.
///
/// `null` decodes to an empty collection. Entries are decoded one by one: an
/// entry that does not decode, or that [`Keyed::is_usable`] rejects, is
/// dropped and listed in `skipped`. In the keyed layout an entry without an
/// `id` takes its map key, and entries come back in insertion order
/// (`addedAt`, then product id). The list layout keeps its stored order,
/// dropping any repeated product id after the first.
///
/// # Errors
///
/// Returns a `serde_json::Error` if the value is neither layout.
pub fn decode_entries<T>(
    value: &serde_json::Value,
) -> Result<DecodedEntries<T>, serde_json::Error>
where
    T: DeserializeOwned + Keyed,
{
    if value.is_null() {
        return Ok(DecodedEntries::default());
    }

    let mut skipped = Vec::new();
    let mut keep = |label: String, entry: serde_json::Value| match T::deserialize(entry) {
        Ok(item) if item.is_usable() => Some(item),
        Ok(_) => {
            skipped.push(format!("{label}: unusable entry"));
            None
        }
        Err(e) => {
            skipped.push(format!("{label}: {e}"));
            None
        }
    };

    let entries: Vec<T> = match EntriesRepr::deserialize(value)? {
        EntriesRepr::List(items) => items
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| keep(format!("[{index}]"), entry))
            .collect(),
        EntriesRepr::Keyed(map) => {
            // The map key is the product id; entries may omit it.
            let mut items: Vec<T> = map
                .into_iter()
                .filter_map(|(key, mut entry)| {
                    if let Some(fields) = entry.as_object_mut() {
                        fields
                            .entry("id")
                            .or_insert_with(|| serde_json::Value::String(key.clone()));
                    }
                    keep(key, entry)
                })
                .collect();
            items.sort_by(|a, b| {
                a.order_hint()
                    .cmp(&b.order_hint())
                    .then_with(|| a.key().cmp(b.key()))
            });
            items
        }
    };

    let mut seen = std::collections::HashSet::new();
    let entries = entries
        .into_iter()
        .filter(|entry| seen.insert(entry.key().clone()))
        .collect();
    Ok(DecodedEntries { entries, skipped })
}

fn serialize_keyed<S, T>(entries: &[T], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize + Keyed,
{
    serializer.collect_map(entries.iter().map(|e| (e.key().as_str(), e)))
}

/// The full profile document, as written at registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: UserId,
    #[serde(rename = "fullname")]
    pub full_name: String,
    pub username: String,
    pub email: String,
    #[serde(serialize_with = "serialize_keyed")]
    pub cart: Vec<CartItem>,
    #[serde(serialize_with = "serialize_keyed")]
    pub wishlist: Vec<WishlistEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreProfile>,
    pub image_profile: Option<String>,
}

impl UserProfile {
    /// A fresh profile: empty cart and wishlist, no store, no image.
    #[must_use]
    pub const fn new(uid: UserId, full_name: String, username: String, email: String) -> Self {
        Self {
            uid,
            full_name,
            username,
            email,
            cart: Vec::new(),
            wishlist: Vec::new(),
            store: None,
            image_profile: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_profile_image_classification() {
        assert_eq!(ProfileImage::from_reference(None), ProfileImage::None);
        assert_eq!(ProfileImage::from_reference(Some("  ")), ProfileImage::None);
        assert!(matches!(
            ProfileImage::from_reference(Some("https://lh3.example.com/a.png")),
            ProfileImage::Url(_)
        ));
        assert!(matches!(
            ProfileImage::from_reference(Some("data:image/png;base64,iVBOR")),
            ProfileImage::Inline(_)
        ));
    }

    #[test]
    fn test_new_profile_document_shape() {
        let profile = UserProfile::new(
            UserId::new("u1"),
            "Rina Wijaya".to_string(),
            "rina".to_string(),
            "rina@example.com".to_string(),
        );
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(
            value,
            json!({
                "uid": "u1",
                "fullname": "Rina Wijaya",
                "username": "rina",
                "email": "rina@example.com",
                "cart": {},
                "wishlist": {},
                "imageProfile": null
            })
        );
    }

    #[test]
    fn test_decode_keyed_entries_in_insertion_order() {
        let value = json!({
            "p9": {"id": "p9", "quantity": 1, "addedAt": "2025-01-01T00:00:00Z"},
            "p1": {"id": "p1", "quantity": 4, "addedAt": "2025-01-02T00:00:00Z"}
        });
        let cart: Vec<CartItem> = decode_entries(&value).unwrap().entries;
        let ids: Vec<_> = cart.iter().map(|c| c.product_id().as_str()).collect();
        assert_eq!(ids, ["p9", "p1"]);
        assert_eq!(cart[1].quantity, 4);
    }

    #[test]
    fn test_decode_keyed_entry_takes_id_from_key() {
        let value = json!({"p3": {"name": "Denim Jacket", "addedAt": "2025-01-01T00:00:00Z"}});
        let wishlist: Vec<WishlistEntry> = decode_entries(&value).unwrap().entries;
        assert_eq!(wishlist[0].product_id().as_str(), "p3");
        assert_eq!(wishlist[0].product.name, "Denim Jacket");
    }

    #[test]
    fn test_decode_legacy_list_entries() {
        let value = json!([{"id": "p2"}, {"id": "p1"}, {"id": "p2"}]);
        let wishlist: Vec<WishlistEntry> = decode_entries(&value).unwrap().entries;
        let ids: Vec<_> = wishlist.iter().map(|w| w.product_id().as_str()).collect();
        assert_eq!(ids, ["p2", "p1"]);
    }

    #[test]
    fn test_decode_null_and_garbage() {
        let empty = decode_entries::<CartItem>(&serde_json::Value::Null).unwrap();
        assert!(empty.entries.is_empty());
        assert!(empty.skipped.is_empty());
        assert!(decode_entries::<CartItem>(&json!("nope")).is_err());
    }

    #[test]
    fn test_decode_skips_bad_legacy_lines() {
        let value = json!([
            {"id": "p1", "quantity": 2},
            {"id": "p2", "quantity": -1},
            "not a line",
            {"id": "p3", "quantity": 1}
        ]);
        let cart = decode_entries::<CartItem>(&value).unwrap();

        let ids: Vec<_> = cart.entries.iter().map(|c| c.product_id().as_str()).collect();
        assert_eq!(ids, ["p1", "p3"]);
        assert_eq!(cart.entries[0].quantity, 2);
        assert_eq!(cart.skipped.len(), 2);
        assert!(cart.skipped[0].starts_with("[1]"));
    }

    #[test]
    fn test_decode_drops_zero_quantity_lines() {
        let value = json!({
            "p1": {"id": "p1", "quantity": 0},
            "p2": {"id": "p2", "quantity": 3}
        });
        let cart = decode_entries::<CartItem>(&value).unwrap();

        assert_eq!(cart.entries.len(), 1);
        assert_eq!(cart.entries[0].product_id().as_str(), "p2");
        assert_eq!(cart.skipped, ["p1: unusable entry"]);

        let legacy = decode_entries::<CartItem>(&json!([{"id": "p1", "quantity": 0}])).unwrap();
        assert!(legacy.entries.is_empty());
    }
}

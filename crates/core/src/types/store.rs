//! Seller store profiles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seller-facing metadata attached to a user profile.
///
/// Its presence on a profile means the user has an open shop. Fields the
/// client does not know about are carried through untouched so an older
/// client never strips data a newer one wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreProfile {
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StoreProfile {
    /// A new store with just a name and location.
    #[must_use]
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            description: None,
            phone: None,
            created_at: None,
            extra: serde_json::Map::new(),
        }
    }
}

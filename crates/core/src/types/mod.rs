//! Core types for Vintage Market.
//!
//! This module provides type-safe wrappers for the storefront's domain.

pub mod cart;
pub mod email;
pub mod id;
pub mod price;
pub mod product;
pub mod profile;
pub mod store;
pub mod user;

pub use cart::{CartItem, WishlistEntry};
pub use email::{Email, EmailError};
pub use id::*;
pub use price::{Currency, Price};
pub use product::{Condition, Product};
pub use profile::{
    DecodedEntries, Keyed, PRODUCTS_COLLECTION, ProfileImage, USERS_COLLECTION, UserProfile,
    decode_entries, fields,
};
pub use store::StoreProfile;
pub use user::User;

//! Vintage Market Core - Shared domain types.
//!
//! This crate provides the types shared by every Vintage Market component:
//! - `storefront` - Client state store and backend adapters
//! - `cli` - Command-line front end
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no HTTP
//! clients, no backend access. Everything here serializes to the exact field
//! names used by the persisted documents.
//!
//! # Modules
//!
//! - [`types`] - Ids, emails, prices, products, cart and wishlist entries,
//!   store profiles, and the per-user profile document

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

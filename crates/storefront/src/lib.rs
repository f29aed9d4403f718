//! Vintage Market storefront client.
//!
//! The state layer of the storefront: an [`AppStore`] that mirrors catalog,
//! cart, wishlist, user, and seller-store state locally and keeps it in sync
//! with a hosted backend, plus a [`SessionListener`] that follows the
//! identity provider's session.
//!
//! # Modules
//!
//! - [`backend`] - Identity and document-store traits with Firebase and
//!   in-memory implementations
//! - [`store`] - The application state store and its operations
//! - [`views`] - Derived views over a state snapshot
//! - [`session`] - Session listener
//! - [`config`] - Environment configuration
//! - [`error`] - Error types and Sentry helpers
//! - [`telemetry`] - Tracing and Sentry setup
//!
//! # Example
//!
//! ```rust,no_run
//! use vintage_storefront::{AppStore, SessionListener, StorefrontConfig, backend};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StorefrontConfig::from_env()?;
//! let store = AppStore::new(backend::connect(&config).await?);
//! let session = SessionListener::spawn(store.clone());
//! session.wait_until_ready().await;
//!
//! store.load_products().await?;
//! println!("{} products", store.snapshot().all_products().len());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod error;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod views;

pub use config::StorefrontConfig;
pub use error::{StoreError, SyncError, SyncErrorKind};
pub use session::{SessionListener, SessionState};
pub use store::{AppStore, MAX_CART_QUANTITY, MAX_PROFILE_IMAGE_BYTES, StoreState};

//! Catalog, cart, wishlist, and seller store commands.

use vintage_core::{Product, ProductId, StoreProfile};

use super::{CliError, Session};
use crate::output;

pub async fn products(session: &Session, search: Option<&str>) -> Result<(), CliError> {
    session.store.load_products().await?;
    if let Some(query) = search {
        session.store.set_search_query(query);
    }

    let state = session.store.snapshot();
    output::products(&state.search_results());
    Ok(())
}

pub fn cart_show(session: &Session) {
    let state = session.store.snapshot();
    output::cart(
        state.cart_items(),
        state.cart_total_price(),
        state.cart_item_count(),
    );
}

pub async fn cart_add(session: &Session, product_id: &str) -> Result<(), CliError> {
    session.require_user()?;
    let product = find_product(session, product_id).await?;

    session.store.add_to_cart(&product).await?;
    output::done(&format!("Added {} to your cart", product.name));
    Ok(())
}

pub async fn cart_remove(session: &Session, product_id: &str) -> Result<(), CliError> {
    session.require_user()?;
    session
        .store
        .remove_from_cart(&ProductId::new(product_id))
        .await?;
    output::done("Removed from your cart");
    Ok(())
}

pub async fn cart_set(session: &Session, product_id: &str, quantity: u32) -> Result<(), CliError> {
    session.require_user()?;
    session
        .store
        .update_cart_quantity(&ProductId::new(product_id), quantity)
        .await?;
    cart_show(session);
    Ok(())
}

pub fn wishlist_show(session: &Session) {
    output::wishlist(session.store.snapshot().wishlist_items());
}

pub async fn wishlist_toggle(session: &Session, product_id: &str) -> Result<(), CliError> {
    session.require_user()?;
    let product = find_product(session, product_id).await?;

    let added = session.store.toggle_wishlist(&product).await?;
    if added {
        output::done(&format!("Added {} to your wishlist", product.name));
    } else {
        output::done(&format!("Removed {} from your wishlist", product.name));
    }
    Ok(())
}

pub async fn store_open(
    session: &Session,
    name: String,
    location: String,
    description: Option<String>,
    phone: Option<String>,
) -> Result<(), CliError> {
    session.require_user()?;

    let mut store = StoreProfile::new(name, location);
    store.description = description;
    store.phone = phone;
    session.store.register_store(store).await?;

    output::store(session.store.snapshot().user_store());
    Ok(())
}

pub fn store_show(session: &Session) {
    output::store(session.store.snapshot().user_store());
}

/// Load the catalog and look up a product by id.
async fn find_product(session: &Session, product_id: &str) -> Result<Product, CliError> {
    session.store.load_products().await?;
    let wanted = ProductId::new(product_id);
    session
        .store
        .snapshot()
        .all_products()
        .iter()
        .find(|product| product.id == wanted)
        .cloned()
        .ok_or_else(|| CliError::UnknownProduct(product_id.to_string()))
}

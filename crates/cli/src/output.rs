//! Terminal output.

#![allow(clippy::print_stdout)]

use vintage_core::{CartItem, Currency, Product, StoreProfile, User, WishlistEntry};

const CURRENCY: Currency = Currency::IDR;

pub fn user(user: &User) {
    println!("{} <{}>", user.greeting_name(), user.email);
    println!("  uid: {}", user.uid);
    if let Some(src) = user.photo.as_src() {
        let shown: String = src.chars().take(60).collect();
        println!("  photo: {shown}");
    }
}

pub fn signed_out() {
    println!("Not signed in");
}

pub fn products(products: &[&Product]) {
    if products.is_empty() {
        println!("No products found");
        return;
    }
    for product in products {
        println!(
            "{:<24} {:<40} {:>14}  {}",
            product.id.as_str(),
            product.name,
            product.price.display(CURRENCY),
            product.condition.label()
        );
    }
}

pub fn cart(items: &[CartItem], total: vintage_core::Price, units: u64) {
    if items.is_empty() {
        println!("Your cart is empty");
        return;
    }
    for item in items {
        println!(
            "{:<24} {:<40} {:>4} x {:>14}",
            item.product.id.as_str(),
            item.product.name,
            item.quantity,
            item.product.price.display(CURRENCY)
        );
    }
    println!("{units} item(s), total {}", total.display(CURRENCY));
}

pub fn wishlist(entries: &[WishlistEntry]) {
    if entries.is_empty() {
        println!("Your wishlist is empty");
        return;
    }
    for entry in entries {
        println!("{:<24} {}", entry.product.id.as_str(), entry.product.name);
    }
}

pub fn store(store: Option<&StoreProfile>) {
    let Some(store) = store else {
        println!("You have not opened a store");
        return;
    };
    println!("{} ({})", store.name, store.location);
    if let Some(description) = &store.description {
        println!("  {description}");
    }
    if let Some(phone) = &store.phone {
        println!("  phone: {phone}");
    }
}

pub fn done(message: &str) {
    println!("{message}");
}

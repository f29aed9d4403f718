//! Vintage Market CLI - Shop from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Create an account (password from VINTAGE_PASSWORD or --password)
//! vm-cli register -e rina@example.com -n "Rina Wijaya" -u rina
//!
//! # Sign in; the session is kept in VINTAGE_SESSION_FILE
//! vm-cli login -e rina@example.com
//!
//! # Browse and shop
//! vm-cli products --search denim
//! vm-cli cart add abc123
//! vm-cli cart set abc123 2
//! vm-cli wishlist toggle abc123
//!
//! # Open a seller store
//! vm-cli store open --name "Toko Rina" --location Bandung
//! ```
//!
//! # Commands
//!
//! - `register` / `login` / `logout` / `whoami` - Account session
//! - `products` - List the catalog
//! - `cart` / `wishlist` - Manage the cart and wishlist
//! - `store` - Open or show a seller store
//! - `profile image` - Set the profile picture

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use secrecy::SecretString;

use vintage_storefront::config::LogFormat;
use vintage_storefront::telemetry;
use vintage_storefront::StorefrontConfig;

mod commands;
mod output;

use commands::CliError;

#[derive(Parser)]
#[command(name = "vm-cli")]
#[command(author, version, about = "Vintage Market storefront CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and sign in
    Register {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Full name, shown as the display name
        #[arg(short, long)]
        name: String,

        /// Username
        #[arg(short, long)]
        username: String,

        /// Password (at least 6 characters)
        #[arg(long, env = "VINTAGE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in
    Login {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password
        #[arg(long, env = "VINTAGE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List products
    Products {
        /// Only show products matching this text
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Manage the wishlist
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
    /// Manage your seller store
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
    /// Manage your profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart and its total
    Show,
    /// Add one of a product
    Add {
        /// Product id
        product_id: String,
    },
    /// Remove a product
    Remove {
        /// Product id
        product_id: String,
    },
    /// Set a product's quantity (0 removes it)
    Set {
        /// Product id
        product_id: String,
        /// New quantity
        quantity: u32,
    },
}

#[derive(Subcommand)]
enum WishlistAction {
    /// Show the wishlist
    Show,
    /// Add or remove a product
    Toggle {
        /// Product id
        product_id: String,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    /// Open a seller store
    Open {
        /// Store name
        #[arg(short, long)]
        name: String,

        /// City or area
        #[arg(short, long)]
        location: String,

        /// Short description
        #[arg(short, long)]
        description: Option<String>,

        /// Contact phone number
        #[arg(short, long)]
        phone: Option<String>,
    },
    /// Show your seller store
    Show,
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Set the profile picture from an image file
    Image {
        /// Path to a PNG, JPEG, GIF, or WebP file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            telemetry::init_tracing(LogFormat::default());
            tracing::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = telemetry::init_sentry(&config);
    telemetry::init_tracing(config.log_format);

    if let Err(e) = run(cli, &config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &StorefrontConfig) -> Result<(), CliError> {
    let session = commands::Session::start(config).await?;

    match cli.command {
        Commands::Register {
            email,
            name,
            username,
            password,
        } => {
            let password = SecretString::from(password);
            commands::account::register(&session, &email, &password, &name, &username).await?;
        }
        Commands::Login { email, password } => {
            commands::account::login(&session, &email, &SecretString::from(password)).await?;
        }
        Commands::Logout => commands::account::logout(&session).await?,
        Commands::Whoami => commands::account::whoami(&session),
        Commands::Profile {
            action: ProfileAction::Image { path },
        } => commands::account::profile_image(&session, &path).await?,
        Commands::Products { search } => {
            commands::shop::products(&session, search.as_deref()).await?;
        }
        Commands::Cart { action } => match action {
            CartAction::Show => commands::shop::cart_show(&session),
            CartAction::Add { product_id } => commands::shop::cart_add(&session, &product_id).await?,
            CartAction::Remove { product_id } => {
                commands::shop::cart_remove(&session, &product_id).await?;
            }
            CartAction::Set {
                product_id,
                quantity,
            } => commands::shop::cart_set(&session, &product_id, quantity).await?,
        },
        Commands::Wishlist { action } => match action {
            WishlistAction::Show => commands::shop::wishlist_show(&session),
            WishlistAction::Toggle { product_id } => {
                commands::shop::wishlist_toggle(&session, &product_id).await?;
            }
        },
        Commands::Store { action } => match action {
            StoreAction::Open {
                name,
                location,
                description,
                phone,
            } => {
                commands::shop::store_open(&session, name, location, description, phone).await?;
            }
            StoreAction::Show => commands::shop::store_show(&session),
        },
    }
    Ok(())
}

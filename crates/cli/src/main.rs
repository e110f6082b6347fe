//! Vitrine CLI - the catalog, the cart and the back office from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Company settings, once or as they change
//! vitrine settings show
//! vitrine settings watch
//!
//! # Browse the catalog
//! vitrine products list --category <uuid> --search cafe
//! vitrine search "pao de"
//!
//! # Cart of the signed-in user
//! vitrine --email ana@loja.com cart add <product-uuid> --quantity 2
//! vitrine --email ana@loja.com cart checkout --xlsx pedidos/
//!
//! # Back office
//! vitrine --email admin@loja.com admin dashboard
//! vitrine --email admin@loja.com admin users toggle-role <user-uuid>
//! ```
//!
//! # Environment Variables
//!
//! - `SUPABASE_URL`, `SUPABASE_ANON_KEY` - Backend project
//! - `VITRINE_EMAIL`, `VITRINE_PASSWORD` - Default credentials
//! - `SENTRY_DSN` - Optional error tracking
//!
//! Results are written to stdout as JSON; diagnostics go to the log.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use secrecy::SecretString;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vitrine_core::{CartItemId, CategoryId, ProductId, UserId};
use vitrine_storefront::AppContext;
use vitrine_storefront::config::StorefrontConfig;
use vitrine_storefront::navigation::History;

mod commands;
mod output;

use commands::CliError;

#[derive(Parser)]
#[command(name = "vitrine")]
#[command(author, version, about = "Vitrine catalog and back office")]
struct Cli {
    /// Sign in with this account before running the command
    #[arg(long, global = true, env = "VITRINE_EMAIL")]
    email: Option<String>,

    /// Password for `--email`
    #[arg(long, global = true, env = "VITRINE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Company settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Browse active products
    Products {
        #[command(subcommand)]
        action: ProductsAction,
    },
    /// Product suggestions for a search term
    Search {
        term: String,
    },
    /// Categories with their products
    Categories,
    /// Cart of the signed-in user
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Back office (admins only)
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the current settings
    Show,
    /// Print the settings state every time it changes, until Ctrl-C
    Watch,
}

#[derive(Subcommand)]
enum ProductsAction {
    /// List products, optionally by category and search term
    List {
        #[arg(long)]
        category: Option<CategoryId>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Featured products
    Featured,
    /// One product
    Show { id: ProductId },
}

#[derive(Subcommand)]
enum CartAction {
    /// Items and total
    List,
    /// Add a product, or more of it
    Add {
        product: ProductId,
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Remove a cart item
    Remove { item: CartItemId },
    /// Set the quantity of a cart item
    Set { item: CartItemId, quantity: u32 },
    /// Turn the cart into an order
    Checkout {
        /// Also save the order as a spreadsheet; a directory gets
        /// `Pedido_<number>.xlsx` inside it
        #[arg(long, value_name = "PATH")]
        xlsx: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Record counts
    Dashboard,
    /// Manage products
    Products {
        #[command(subcommand)]
        action: AdminProductsAction,
    },
    /// Manage users
    Users {
        #[command(subcommand)]
        action: AdminUsersAction,
    },
}

#[derive(Subcommand)]
enum AdminProductsAction {
    /// Every product, newest first
    List {
        /// Keep products whose name, code or barcode contains this
        #[arg(long)]
        search: Option<String>,
    },
    /// Flip a product's featured flag
    ToggleFeatured { id: ProductId },
}

#[derive(Subcommand)]
enum AdminUsersAction {
    /// Every user with their permissions
    List,
    /// Switch a user between admin and customer
    ToggleRole { id: UserId },
    /// Activate or deactivate a user
    ToggleActive { id: UserId },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = StorefrontConfig::from_env();

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "vitrine_cli=info,vitrine_storefront=info,vitrine_admin=info".into()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result = match config {
        Ok(config) => run(cli, &config).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            e.report();
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: &StorefrontConfig) -> Result<(), CliError> {
    let app = AppContext::from_config(config, Arc::new(History::default())).await;

    let result = match sign_in(&app, cli.email, cli.password).await {
        Ok(()) => dispatch(&app, cli.command).await,
        Err(e) => Err(e),
    };

    app.shutdown().await;
    result
}

async fn sign_in(
    app: &AppContext,
    email: Option<String>,
    password: Option<String>,
) -> Result<(), CliError> {
    let Some(email) = email else {
        return Ok(());
    };
    let password = password
        .map(SecretString::from)
        .ok_or(CliError::MissingPassword)?;
    app.session().sign_in(&email, &password).await?;
    Ok(())
}

async fn dispatch(app: &AppContext, command: Command) -> Result<(), CliError> {
    match command {
        Command::Settings { action } => match action {
            SettingsAction::Show => commands::settings::show(app).await,
            SettingsAction::Watch => commands::settings::watch(app).await,
        },
        Command::Products { action } => match action {
            ProductsAction::List { category, search } => {
                commands::catalog::list(app, category, search).await
            }
            ProductsAction::Featured => commands::catalog::featured(app).await,
            ProductsAction::Show { id } => commands::catalog::show(app, id).await,
        },
        Command::Search { term } => commands::catalog::search(app, &term).await,
        Command::Categories => commands::catalog::categories(app).await,
        Command::Cart { action } => match action {
            CartAction::List => commands::cart::list(app).await,
            CartAction::Add { product, quantity } => {
                commands::cart::add(app, product, quantity).await
            }
            CartAction::Remove { item } => commands::cart::remove(app, item).await,
            CartAction::Set { item, quantity } => {
                commands::cart::set_quantity(app, item, quantity).await
            }
            CartAction::Checkout { xlsx } => commands::cart::checkout(app, xlsx.as_deref()).await,
        },
        Command::Admin { action } => {
            let admin = vitrine_admin::AdminContext::new(app)?;
            match action {
                AdminAction::Dashboard => commands::admin::dashboard(&admin).await,
                AdminAction::Products { action } => match action {
                    AdminProductsAction::List { search } => {
                        commands::admin::products(&admin, search.as_deref()).await
                    }
                    AdminProductsAction::ToggleFeatured { id } => {
                        commands::admin::toggle_featured(&admin, id).await
                    }
                },
                AdminAction::Users { action } => match action {
                    AdminUsersAction::List => commands::admin::users(&admin).await,
                    AdminUsersAction::ToggleRole { id } => {
                        commands::admin::toggle_role(&admin, id).await
                    }
                    AdminUsersAction::ToggleActive { id } => {
                        commands::admin::toggle_active(&admin, id).await
                    }
                },
            }
        }
    }
}

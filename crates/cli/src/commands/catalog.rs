//! `vitrine products`, `vitrine search` and `vitrine categories`.

use serde_json::json;
use vitrine_core::{CategoryId, ProductId};
use vitrine_storefront::AppContext;
use vitrine_storefront::services::{ProductFilter, search_suggestions};

use super::CliError;
use crate::output;

pub async fn list(
    app: &AppContext,
    category: Option<CategoryId>,
    search: Option<String>,
) -> Result<(), CliError> {
    let listing = app
        .catalog()
        .products(&ProductFilter { category, search })
        .await?;
    output::json(&json!({
        "category": listing.category_name,
        "products": listing.products,
    }))
}

pub async fn featured(app: &AppContext) -> Result<(), CliError> {
    output::json(&app.catalog().featured_products().await?)
}

pub async fn show(app: &AppContext, id: ProductId) -> Result<(), CliError> {
    output::json(&app.catalog().product(id).await?)
}

pub async fn search(app: &AppContext, term: &str) -> Result<(), CliError> {
    output::json(&search_suggestions(app.backend().as_ref(), term).await?)
}

pub async fn categories(app: &AppContext) -> Result<(), CliError> {
    output::json(&app.catalog().categories().await?)
}

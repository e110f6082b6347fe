//! `vitrine cart`. Every subcommand needs a signed-in user.

use std::path::Path;

use serde_json::json;
use vitrine_core::{CartItemId, ProductId};
use vitrine_storefront::{AppContext, AppError};

use super::CliError;
use crate::output;

/// Items plus the total, which is `null` while prices are hidden.
pub async fn list(app: &AppContext) -> Result<(), CliError> {
    let cart = app.cart();
    let items = cart.items().await?;
    let total = cart.display_total(&items);
    output::json(&json!({ "items": items, "total": total }))
}

pub async fn add(app: &AppContext, product: ProductId, quantity: u32) -> Result<(), CliError> {
    app.cart().add(product, quantity).await?;
    tracing::info!(product_id = %product, quantity, "Added to cart");
    list(app).await
}

pub async fn remove(app: &AppContext, item: CartItemId) -> Result<(), CliError> {
    app.cart().remove(item).await?;
    list(app).await
}

pub async fn set_quantity(
    app: &AppContext,
    item: CartItemId,
    quantity: u32,
) -> Result<(), CliError> {
    app.cart().set_quantity(item, quantity).await?;
    list(app).await
}

/// Place the order; with `xlsx`, also save it as a spreadsheet.
pub async fn checkout(app: &AppContext, xlsx: Option<&Path>) -> Result<(), CliError> {
    let summary = app.cart().checkout().await?;
    tracing::info!(order_number = summary.order_number, "Order placed");

    if let Some(path) = xlsx {
        if app.settings().settings().is_none() {
            app.settings().reload().await.map_err(AppError::from)?;
        }
        let export = app.cart().export_order(&summary)?;
        let is_dir = tokio::fs::metadata(path)
            .await
            .is_ok_and(|metadata| metadata.is_dir());
        let target = if is_dir {
            path.join(&export.file_name)
        } else {
            path.to_path_buf()
        };
        tokio::fs::write(&target, &export.bytes).await?;
        tracing::info!(path = %target.display(), "Order exported");
    }
    output::json(&summary)
}

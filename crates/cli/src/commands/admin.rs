//! `vitrine admin`.
//!
//! Toggles read the current value first, then flip it.

use serde_json::json;
use vitrine_admin::AdminContext;
use vitrine_admin::products::filter;
use vitrine_core::{ProductId, UserId};

use super::CliError;
use crate::output;

pub async fn dashboard(admin: &AdminContext) -> Result<(), CliError> {
    output::json(&admin.dashboard().await?)
}

pub async fn products(admin: &AdminContext, search: Option<&str>) -> Result<(), CliError> {
    let products = admin.products().list().await?;
    match search {
        Some(term) => output::json(&filter(&products, term)),
        None => output::json(&products),
    }
}

pub async fn toggle_featured(admin: &AdminContext, id: ProductId) -> Result<(), CliError> {
    let product = admin.app().catalog().product(id).await?;
    let featured = admin.products().toggle_featured(id, product.featured).await?;
    output::json(&json!({ "id": id, "featured": featured }))
}

pub async fn users(admin: &AdminContext) -> Result<(), CliError> {
    output::json(&admin.users().list().await?)
}

pub async fn toggle_role(admin: &AdminContext, id: UserId) -> Result<(), CliError> {
    let users = admin.users();
    let profile = users.profile(id).await?;
    let role = users.toggle_role(id, profile.role).await?;
    output::json(&json!({ "id": id, "role": role.as_str() }))
}

pub async fn toggle_active(admin: &AdminContext, id: UserId) -> Result<(), CliError> {
    let users = admin.users();
    let profile = users.profile(id).await?;
    let active = users.toggle_active(id, profile.active).await?;
    output::json(&json!({ "id": id, "active": active }))
}

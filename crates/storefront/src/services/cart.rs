//! Shopping cart and checkout for the signed-in user.
//!
//! Adding a product reads the current quantity and upserts the sum on
//! `(user_id, product_id)`. Two concurrent adds of the same product can
//! therefore lose one increment; the backend offers no atomic increment.

use std::sync::Arc;

use chrono::Local;
use serde::Deserialize;
use tracing::{info, instrument};
use vitrine_core::{
    CartItem, CartItemId, CartLine, NewOrder, NewOrderItem, Order, OrderSummary, Price, ProductId,
    UserId,
};

use crate::backend::{
    Backend, BackendError, Embed, Filter, Query, decode_row, decode_rows, encode_row, tables,
};
use super::order_export::{self, OrderExport};
use crate::error::{Action, ActionContext, AppError, Result};
use crate::session::SessionManager;
use crate::settings::CompanySettingsStore;

/// Message shown when a quantity below one is entered.
pub const INVALID_QUANTITY: &str = "A quantidade deve ser no mínimo 1";

/// Message shown when checking out an empty cart.
pub const EMPTY_CART: &str = "Seu carrinho está vazio";

/// Message shown when exporting before the company settings are loaded.
pub const SETTINGS_UNAVAILABLE: &str = "Configurações da empresa indisponíveis";

#[derive(Deserialize)]
struct StoredQuantity {
    quantity: u32,
}

/// Cart operations on behalf of the current session.
#[derive(Clone)]
pub struct CartService {
    backend: Arc<dyn Backend>,
    session: SessionManager,
    settings: CompanySettingsStore,
}

impl CartService {
    #[must_use]
    pub fn new(
        backend: Arc<dyn Backend>,
        session: SessionManager,
        settings: CompanySettingsStore,
    ) -> Self {
        Self {
            backend,
            session,
            settings,
        }
    }

    /// The user's cart lines with their products.
    ///
    /// # Errors
    ///
    /// Returns an error when signed out or if the backend query fails.
    #[instrument(skip(self))]
    pub async fn items(&self) -> Result<Vec<CartItem>> {
        let user = self.session.require_user()?;
        self.load_items(user.id, Action::LoadCart).await
    }

    /// Add `quantity` units of a product, merging with any existing line.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Invalid`] for a zero quantity, and an error when
    /// signed out or if a backend call fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add(&self, product_id: ProductId, quantity: u32) -> Result<()> {
        if quantity < 1 {
            return Err(AppError::Invalid(INVALID_QUANTITY.to_owned()));
        }
        let user = self.session.require_user()?;

        let existing = Query::table(tables::CART_ITEMS)
            .columns(["quantity"])
            .eq("user_id", user.id.to_string())
            .eq("product_id", product_id.to_string());
        let rows = self.backend.select(&existing).await.during(Action::AddToCart)?;
        let current = match rows.into_iter().next() {
            Some(row) => decode_row::<StoredQuantity>(row).during(Action::AddToCart)?.quantity,
            None => 0,
        };

        let line = CartLine {
            user_id: user.id,
            product_id,
            quantity: current.saturating_add(quantity),
        };
        let row = encode_row(&line).during(Action::AddToCart)?;
        self.backend
            .upsert(tables::CART_ITEMS, row, CartLine::CONFLICT_COLUMNS)
            .await
            .during(Action::AddToCart)?;

        info!(quantity = line.quantity, "Cart line updated");
        Ok(())
    }

    /// Replace the quantity of a cart line.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Invalid`] for a zero quantity without contacting
    /// the backend, and an error if the update fails.
    #[instrument(skip(self), fields(item_id = %item))]
    pub async fn set_quantity(&self, item: CartItemId, quantity: u32) -> Result<()> {
        if quantity < 1 {
            return Err(AppError::Invalid(INVALID_QUANTITY.to_owned()));
        }
        self.backend
            .update(
                tables::CART_ITEMS,
                serde_json::json!({ "quantity": quantity }),
                &[Filter::eq("id", item.to_string())],
            )
            .await
            .during(Action::UpdateQuantity)
    }

    /// Delete a cart line.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    #[instrument(skip(self), fields(item_id = %item))]
    pub async fn remove(&self, item: CartItemId) -> Result<()> {
        self.backend
            .delete(tables::CART_ITEMS, &[Filter::eq("id", item.to_string())])
            .await
            .during(Action::RemoveFromCart)
    }

    /// Turn the cart into a completed order and empty it.
    ///
    /// Order items are priced at the products' current prices.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Invalid`] for an empty cart, and an error when
    /// signed out or if any backend call fails. A failure after the order row
    /// was written leaves that order in place.
    #[instrument(skip(self))]
    pub async fn checkout(&self) -> Result<OrderSummary> {
        let user = self.session.require_user()?;
        let items = self.load_items(user.id, Action::FinalizeOrder).await?;
        if items.is_empty() {
            return Err(AppError::Invalid(EMPTY_CART.to_owned()));
        }
        let total = CartItem::total(&items);

        let order_row =
            encode_row(&NewOrder::completed(user.id, total)).during(Action::FinalizeOrder)?;
        let order: Order = self
            .backend
            .insert(tables::ORDERS, order_row)
            .await
            .and_then(|rows| rows.into_iter().next().ok_or(BackendError::NotFound))
            .and_then(decode_row::<Order>)
            .during(Action::FinalizeOrder)?;

        let order_items: Vec<NewOrderItem> = items
            .iter()
            .map(|item| NewOrderItem::from_cart(order.id, item))
            .collect();
        let rows = encode_row(&order_items).during(Action::FinalizeOrder)?;
        self.backend
            .insert(tables::ORDER_ITEMS, rows)
            .await
            .during(Action::FinalizeOrder)?;

        self.backend
            .delete(tables::CART_ITEMS, &[Filter::eq("user_id", user.id.to_string())])
            .await
            .during(Action::FinalizeOrder)?;

        info!(order_number = order.order_number, total = %total, "Order placed");
        Ok(OrderSummary {
            order_number: order.order_number,
            items,
            total,
            date: Local::now().date_naive(),
        })
    }

    /// Spreadsheet of a placed order, headed with the company's details.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Invalid`] while the company settings are not
    /// loaded, and [`AppError::Export`] if the workbook cannot be written.
    pub fn export_order(&self, summary: &OrderSummary) -> Result<OrderExport> {
        let company = self
            .settings
            .settings()
            .ok_or_else(|| AppError::Invalid(SETTINGS_UNAVAILABLE.to_owned()))?;
        order_export::export_order(summary, &company)
    }

    /// Total to display for `items`, or `None` while prices are hidden.
    #[must_use]
    pub fn display_total(&self, items: &[CartItem]) -> Option<Price> {
        self.settings
            .prices_visible()
            .then(|| CartItem::total(items))
    }

    /// Lines whose product no longer exists are left out.
    async fn load_items(&self, user: UserId, action: Action) -> Result<Vec<CartItem>> {
        let query = Query::table(tables::CART_ITEMS)
            .columns(["id", "quantity"])
            .embed(
                Embed::to_one(tables::PRODUCTS, "product_id")
                    .alias("product")
                    .columns(["id", "name", "code", "description", "image_url", "price"])
                    .inner(),
            )
            .eq("user_id", user.to_string());
        let rows = self.backend.select(&query).await.during(action)?;
        decode_rows(rows).during(action)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;
    use vitrine_core::Role;

    use super::*;
    use crate::backend::memory::Fault;
    use crate::backend::{DataBackend, MemoryBackend};
    use crate::navigation::History;
    use crate::session::SessionOptions;
    use crate::settings::{LoadStatus, RetryPolicy};

    const CAFE: &str = "3f6a9e12-7c4b-4d1e-8a25-0b9c6d4e2f01";
    const PAO: &str = "3f6a9e12-7c4b-4d1e-8a25-0b9c6d4e2f02";

    fn backend(show_prices: bool) -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.add_user("cliente@loja.com", "s3nh4-forte", Role::Customer);
        backend.seed(
            tables::PRODUCTS,
            [
                json!({"id": CAFE, "code": "CAF", "name": "Café", "description": "", "price": 20.5, "active": true}),
                json!({"id": PAO, "code": "PAO", "name": "Pão", "description": "", "price": 1.25, "active": true}),
            ],
        );
        backend.seed(
            tables::COMPANY_SETTINGS,
            [json!({"name": "Loja", "cnpj": "1", "address": "Rua A", "show_prices": show_prices})],
        );
        backend
    }

    async fn cart(backend: &MemoryBackend, signed_in: bool) -> CartService {
        let shared: Arc<dyn Backend> = Arc::new(backend.clone());
        let session = SessionManager::start(
            shared.clone(),
            Arc::new(History::default()),
            SessionOptions::default(),
        )
        .await;
        if signed_in {
            session
                .sign_in("cliente@loja.com", &SecretString::from("s3nh4-forte"))
                .await
                .unwrap();
        }
        let settings = CompanySettingsStore::start(shared.clone(), RetryPolicy::default()).await;
        settings
            .watch()
            .wait_for(|state| state.status == LoadStatus::Loaded)
            .await
            .unwrap();
        CartService::new(shared, session, settings)
    }

    #[tokio::test]
    async fn test_add_merges_quantities() {
        let backend = backend(true);
        let cart = cart(&backend, true).await;

        cart.add(CAFE.parse().unwrap(), 2).await.unwrap();
        cart.add(CAFE.parse().unwrap(), 3).await.unwrap();
        cart.add(PAO.parse().unwrap(), 1).await.unwrap();

        let items = cart.items().await.unwrap();
        assert_eq!(items.len(), 2);
        let cafe = items.iter().find(|item| item.product.name == "Café").unwrap();
        assert_eq!(cafe.quantity, 5);
        assert_eq!(backend.rows(tables::CART_ITEMS).len(), 2);
    }

    #[tokio::test]
    async fn test_lines_of_deleted_products_are_skipped() {
        let backend = backend(true);
        let cart = cart(&backend, true).await;
        cart.add(CAFE.parse().unwrap(), 2).await.unwrap();
        cart.add(PAO.parse().unwrap(), 1).await.unwrap();

        backend
            .delete(tables::PRODUCTS, &[Filter::eq("id", CAFE)])
            .await
            .unwrap();

        let items = cart.items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product.name, "Pão");
        assert_eq!(CartItem::total(&items), Price::from_cents(125));
    }

    #[tokio::test]
    async fn test_zero_quantity_is_rejected_locally() {
        let backend = backend(true);
        let cart = cart(&backend, true).await;
        backend.fail(Fault::Write(tables::CART_ITEMS.to_owned()), 1);

        let err = cart.set_quantity(CartItemId::new(), 0).await.unwrap_err();
        assert_eq!(err.user_message(), INVALID_QUANTITY);
        // The armed failure was not consumed.
        let err = cart.set_quantity(CartItemId::new(), 1).await.unwrap_err();
        assert_eq!(err.action(), Some(Action::UpdateQuantity));

        assert!(matches!(
            cart.add(CAFE.parse().unwrap(), 0).await,
            Err(AppError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_set_quantity_and_remove() {
        let backend = backend(true);
        let cart = cart(&backend, true).await;
        cart.add(CAFE.parse().unwrap(), 1).await.unwrap();
        let item = cart.items().await.unwrap()[0].id;

        cart.set_quantity(item, 4).await.unwrap();
        assert_eq!(cart.items().await.unwrap()[0].quantity, 4);

        cart.remove(item).await.unwrap();
        assert!(cart.items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_records_order_and_clears_cart() {
        let backend = backend(true);
        let cart = cart(&backend, true).await;
        cart.add(CAFE.parse().unwrap(), 2).await.unwrap();
        cart.add(PAO.parse().unwrap(), 4).await.unwrap();

        let summary = cart.checkout().await.unwrap();
        assert_eq!(summary.order_number, 1);
        assert_eq!(summary.total, Price::from_cents(4600));
        assert_eq!(summary.items.len(), 2);

        let orders = backend.rows(tables::ORDERS);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0]["status"], "completed");
        assert_eq!(backend.rows(tables::ORDER_ITEMS).len(), 2);
        assert!(backend.rows(tables::CART_ITEMS).is_empty());
    }

    #[tokio::test]
    async fn test_placed_order_exports_as_workbook() {
        let backend = backend(true);
        let cart = cart(&backend, true).await;
        cart.add(PAO.parse().unwrap(), 2).await.unwrap();
        let summary = cart.checkout().await.unwrap();

        let export = cart.export_order(&summary).unwrap();
        assert_eq!(export.file_name, "Pedido_1.xlsx");
        // xlsx files are zip archives.
        assert!(export.bytes.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn test_checkout_empty_cart() {
        let backend = backend(true);
        let cart = cart(&backend, true).await;
        let err = cart.checkout().await.unwrap_err();
        assert_eq!(err.user_message(), EMPTY_CART);
        assert!(backend.rows(tables::ORDERS).is_empty());
    }

    #[tokio::test]
    async fn test_checkout_failure_keeps_cart() {
        let backend = backend(true);
        let cart = cart(&backend, true).await;
        cart.add(PAO.parse().unwrap(), 1).await.unwrap();
        backend.fail(Fault::Write(tables::ORDERS.to_owned()), 1);

        let err = cart.checkout().await.unwrap_err();
        assert_eq!(err.user_message(), "Erro ao finalizar pedido");
        assert_eq!(backend.rows(tables::CART_ITEMS).len(), 1);
    }

    #[tokio::test]
    async fn test_signed_out_cart_is_rejected() {
        let backend = backend(true);
        let cart = cart(&backend, false).await;
        let err = cart.items().await.unwrap_err();
        assert_eq!(err.user_message(), "Usuário não autenticado");
    }

    #[tokio::test]
    async fn test_total_hidden_with_prices() {
        let backend = backend(false);
        let cart = cart(&backend, true).await;
        cart.add(CAFE.parse().unwrap(), 1).await.unwrap();
        let items = cart.items().await.unwrap();
        assert_eq!(cart.display_total(&items), None);
    }

    #[tokio::test]
    async fn test_total_shown_with_prices() {
        let backend = backend(true);
        let cart = cart(&backend, true).await;
        cart.add(CAFE.parse().unwrap(), 1).await.unwrap();
        let items = cart.items().await.unwrap();
        assert_eq!(cart.display_total(&items), Some(Price::from_cents(2050)));
    }
}

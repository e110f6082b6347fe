//! End-to-end tests for Vitrine.
//!
//! The storefront and back-office services run unmodified over the
//! in-process backend, so every flow (sign-in, browsing, cart, checkout,
//! admin edits) is exercised without a hosted project.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p vitrine-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `session_flow` - Sign-in, sign-out, registration and route guards
//! - `settings_store` - Company settings loading and live updates
//! - `cart_checkout` - Cart edits and checkout
//! - `admin_products` - Back-office product and category edits

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::json;
use vitrine_core::{Role, UserId};
use vitrine_storefront::backend::{MemoryBackend, tables};
use vitrine_storefront::navigation::History;
use vitrine_storefront::session::SessionUser;
use vitrine_storefront::{AppContext, AppOptions};

pub const ADMIN_EMAIL: &str = "admin@lojaazul.com.br";
pub const CUSTOMER_EMAIL: &str = "ana@exemplo.com";
pub const PASSWORD: &str = "s3nh4-forte";

/// Fixed ids of the seeded catalog.
pub mod ids {
    pub const SETTINGS: &str = "0b7f3f4e-5c1d-4e7a-9a51-2d6c8f1e0a42";
    pub const BEBIDAS: &str = "8d1e4c0a-2b7f-4f3a-9c61-5e2d7a9b1c01";
    pub const PADARIA: &str = "8d1e4c0a-2b7f-4f3a-9c61-5e2d7a9b1c02";
    pub const CAFE: &str = "3f6a9e12-7c4b-4d1e-8a25-0b9c6d4e2f01";
    pub const SUCO: &str = "3f6a9e12-7c4b-4d1e-8a25-0b9c6d4e2f02";
    pub const PAO: &str = "3f6a9e12-7c4b-4d1e-8a25-0b9c6d4e2f03";
    pub const BOLO: &str = "3f6a9e12-7c4b-4d1e-8a25-0b9c6d4e2f04";
}

/// Backend holding a small shop: settings, two categories, four products
/// (one inactive), an admin and a customer.
#[must_use]
pub fn seeded_backend() -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend.seed(
        tables::COMPANY_SETTINGS,
        [json!({
            "id": ids::SETTINGS,
            "name": "Loja Azul",
            "cnpj": "12.345.678/0001-90",
            "address": "Rua A, 1",
            "logo_url": "",
            "show_prices": true,
        })],
    );
    backend.seed(
        tables::CATEGORIES,
        [
            json!({"id": ids::BEBIDAS, "name": "Bebidas", "slug": "bebidas", "featured": true}),
            json!({"id": ids::PADARIA, "name": "Padaria", "slug": "padaria"}),
        ],
    );
    backend.seed(
        tables::PRODUCTS,
        [
            json!({"id": ids::CAFE, "code": "BEB-1", "name": "Cafe Torrado", "barcode": "7891000", "price": 18.5, "category_id": ids::BEBIDAS, "featured": true, "active": true}),
            json!({"id": ids::SUCO, "code": "BEB-2", "name": "Suco de Uva", "price": 9.5, "category_id": ids::BEBIDAS, "active": true}),
            json!({"id": ids::PAO, "code": "PAD-1", "name": "Pao de Queijo", "price": 12, "category_id": ids::PADARIA, "active": true}),
            json!({"id": ids::BOLO, "code": "PAD-2", "name": "Bolo de Milho", "price": 25, "category_id": ids::PADARIA, "featured": true, "active": false}),
        ],
    );
    backend.add_user(ADMIN_EMAIL, PASSWORD, Role::Admin);
    backend.add_user(CUSTOMER_EMAIL, PASSWORD, Role::Customer);
    backend
}

/// A running application over a memory backend.
pub struct TestApp {
    pub backend: MemoryBackend,
    pub history: Arc<History>,
    pub app: AppContext,
}

impl TestApp {
    pub async fn start(backend: MemoryBackend) -> Self {
        let history = Arc::new(History::default());
        let app = AppContext::start(
            Arc::new(backend.clone()),
            history.clone(),
            AppOptions::default(),
        )
        .await;
        Self {
            backend,
            history,
            app,
        }
    }

    /// Seeded shop, nobody signed in.
    pub async fn seeded() -> Self {
        Self::start(seeded_backend()).await
    }

    pub async fn sign_in(&self, email: &str) -> SessionUser {
        self.app
            .session()
            .sign_in(email, &password())
            .await
            .unwrap()
    }

    /// Id of a seeded account.
    #[must_use]
    pub fn user_id(&self, email: &str) -> UserId {
        self.backend
            .rows(tables::PROFILES)
            .into_iter()
            .find(|row| row["username"] == email)
            .and_then(|row| serde_json::from_value(row["id"].clone()).ok())
            .unwrap()
    }

    /// Wait for the settings store's first load.
    pub async fn settings_loaded(&self) {
        self.app
            .settings()
            .watch()
            .wait_for(|state| state.settings.is_some())
            .await
            .unwrap();
    }
}

#[must_use]
pub fn password() -> SecretString {
    SecretString::from(PASSWORD)
}

//! Vitrine back office.
//!
//! Services behind the admin pages. Access is checked once, when an
//! [`AdminContext`] is created from the storefront's
//! [`AppContext`](vitrine_storefront::AppContext); every service handed out
//! by the context acts on behalf of that admin.
//!
//! - [`users`] - Profiles, roles and permission grants
//! - [`products`] - Product CRUD and product images
//! - [`categories`] - Category CRUD
//! - [`settings`] - Company settings editor
//! - [`dashboard`] - Record counts

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod categories;
pub mod dashboard;
pub mod products;
pub mod settings;
pub mod uploads;
pub mod users;

use std::sync::Arc;

use tracing::info;
use vitrine_storefront::backend::Backend;
use vitrine_storefront::session::SessionUser;
use vitrine_storefront::{AppContext, Result};

pub use categories::{CategoryAdmin, CategoryDraft};
pub use dashboard::DashboardStats;
pub use products::ProductAdmin;
pub use settings::SettingsEditor;
pub use uploads::Upload;
pub use users::{NewUser, UserAdmin, UserUpdate};

/// An admin session over the storefront context.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AdminContext {
    inner: Arc<AdminContextInner>,
}

struct AdminContextInner {
    app: AppContext,
    admin: SessionUser,
}

impl AdminContext {
    /// Open the back office for the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns a session error when nobody is signed in ("Usuário não
    /// autenticado") or the user is not an admin ("Acesso não autorizado").
    pub fn new(app: &AppContext) -> Result<Self> {
        let admin = app.session().require_admin()?;
        info!(user_id = %admin.id, "Back office opened");
        Ok(Self {
            inner: Arc::new(AdminContextInner {
                app: app.clone(),
                admin,
            }),
        })
    }

    /// The admin acting through this context.
    #[must_use]
    pub fn admin(&self) -> &SessionUser {
        &self.inner.admin
    }

    #[must_use]
    pub fn app(&self) -> &AppContext {
        &self.inner.app
    }

    #[must_use]
    pub fn users(&self) -> UserAdmin {
        UserAdmin::new(self.clone())
    }

    #[must_use]
    pub fn products(&self) -> ProductAdmin {
        ProductAdmin::new(self.clone())
    }

    #[must_use]
    pub fn categories(&self) -> CategoryAdmin {
        CategoryAdmin::new(self.clone())
    }

    #[must_use]
    pub fn settings(&self) -> SettingsEditor {
        SettingsEditor::new(self.clone())
    }

    /// Exact counts for the dashboard cards.
    ///
    /// # Errors
    ///
    /// Returns an error if any count fails.
    pub async fn dashboard(&self) -> Result<DashboardStats> {
        dashboard::load(self.backend()).await
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.inner.app.backend().as_ref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testing {
    use std::sync::Arc;

    use secrecy::SecretString;
    use vitrine_core::Role;
    use vitrine_storefront::backend::MemoryBackend;
    use vitrine_storefront::navigation::History;
    use vitrine_storefront::{AppContext, AppOptions};

    use super::AdminContext;

    pub const ADMIN_EMAIL: &str = "admin@loja.com";
    pub const PASSWORD: &str = "s3nh4-forte";

    /// Context signed in as `email`, who is created with `role`.
    pub async fn app_as(backend: &MemoryBackend, email: &str, role: Role) -> AppContext {
        backend.add_user(email, PASSWORD, role);
        let app = AppContext::start(
            Arc::new(backend.clone()),
            Arc::new(History::default()),
            AppOptions::default(),
        )
        .await;
        app.session()
            .sign_in(email, &SecretString::from(PASSWORD))
            .await
            .unwrap();
        app
    }

    pub async fn admin(backend: &MemoryBackend) -> AdminContext {
        let app = app_as(backend, ADMIN_EMAIL, Role::Admin).await;
        AdminContext::new(&app).unwrap()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use vitrine_core::Role;
    use vitrine_storefront::backend::MemoryBackend;
    use vitrine_storefront::navigation::History;
    use vitrine_storefront::{AppContext, AppOptions};

    use super::*;

    #[tokio::test]
    async fn test_admin_context_requires_admin() {
        let backend = MemoryBackend::new();
        let app = testing::app_as(&backend, "cliente@loja.com", Role::Customer).await;
        let err = AdminContext::new(&app).err().unwrap();
        assert_eq!(err.user_message(), "Acesso não autorizado");
    }

    #[tokio::test]
    async fn test_admin_context_requires_session() {
        let backend = MemoryBackend::new();
        let app = AppContext::start(
            Arc::new(backend),
            Arc::new(History::default()),
            AppOptions::default(),
        )
        .await;
        let err = AdminContext::new(&app).err().unwrap();
        assert_eq!(err.user_message(), "Usuário não autenticado");
    }

    #[tokio::test]
    async fn test_admin_context_for_admin() {
        let backend = MemoryBackend::new();
        let admin = testing::admin(&backend).await;
        assert_eq!(admin.admin().email.as_deref(), Some(testing::ADMIN_EMAIL));
    }
}

//! Application context shared by every view.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::backend::{Backend, SupabaseBackend};
use crate::config::StorefrontConfig;
use crate::navigation::Navigator;
use crate::services::{CartService, CatalogService, DebouncedSearch};
use crate::session::{SessionManager, SessionOptions};
use crate::settings::{CompanySettingsStore, RetryPolicy};

/// Knobs taken from [`StorefrontConfig`] that the context needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppOptions {
    pub session: SessionOptions,
    pub settings_retry: RetryPolicy,
    pub product_bucket: String,
    pub company_bucket: String,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            session: SessionOptions::default(),
            settings_retry: RetryPolicy::default(),
            product_bucket: "product-images".to_owned(),
            company_bucket: "company-assets".to_owned(),
        }
    }
}

impl From<&StorefrontConfig> for AppOptions {
    fn from(config: &StorefrontConfig) -> Self {
        Self {
            session: SessionOptions {
                resolve_role_on_restore: config.resolve_role_on_restore,
            },
            settings_retry: config.settings_retry,
            product_bucket: config.product_bucket.clone(),
            company_bucket: config.company_bucket.clone(),
        }
    }
}

/// Session, company settings and catalog services over one backend.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppContext {
    inner: Arc<AppContextInner>,
}

struct AppContextInner {
    backend: Arc<dyn Backend>,
    session: SessionManager,
    settings: CompanySettingsStore,
    catalog: CatalogService,
    options: AppOptions,
}

impl AppContext {
    /// Restore the session and start the settings store.
    ///
    /// Returns once the session is known; settings keep loading in the
    /// background.
    #[instrument(skip_all)]
    pub async fn start(
        backend: Arc<dyn Backend>,
        navigator: Arc<dyn Navigator>,
        options: AppOptions,
    ) -> Self {
        let session = SessionManager::start(backend.clone(), navigator, options.session).await;
        let settings = CompanySettingsStore::start(backend.clone(), options.settings_retry).await;
        let catalog = CatalogService::new(backend.clone());

        info!(signed_in = session.user().is_some(), "Application context ready");

        Self {
            inner: Arc::new(AppContextInner {
                backend,
                session,
                settings,
                catalog,
                options,
            }),
        }
    }

    /// Start against the hosted project named in `config`.
    pub async fn from_config(config: &StorefrontConfig, navigator: Arc<dyn Navigator>) -> Self {
        let backend: Arc<dyn Backend> = Arc::new(SupabaseBackend::new(&config.supabase));
        Self::start(backend, navigator, AppOptions::from(config)).await
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    #[must_use]
    pub fn settings(&self) -> &CompanySettingsStore {
        &self.inner.settings
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn options(&self) -> &AppOptions {
        &self.inner.options
    }

    /// Cart of whoever is signed in when each call is made.
    #[must_use]
    pub fn cart(&self) -> CartService {
        CartService::new(
            self.inner.backend.clone(),
            self.inner.session.clone(),
            self.inner.settings.clone(),
        )
    }

    /// A new debounced search box.
    #[must_use]
    pub fn search(&self) -> DebouncedSearch {
        DebouncedSearch::spawn(self.inner.backend.clone())
    }

    /// Stop following auth events and leave the settings change feed.
    pub async fn shutdown(&self) {
        self.inner.session.shutdown();
        self.inner.settings.shutdown().await;
    }
}

//! Dashboard counts.

use serde::Serialize;
use tracing::instrument;
use vitrine_storefront::backend::{Backend, tables};
use vitrine_storefront::error::{Action, ActionContext, Result};

/// Exact row counts shown on the dashboard cards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub users: u64,
    pub products: u64,
    pub categories: u64,
    pub orders: u64,
}

#[instrument(skip_all)]
pub(crate) async fn load(backend: &dyn Backend) -> Result<DashboardStats> {
    let (users, products, categories, orders) = tokio::try_join!(
        backend.count(tables::PROFILES),
        backend.count(tables::PRODUCTS),
        backend.count(tables::CATEGORIES),
        backend.count(tables::ORDERS),
    )
    .during(Action::LoadDashboard)?;

    Ok(DashboardStats {
        users,
        products,
        categories,
        orders,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use vitrine_storefront::backend::MemoryBackend;
    use vitrine_storefront::backend::memory::Fault;

    use crate::testing;

    use super::*;

    #[tokio::test]
    async fn test_counts() {
        let backend = MemoryBackend::new();
        backend.seed(
            tables::CATEGORIES,
            [json!({"name": "Bebidas"}), json!({"name": "Padaria"})],
        );
        backend.seed(tables::PRODUCTS, [json!({"name": "Café", "price": 10})]);
        let admin = testing::admin(&backend).await;

        let stats = admin.dashboard().await.unwrap();
        assert_eq!(
            stats,
            DashboardStats {
                users: 1,
                products: 1,
                categories: 2,
                orders: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_count_failure() {
        let backend = MemoryBackend::new();
        let admin = testing::admin(&backend).await;
        backend.fail(Fault::Select(tables::CATEGORIES.to_owned()), 1);

        let err = admin.dashboard().await.unwrap_err();
        assert_eq!(err.user_message(), "Erro ao carregar dados do dashboard");
    }
}

//! Category management.
//!
//! Writes drop the catalog's cached name for the category so product lists
//! show the new name right away.

use serde_json::json;
use tracing::{info, instrument};
use vitrine_core::{Category, CategoryId, slugify};
use vitrine_storefront::backend::{Backend, Direction, Filter, Query, decode_rows, tables};
use vitrine_storefront::error::{Action, ActionContext, AppError, Result};

use crate::AdminContext;

/// Category form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryDraft {
    pub name: String,
    pub description: String,
    pub featured: bool,
}

impl CategoryDraft {
    fn row(&self) -> serde_json::Value {
        json!({
            "name": self.name.trim(),
            "slug": slugify(&self.name),
            "description": self.description,
            "featured": self.featured,
        })
    }
}

/// Category administration.
pub struct CategoryAdmin {
    ctx: AdminContext,
}

impl CategoryAdmin {
    pub(crate) const fn new(ctx: AdminContext) -> Self {
        Self { ctx }
    }

    fn backend(&self) -> &dyn Backend {
        self.ctx.backend()
    }

    /// Every category by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Category>> {
        let query = Query::table(tables::CATEGORIES).order("name", Direction::Asc);
        let rows = self
            .backend()
            .select(&query)
            .await
            .during(Action::LoadCategories)?;
        decode_rows(rows).during(Action::LoadCategories)
    }

    /// Insert (`id` is `None`) or update a category.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Invalid`] without a name, and an error if the
    /// write fails.
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn save(&self, id: Option<CategoryId>, draft: &CategoryDraft) -> Result<()> {
        if draft.name.trim().is_empty() {
            return Err(AppError::Invalid("Nome é obrigatório".to_owned()));
        }

        match id {
            Some(id) => {
                self.backend()
                    .update(
                        tables::CATEGORIES,
                        draft.row(),
                        &[Filter::eq("id", id.to_string())],
                    )
                    .await
                    .during(Action::SaveCategory)?;
                self.ctx.app().catalog().invalidate_category(id).await;
                info!(category_id = %id, "Category updated");
            }
            None => {
                self.backend()
                    .insert(tables::CATEGORIES, draft.row())
                    .await
                    .during(Action::SaveCategory)?;
                info!("Category created");
            }
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    #[instrument(skip(self), fields(category_id = %id))]
    pub async fn delete(&self, id: CategoryId) -> Result<()> {
        self.backend()
            .delete(tables::CATEGORIES, &[Filter::eq("id", id.to_string())])
            .await
            .during(Action::DeleteCategory)?;
        self.ctx.app().catalog().invalidate_category(id).await;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vitrine_storefront::backend::MemoryBackend;
    use vitrine_storefront::services::ProductFilter;

    use super::*;
    use crate::testing;

    const PADARIA: &str = "8d1e4c0a-2b7f-4f3a-9c61-5e2d7a9b1c05";

    fn draft(name: &str) -> CategoryDraft {
        CategoryDraft {
            name: name.to_owned(),
            ..CategoryDraft::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_list_with_slug() {
        let backend = MemoryBackend::new();
        let admin = testing::admin(&backend).await;
        let categories = admin.categories();

        categories.save(None, &draft("Pães e Bolos")).await.unwrap();
        categories.save(None, &draft("Bebidas")).await.unwrap();

        let listed = categories.list().await.unwrap();
        let names: Vec<&str> = listed.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Bebidas", "Pães e Bolos"]);
        assert_eq!(listed[1].slug.as_deref(), Some("paes-e-bolos"));
    }

    #[tokio::test]
    async fn test_rename_invalidates_cached_name() {
        let backend = MemoryBackend::new();
        backend.seed(tables::CATEGORIES, [json!({"id": PADARIA, "name": "Padaria"})]);
        let admin = testing::admin(&backend).await;
        let id: CategoryId = PADARIA.parse().unwrap();
        let catalog = admin.app().catalog();
        let filter = ProductFilter {
            category: Some(id),
            search: None,
        };

        let before = catalog.products(&filter).await.unwrap();
        assert_eq!(before.category_name.as_deref(), Some("Padaria"));

        admin.categories().save(Some(id), &draft("Confeitaria")).await.unwrap();
        let after = catalog.products(&filter).await.unwrap();
        assert_eq!(after.category_name.as_deref(), Some("Confeitaria"));
    }

    #[tokio::test]
    async fn test_delete_and_validation() {
        let backend = MemoryBackend::new();
        backend.seed(tables::CATEGORIES, [json!({"id": PADARIA, "name": "Padaria"})]);
        let admin = testing::admin(&backend).await;
        let categories = admin.categories();

        let err = categories.save(None, &draft(" ")).await.unwrap_err();
        assert_eq!(err.user_message(), "Nome é obrigatório");

        categories.delete(PADARIA.parse().unwrap()).await.unwrap();
        assert!(categories.list().await.unwrap().is_empty());
    }
}

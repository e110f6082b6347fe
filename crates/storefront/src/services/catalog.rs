//! Product browsing.
//!
//! Category names looked up for the product list are cached in memory with a
//! 5 minute TTL; admin writes to `categories` invalidate them.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use vitrine_core::{CategoryId, CategoryWithProducts, Product, ProductId};

use crate::backend::{
    Backend, BackendError, Direction, Embed, Query, decode_row, decode_rows, tables,
};
use crate::error::{Action, ActionContext, AppError, Result};

/// Columns matched by the product search box.
pub const SEARCH_COLUMNS: [&str; 4] = ["code", "name", "barcode", "description"];

/// Filters for the product list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub category: Option<CategoryId>,
    pub search: Option<String>,
}

/// Product list plus the name of the category it was filtered by.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductListing {
    pub products: Vec<Product>,
    pub category_name: Option<String>,
}

#[derive(Deserialize)]
struct CategoryName {
    name: String,
}

/// Read-only catalog queries.
#[derive(Clone)]
pub struct CatalogService {
    backend: Arc<dyn Backend>,
    category_names: Cache<CategoryId, String>,
}

impl CatalogService {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let category_names = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            backend,
            category_names,
        }
    }

    /// Active featured products, by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    #[instrument(skip(self))]
    pub async fn featured_products(&self) -> Result<Vec<Product>> {
        let query = Query::table(tables::PRODUCTS)
            .eq("featured", true)
            .eq("active", true)
            .order("name", Direction::Asc);
        let rows = self.backend.select(&query).await.during(Action::LoadFeatured)?;
        decode_rows(rows).during(Action::LoadFeatured)
    }

    /// Active products that belong to a category, by name.
    ///
    /// Optionally restricted to one category and to products whose code,
    /// name, barcode or description contains the search term.
    ///
    /// # Errors
    ///
    /// Returns an error if the product query fails. A failed category-name
    /// lookup only leaves `category_name` empty.
    #[instrument(skip(self))]
    pub async fn products(&self, filter: &ProductFilter) -> Result<ProductListing> {
        let mut query = Query::table(tables::PRODUCTS)
            .embed(
                Embed::to_one(tables::CATEGORIES, "category_id")
                    .columns(["name"])
                    .inner(),
            )
            .eq("active", true);

        let mut category_name = None;
        if let Some(category) = filter.category {
            query = query.eq("category_id", category.to_string());
            category_name = match self.category_name(category).await {
                Ok(name) => name,
                Err(e) => {
                    warn!(category_id = %category, error = %e, "Category name lookup failed");
                    None
                }
            };
        }

        if let Some(term) = filter.search.as_deref().map(str::trim)
            && !term.is_empty()
        {
            query = query.search(SEARCH_COLUMNS, term);
        }

        let rows = self
            .backend
            .select(&query.order("name", Direction::Asc))
            .await
            .during(Action::LoadProducts)?;
        let products: Vec<Product> = decode_rows(rows).during(Action::LoadProducts)?;
        debug!(count = products.len(), "Loaded products");

        Ok(ProductListing {
            products,
            category_name,
        })
    }

    /// One product by id.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown id and a backend error if
    /// the query fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: ProductId) -> Result<Product> {
        let query = Query::table(tables::PRODUCTS).eq("id", id.to_string());
        match self.backend.select_single(&query).await {
            Ok(row) => decode_row(row).during(Action::LoadProduct),
            Err(BackendError::NotFound) => {
                Err(AppError::NotFound("Produto não encontrado".to_owned()))
            }
            Err(e) => Err(e).during(Action::LoadProduct),
        }
    }

    /// Every category with its products, by category name.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<CategoryWithProducts>> {
        let query = Query::table(tables::CATEGORIES)
            .embed(
                Embed::to_many(tables::PRODUCTS, "category_id")
                    .columns(["id", "name", "image_url"]),
            )
            .order("name", Direction::Asc);
        let rows = self.backend.select(&query).await.during(Action::LoadCategories)?;
        decode_rows(rows).during(Action::LoadCategories)
    }

    /// Name of a category, served from the cache when possible.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup query fails.
    pub async fn category_name(
        &self,
        id: CategoryId,
    ) -> std::result::Result<Option<String>, BackendError> {
        if let Some(name) = self.category_names.get(&id).await {
            debug!("Cache hit for category name");
            return Ok(Some(name));
        }

        let query = Query::table(tables::CATEGORIES)
            .columns(["name"])
            .eq("id", id.to_string());
        let name = match self.backend.select_single(&query).await {
            Ok(row) => decode_row::<CategoryName>(row)?.name,
            Err(BackendError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };

        self.category_names.insert(id, name.clone()).await;
        Ok(Some(name))
    }

    /// Forget a cached category name after the category changed.
    pub async fn invalidate_category(&self, id: CategoryId) {
        self.category_names.invalidate(&id).await;
    }
}

//! Product management and product images.

use tracing::{info, instrument};
use vitrine_core::{Product, ProductDraft, ProductId};
use vitrine_storefront::backend::{Backend, Direction, Embed, Filter, Query, decode_rows, tables};
use vitrine_storefront::error::{Action, ActionContext, AppError, Result};

use crate::AdminContext;
use crate::uploads::{Upload, object_path, product_image_path};

/// Message shown when the product form is incomplete.
pub const MISSING_FIELDS: &str = "Código e nome são obrigatórios";

/// Product administration.
pub struct ProductAdmin {
    ctx: AdminContext,
}

impl ProductAdmin {
    pub(crate) const fn new(ctx: AdminContext) -> Self {
        Self { ctx }
    }

    fn backend(&self) -> &dyn Backend {
        self.ctx.backend()
    }

    fn bucket(&self) -> &str {
        &self.ctx.app().options().product_bucket
    }

    /// Every product, newest first, with its category when it has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Product>> {
        let query = Query::table(tables::PRODUCTS)
            .embed(Embed::to_one(tables::CATEGORIES, "category_id").columns(["id", "name"]))
            .order("created_at", Direction::Desc);
        let rows = self.backend().select(&query).await.during(Action::LoadProducts)?;
        decode_rows(rows).during(Action::LoadProducts)
    }

    /// Insert a new product (`id` is `None`) or update an existing one. The
    /// slug is derived from the name; new products start active.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Invalid`] without a code or name, and an error if
    /// the write fails.
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn save(&self, id: Option<ProductId>, draft: &ProductDraft) -> Result<()> {
        if draft.code.trim().is_empty() || draft.name.trim().is_empty() {
            return Err(AppError::Invalid(MISSING_FIELDS.to_owned()));
        }

        match id {
            Some(id) => {
                self.backend()
                    .update(
                        tables::PRODUCTS,
                        draft.update_row(),
                        &[Filter::eq("id", id.to_string())],
                    )
                    .await
                    .during(Action::SaveProduct)?;
                info!(product_id = %id, "Product updated");
            }
            None => {
                self.backend()
                    .insert(tables::PRODUCTS, draft.insert_row())
                    .await
                    .during(Action::SaveProduct)?;
                info!("Product created");
            }
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete(&self, id: ProductId) -> Result<()> {
        self.backend()
            .delete(tables::PRODUCTS, &[Filter::eq("id", id.to_string())])
            .await
            .during(Action::DeleteProduct)
    }

    /// Flip `featured`; returns the new value.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn toggle_featured(&self, id: ProductId, featured: bool) -> Result<bool> {
        let next = !featured;
        self.backend()
            .update(
                tables::PRODUCTS,
                serde_json::json!({ "featured": next }),
                &[Filter::eq("id", id.to_string())],
            )
            .await
            .during(Action::ToggleFeatured)?;
        Ok(next)
    }

    /// Store a product image under `products/` and return its public URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    #[instrument(skip(self, upload), fields(file = %upload.file_name))]
    pub async fn upload_image(&self, upload: Upload) -> Result<String> {
        let path = product_image_path(&upload);
        self.backend()
            .upload(self.bucket(), &path, upload.bytes, &upload.content_type)
            .await
            .during(Action::UploadImage)?;
        info!(path = %path, "Product image uploaded");
        Ok(self.backend().public_url(self.bucket(), &path))
    }

    /// Delete the stored object behind a product image URL. A URL without a
    /// file name is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    #[instrument(skip(self))]
    pub async fn remove_image(&self, image_url: &str) -> Result<()> {
        let Some(path) = object_path(image_url, "products") else {
            return Ok(());
        };
        self.backend()
            .remove(self.bucket(), &[path])
            .await
            .during(Action::RemoveImage)
    }
}

/// Products whose name, code or barcode contains `term`, ignoring case.
#[must_use]
pub fn filter<'a>(products: &'a [Product], term: &str) -> Vec<&'a Product> {
    products.iter().filter(|product| product.matches(term)).collect()
}

//! Catalog, cart and order records.
//!
//! Field names follow the backend columns so rows decode directly from the
//! JSON the data API returns, embedded relations included.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::de::null_as_default;
use super::id::{CartItemId, CategoryId, OrderId, ProductId, UserId};
use super::price::Price;
use super::slug::slugify;

// =============================================================================
// Products
// =============================================================================

/// Category name embedded in a product row (`categories(id, name)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    #[serde(default)]
    pub id: Option<CategoryId>,
    pub name: String,
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub price: Price,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Embedded category, present when the query joined `categories`.
    #[serde(default, rename = "categories", skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryRef>,
}

impl Product {
    /// Case-insensitive match on name, code or barcode.
    #[must_use]
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&term)
            || self.code.to_lowercase().contains(&term)
            || self
                .barcode
                .as_deref()
                .is_some_and(|barcode| barcode.to_lowercase().contains(&term))
    }
}

const fn default_true() -> bool {
    true
}

/// Search suggestion row (`id, code, name, description, barcode`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: ProductId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub code: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub barcode: Option<String>,
}

/// Product preview embedded in a category (`products(id, name, image_url)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductThumbnail {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Product form submitted from the back office.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    pub code: String,
    pub name: String,
    pub description: String,
    pub barcode: String,
    pub price: Price,
    pub image_url: Option<String>,
    pub category_id: Option<CategoryId>,
    pub featured: bool,
}

impl ProductDraft {
    /// Start a draft from an existing product, for editing.
    #[must_use]
    pub fn from_product(product: &Product) -> Self {
        Self {
            code: product.code.clone(),
            name: product.name.clone(),
            description: product.description.clone(),
            barcode: product.barcode.clone().unwrap_or_default(),
            price: product.price,
            image_url: product.image_url.clone(),
            category_id: product.category_id,
            featured: product.featured,
        }
    }

    /// Slug derived from the product name.
    #[must_use]
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    /// Columns written on update.
    #[must_use]
    pub fn update_row(&self) -> JsonValue {
        serde_json::json!({
            "code": self.code,
            "name": self.name,
            "slug": self.slug(),
            "description": self.description,
            "barcode": self.barcode,
            "price": self.price,
            "image_url": self.image_url,
            "category_id": self.category_id,
            "featured": self.featured,
        })
    }

    /// Columns written on insert; new products start active.
    #[must_use]
    pub fn insert_row(&self) -> JsonValue {
        let mut row = self.update_row();
        if let JsonValue::Object(map) = &mut row {
            map.insert("active".to_owned(), JsonValue::Bool(true));
        }
        row
    }
}

// =============================================================================
// Categories
// =============================================================================

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub featured: bool,
}

/// Category together with its products (`*, products(id, name, image_url)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryWithProducts {
    #[serde(flatten)]
    pub category: Category,
    #[serde(default, deserialize_with = "null_as_default")]
    pub products: Vec<ProductThumbnail>,
}

// =============================================================================
// Cart
// =============================================================================

/// Product fields shown on a cart line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartProduct {
    pub id: ProductId,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub price: Price,
}

/// A cart row with its product embedded (`id, quantity, product:products(...)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub quantity: u32,
    pub product: CartProduct,
}

impl CartItem {
    /// Price times quantity.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.product.price.times(self.quantity)
    }

    /// Sum of the line subtotals.
    #[must_use]
    pub fn total(items: &[Self]) -> Price {
        items.iter().map(Self::subtotal).sum()
    }
}

/// Row upserted into `cart_items`, unique on `(user_id, product_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CartLine {
    /// Conflict target for the cart upsert.
    pub const CONFLICT_COLUMNS: &'static str = "user_id,product_id";
}

// =============================================================================
// Orders
// =============================================================================

/// Row inserted into `orders` at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub total_amount: Price,
    pub status: String,
}

impl NewOrder {
    /// Status recorded for orders finalized from the cart.
    pub const COMPLETED: &'static str = "completed";

    #[must_use]
    pub fn completed(user_id: UserId, total_amount: Price) -> Self {
        Self {
            user_id,
            total_amount,
            status: Self::COMPLETED.to_owned(),
        }
    }
}

/// An `orders` row as returned after insert.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: i64,
    pub user_id: UserId,
    pub total_amount: Price,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Row inserted into `order_items`, priced at checkout time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Price,
}

impl NewOrderItem {
    #[must_use]
    pub const fn from_cart(order_id: OrderId, item: &CartItem) -> Self {
        Self {
            order_id,
            product_id: item.product.id,
            quantity: item.quantity,
            price: item.product.price,
        }
    }
}

/// Receipt shown after a successful checkout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSummary {
    pub order_number: i64,
    pub items: Vec<CartItem>,
    pub total: Price,
    pub date: NaiveDate,
}

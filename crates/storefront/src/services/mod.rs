//! Catalog, search and cart services used by the storefront views.
//!
//! # Services
//!
//! - [`catalog`] - Featured products, product list and details, categories
//! - [`search`] - Search-box suggestions with a debounced runner
//! - [`cart`] - Cart lines and checkout for the signed-in user
//! - [`order_export`] - Spreadsheet copy of a placed order

pub mod cart;
pub mod catalog;
pub mod order_export;
pub mod search;

pub use cart::CartService;
pub use catalog::{CatalogService, ProductFilter, ProductListing};
pub use order_export::{OrderExport, export_order};
pub use search::{DebouncedSearch, SearchResults, search_suggestions};

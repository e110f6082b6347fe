//! Core types for Vitrine.
//!
//! This module provides type-safe wrappers and records for the catalog domain.

pub mod catalog;
mod de;
pub mod email;
pub mod id;
pub mod price;
pub mod profile;
pub mod role;
pub mod settings;
pub mod slug;

pub use catalog::{
    CartItem, CartLine, CartProduct, Category, CategoryRef, CategoryWithProducts, NewOrder,
    NewOrderItem, Order, OrderSummary, Product, ProductDraft, ProductSummary, ProductThumbnail,
};
pub use email::{Email, EmailError};
pub use id::*;
pub use price::{Price, format_brl};
pub use profile::{Permission, Profile, ProfileRole, UserWithPermissions};
pub use role::{Role, RoleParseError};
pub use settings::{
    CompanySettings, CompanySettingsRecord, DEFAULT_COMPANY_NAME, Footer, SettingsPatch, Theme,
};
pub use slug::slugify;

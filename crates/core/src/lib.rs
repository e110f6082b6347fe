//! Vitrine Core - Shared domain types.
//!
//! This crate provides the types shared by every Vitrine component:
//! - `storefront` - Session, company settings and catalog/cart services
//! - `admin` - Administrative back office services
//! - `cli` - Command-line front end
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no backend
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere, including in tests that never touch the network.
//!
//! # Modules
//!
//! - [`types`] - Typed ids, emails, prices, roles, company settings and
//!   catalog records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

//! Vitrine Storefront library.
//!
//! Everything a storefront front end needs besides rendering:
//!
//! - [`backend`] - Hosted backend boundary with Supabase and in-memory
//!   implementations
//! - [`session`] - Current user, role and sign-in/out/registration
//! - [`settings`] - Live company settings with automatic reloads
//! - [`navigation`] - Routes and the access guard in front of them
//! - [`services`] - Catalog, search and cart
//! - [`state`] - [`AppContext`](state::AppContext) tying them together

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod error;
pub mod navigation;
pub mod services;
pub mod session;
pub mod settings;
pub mod state;

pub use error::{AppError, Result};
pub use state::{AppContext, AppOptions};

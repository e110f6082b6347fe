//! Hosted backend boundary.
//!
//! Everything the catalog persists or authenticates goes through these
//! traits: auth, table reads/writes, blob storage and row-change
//! subscriptions. [`SupabaseBackend`] talks to a hosted Supabase project
//! over HTTP and WebSocket; [`MemoryBackend`] keeps everything in process for
//! tests and local runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use vitrine_storefront::backend::{DataBackend, Query, decode_rows, tables};
//!
//! let rows = backend
//!     .select(&Query::table(tables::CATEGORIES).order("name", Direction::Asc))
//!     .await?;
//! let categories: Vec<Category> = decode_rows(rows)?;
//! ```

mod auth;
mod error;
pub mod memory;
mod query;
mod realtime;
pub mod supabase;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use vitrine_core::Email;

pub use auth::{AuthChangeEvent, AuthEventKind, AuthSession, AuthSubscription, AuthUser};
pub use error::BackendError;
pub use memory::MemoryBackend;
pub use query::{
    Direction, Embed, Filter, Join, OrderBy, Pattern, Query, compare_values, tables,
};
pub use realtime::{ChangeEvent, ChangeFilter, ChangeKind, ChannelHandle, RealtimeChannel};
pub use supabase::SupabaseBackend;

/// Authentication service.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// The current session, if any. Absence is not an error.
    async fn get_session(&self) -> Result<Option<AuthSession>, BackendError>;

    /// Subscribe to auth-state transitions.
    fn on_auth_state_change(&self) -> AuthSubscription;

    /// Password sign-in. Rejected credentials are
    /// [`BackendError::InvalidCredentials`].
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError>;

    /// Create an account; `metadata` is stored as the user's metadata.
    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
        metadata: JsonValue,
    ) -> Result<AuthUser, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;
}

/// Table reads and writes.
#[async_trait]
pub trait DataBackend: Send + Sync {
    async fn select(&self, query: &Query) -> Result<Vec<JsonValue>, BackendError>;

    /// Exactly one row: [`BackendError::NotFound`] on zero rows,
    /// [`BackendError::MultipleRows`] on more.
    async fn select_single(&self, query: &Query) -> Result<JsonValue, BackendError> {
        let mut rows = self.select(query).await?;
        match rows.len() {
            0 => Err(BackendError::NotFound),
            1 => Ok(rows.remove(0)),
            n => Err(BackendError::MultipleRows(n)),
        }
    }

    /// Exact row count of a table.
    async fn count(&self, table: &str) -> Result<u64, BackendError>;

    /// Insert one row (object) or many (array); returns the stored rows.
    async fn insert(&self, table: &str, rows: JsonValue) -> Result<Vec<JsonValue>, BackendError>;

    async fn update(
        &self,
        table: &str,
        patch: JsonValue,
        filters: &[Filter],
    ) -> Result<(), BackendError>;

    /// Insert or merge on the comma-separated `on_conflict` columns.
    async fn upsert(
        &self,
        table: &str,
        row: JsonValue,
        on_conflict: &str,
    ) -> Result<(), BackendError>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), BackendError>;
}

/// Blob storage.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError>;

    /// Public URL of an object. Does not check that the object exists.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), BackendError>;
}

/// Row-change subscriptions.
#[async_trait]
pub trait RealtimeBackend: Send + Sync {
    async fn channel(
        &self,
        name: &str,
        filter: ChangeFilter,
    ) -> Result<RealtimeChannel, BackendError>;

    async fn remove_channel(&self, handle: &ChannelHandle) -> Result<(), BackendError>;
}

/// The whole backend surface.
pub trait Backend: AuthBackend + DataBackend + StorageBackend + RealtimeBackend {}

impl<T> Backend for T where T: AuthBackend + DataBackend + StorageBackend + RealtimeBackend {}

/// Decode selected rows into typed records.
///
/// # Errors
///
/// Returns [`BackendError::Parse`] if any row does not match `T`.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<JsonValue>) -> Result<Vec<T>, BackendError> {
    Ok(serde_json::from_value(JsonValue::Array(rows))?)
}

/// Decode one selected row.
///
/// # Errors
///
/// Returns [`BackendError::Parse`] if the row does not match `T`.
pub fn decode_row<T: DeserializeOwned>(row: JsonValue) -> Result<T, BackendError> {
    Ok(serde_json::from_value(row)?)
}

/// Encode a record as a row (or array of rows) for writing.
///
/// # Errors
///
/// Returns [`BackendError::Parse`] if `value` cannot be represented as JSON.
pub fn encode_row<T: Serialize>(value: &T) -> Result<JsonValue, BackendError> {
    Ok(serde_json::to_value(value)?)
}

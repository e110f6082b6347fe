//! Deserialization helpers for nullable backend columns.

use serde::{Deserialize, Deserializer};

/// Read a nullable column, mapping `null` to the type's default.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

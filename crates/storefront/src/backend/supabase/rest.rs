//! `/rest/v1` table access.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument};

use super::{SupabaseBackend, check_response};
use crate::backend::{BackendError, DataBackend, Filter, Query};

/// Parse the total from a `Content-Range` header (`0-9/42` or `*/42`).
fn total_from_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.parse().ok()
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters.iter().map(Filter::to_param).collect()
}

impl SupabaseBackend {
    fn rest_url(&self, table: &str) -> String {
        self.url(&format!("rest/v1/{table}"))
    }
}

#[async_trait]
impl DataBackend for SupabaseBackend {
    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn select(&self, query: &Query) -> Result<Vec<JsonValue>, BackendError> {
        let response = self
            .request(Method::GET, &self.rest_url(&query.table))
            .await?
            .query(&query.to_params())
            .send()
            .await?;
        let rows: Vec<JsonValue> = check_response(response).await?.json().await?;
        debug!(rows = rows.len(), "Selected rows");
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn count(&self, table: &str) -> Result<u64, BackendError> {
        let response = self
            .request(Method::HEAD, &self.rest_url(table))
            .await?
            .query(&[("select", "*")])
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = check_response(response).await?;
        response
            .headers()
            .get("content-range")
            .and_then(|value| value.to_str().ok())
            .and_then(total_from_content_range)
            .ok_or_else(|| BackendError::api(response.status().as_u16(), "missing row count"))
    }

    #[instrument(skip(self, rows))]
    async fn insert(&self, table: &str, rows: JsonValue) -> Result<Vec<JsonValue>, BackendError> {
        let response = self
            .request(Method::POST, &self.rest_url(table))
            .await?
            .header("Prefer", "return=representation")
            .json(&rows)
            .send()
            .await?;
        Ok(check_response(response).await?.json().await?)
    }

    #[instrument(skip(self, patch, filters))]
    async fn update(
        &self,
        table: &str,
        patch: JsonValue,
        filters: &[Filter],
    ) -> Result<(), BackendError> {
        let response = self
            .request(Method::PATCH, &self.rest_url(table))
            .await?
            .query(&filter_params(filters))
            .header("Prefer", "return=minimal")
            .json(&patch)
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    #[instrument(skip(self, row))]
    async fn upsert(
        &self,
        table: &str,
        row: JsonValue,
        on_conflict: &str,
    ) -> Result<(), BackendError> {
        let response = self
            .request(Method::POST, &self.rest_url(table))
            .await?
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row)
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    #[instrument(skip(self, filters))]
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), BackendError> {
        let response = self
            .request(Method::DELETE, &self.rest_url(table))
            .await?
            .query(&filter_params(filters))
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }
}

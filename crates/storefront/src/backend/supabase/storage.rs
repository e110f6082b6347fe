//! `/storage/v1` object access.

use async_trait::async_trait;
use reqwest::Method;
use tracing::instrument;

use super::{SupabaseBackend, check_response};
use crate::backend::{BackendError, StorageBackend};

#[async_trait]
impl StorageBackend for SupabaseBackend {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let url = self.url(&format!("storage/v1/object/{bucket}/{path}"));
        let response = self
            .request(Method::POST, &url)
            .await?
            .header("Content-Type", content_type)
            .header("cache-control", "3600")
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.url(&format!("storage/v1/object/public/{bucket}/{path}"))
    }

    #[instrument(skip(self))]
    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), BackendError> {
        let url = self.url(&format!("storage/v1/object/{bucket}"));
        let response = self
            .request(Method::DELETE, &url)
            .await?
            .json(&serde_json::json!({ "prefixes": paths }))
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::config::SupabaseConfig;

    #[test]
    fn test_public_url() {
        let backend = SupabaseBackend::new(&SupabaseConfig {
            url: "https://abc.supabase.co".parse().unwrap(),
            anon_key: SecretString::from("anon"),
        });
        assert_eq!(
            backend.public_url("company-assets", "company/logo-1.png"),
            "https://abc.supabase.co/storage/v1/object/public/company-assets/company/logo-1.png"
        );
    }
}

//! Image files picked in the back office and their storage paths.

use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;

/// A file chosen for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct Upload {
    /// Original file name; only its extension is kept.
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl Upload {
    /// Content type guessed from the file name.
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = content_type_for(extension(&file_name)).to_owned();
        Self {
            file_name,
            bytes,
            content_type,
        }
    }

    /// Text after the last `.`, or the whole name when there is none.
    #[must_use]
    pub fn extension(&self) -> &str {
        extension(&self.file_name)
    }
}

fn extension(file_name: &str) -> &str {
    file_name.rsplit('.').next().unwrap_or(file_name)
}

fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// `products/<random>-<millis>.<ext>`
pub(crate) fn product_image_path(upload: &Upload) -> String {
    format!(
        "products/{}-{}.{}",
        random_token(),
        Utc::now().timestamp_millis(),
        upload.extension()
    )
}

/// `company/<prefix>-<millis>.<ext>`
pub(crate) fn company_asset_path(prefix: &str, upload: &Upload) -> String {
    format!(
        "company/{prefix}-{}.{}",
        Utc::now().timestamp_millis(),
        upload.extension()
    )
}

/// Storage path of a public object URL: `folder` plus the URL's last
/// segment. `None` when the URL has no usable last segment.
pub(crate) fn object_path(public_url: &str, folder: &str) -> Option<String> {
    public_url
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(|name| format!("{folder}/{name}"))
}

fn random_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(11)
        .map(|byte| char::from(byte).to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_follows_last_dot() {
        assert_eq!(Upload::new("foto.final.PNG", vec![]).extension(), "PNG");
        assert_eq!(Upload::new("foto", vec![]).extension(), "foto");
        assert_eq!(Upload::new("foto.PNG", vec![]).content_type, "image/png");
        assert_eq!(
            Upload::new("notas.txt", vec![]).content_type,
            "application/octet-stream"
        );
    }

    #[test]
    fn test_product_image_path_shape() {
        let path = product_image_path(&Upload::new("cafe.jpg", vec![1]));
        let name = path.strip_prefix("products/").unwrap_or_default();
        let (token, rest) = name.split_once('-').unwrap_or_default();
        assert_eq!(token.len(), 11);
        assert!(token.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert!(rest.ends_with(".jpg"));
        assert!(rest.trim_end_matches(".jpg").parse::<i64>().is_ok());
    }

    #[test]
    fn test_company_asset_path_shape() {
        let path = company_asset_path("logo", &Upload::new("marca.svg", vec![]));
        assert!(path.starts_with("company/logo-"));
        assert!(path.ends_with(".svg"));
    }

    #[test]
    fn test_object_path_from_public_url() {
        assert_eq!(
            object_path("https://x.supabase.co/storage/v1/object/public/company-assets/company/logo-1.png", "company")
                .as_deref(),
            Some("company/logo-1.png")
        );
        assert_eq!(object_path("https://x/", "products"), None);
        assert_eq!(object_path("", "products"), None);
    }
}

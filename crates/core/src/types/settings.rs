//! Company branding and storefront settings.
//!
//! Exactly one `company_settings` row exists. The stored row may lack the
//! nested `theme` and `footer` objects, so it is read as a
//! [`CompanySettingsRecord`] and normalized into [`CompanySettings`], whose
//! nested values are always present. Live updates arrive as
//! [`SettingsPatch`]es and are merged onto the previous value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use super::de::null_as_default;
use super::id::SettingsId;

/// Footer company name used when the row has neither a footer nor a name.
pub const DEFAULT_COMPANY_NAME: &str = "Minha Empresa";

/// Storefront colour scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    /// Page background.
    #[serde(default = "Theme::default_background")]
    pub background_color: String,
    /// Header bar.
    #[serde(default = "Theme::default_surface")]
    pub header_color: String,
    /// Footer bar.
    #[serde(default = "Theme::default_surface")]
    pub footer_color: String,
}

impl Theme {
    fn default_background() -> String {
        "#f3f4f6".to_owned()
    }

    fn default_surface() -> String {
        "#ffffff".to_owned()
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background_color: Self::default_background(),
            header_color: Self::default_surface(),
            footer_color: Self::default_surface(),
        }
    }
}

/// Company details printed in the storefront footer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Footer {
    /// Company display name.
    #[serde(default)]
    pub company_name: String,
    /// CNPJ (Brazilian company tax id).
    #[serde(default, rename = "cnpj")]
    pub tax_id: String,
    /// Postal address.
    #[serde(default)]
    pub address: String,
}

/// The `company_settings` row as stored by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompanySettingsRecord {
    pub id: SettingsId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, rename = "cnpj", deserialize_with = "null_as_default")]
    pub tax_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub logo_url: String,
    #[serde(default)]
    pub login_image_url: Option<String>,
    #[serde(default)]
    pub login_image_text: Option<String>,
    #[serde(default)]
    pub show_prices: Option<bool>,
    #[serde(default)]
    pub theme: Option<Theme>,
    #[serde(default)]
    pub footer: Option<Footer>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Normalized company settings; `theme` and `footer` are always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanySettings {
    pub id: SettingsId,
    pub name: String,
    #[serde(rename = "cnpj")]
    pub tax_id: String,
    pub address: String,
    pub logo_url: String,
    pub login_image_url: Option<String>,
    pub login_image_text: Option<String>,
    pub show_prices: bool,
    pub theme: Theme,
    pub footer: Footer,
}

impl From<CompanySettingsRecord> for CompanySettings {
    fn from(record: CompanySettingsRecord) -> Self {
        let footer = record.footer.unwrap_or_else(|| Footer {
            company_name: if record.name.is_empty() {
                DEFAULT_COMPANY_NAME.to_owned()
            } else {
                record.name.clone()
            },
            tax_id: record.tax_id.clone(),
            address: record.address.clone(),
        });

        Self {
            id: record.id,
            name: record.name,
            tax_id: record.tax_id,
            address: record.address,
            logo_url: record.logo_url,
            login_image_url: record.login_image_url.filter(|url| !url.is_empty()),
            login_image_text: record.login_image_text.filter(|text| !text.is_empty()),
            show_prices: record.show_prices.unwrap_or(true),
            theme: record.theme.unwrap_or_default(),
            footer,
        }
    }
}

impl CompanySettings {
    /// Merge a live patch onto these settings.
    ///
    /// Top-level fields present in the patch replace the current ones;
    /// `theme` and `footer` are replaced whole when supplied and kept
    /// otherwise. Applying the same patch twice is the same as applying it
    /// once.
    pub fn apply_patch(&mut self, patch: &SettingsPatch) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(tax_id) = &patch.tax_id {
            self.tax_id.clone_from(tax_id);
        }
        if let Some(address) = &patch.address {
            self.address.clone_from(address);
        }
        if let Some(logo_url) = &patch.logo_url {
            self.logo_url.clone_from(logo_url);
        }
        if let Some(login_image_url) = &patch.login_image_url {
            self.login_image_url.clone_from(login_image_url);
        }
        if let Some(login_image_text) = &patch.login_image_text {
            self.login_image_text.clone_from(login_image_text);
        }
        if let Some(show_prices) = patch.show_prices {
            self.show_prices = show_prices;
        }
        if let Some(theme) = &patch.theme {
            self.theme.clone_from(theme);
        }
        if let Some(footer) = &patch.footer {
            self.footer.clone_from(footer);
        }
    }

    /// Row written by the admin settings editor.
    ///
    /// The login image columns are left out entirely when no login image is
    /// set, so an upsert never clears them by accident.
    #[must_use]
    pub fn upsert_row(&self, updated_at: DateTime<Utc>) -> JsonValue {
        let mut row = serde_json::json!({
            "id": self.id,
            "name": self.name,
            "cnpj": self.tax_id,
            "address": self.address,
            "logo_url": self.logo_url,
            "show_prices": self.show_prices,
            "theme": self.theme,
            "footer": self.footer,
            "updated_at": updated_at,
        });
        if let (Some(url), JsonValue::Object(map)) = (&self.login_image_url, &mut row) {
            map.insert("login_image_url".to_owned(), JsonValue::from(url.clone()));
            map.insert(
                "login_image_text".to_owned(),
                self.login_image_text
                    .clone()
                    .map_or(JsonValue::Null, JsonValue::from),
            );
        }
        row
    }
}

/// Partial `company_settings` row delivered by the change feed.
///
/// `None` means "not supplied". For the nullable login image columns an
/// explicit `null` is `Some(None)` and clears the value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, deserialize_with = "present")]
    pub name: Option<String>,
    #[serde(default, rename = "cnpj", deserialize_with = "present")]
    pub tax_id: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub logo_url: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub login_image_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub login_image_text: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub show_prices: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub theme: Option<Theme>,
    #[serde(default, deserialize_with = "present")]
    pub footer: Option<Footer>,
}

impl SettingsPatch {
    /// Decode a change-feed record.
    ///
    /// # Errors
    ///
    /// Returns an error if a supplied field has the wrong shape.
    pub fn from_record(record: &JsonValue) -> Result<Self, serde_json::Error> {
        Self::deserialize(record)
    }
}

/// `null` counts as absent.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

/// `null` counts as an explicit clear.
fn nullable<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(
        Option::<String>::deserialize(deserializer)?.filter(|value| !value.is_empty()),
    ))
}

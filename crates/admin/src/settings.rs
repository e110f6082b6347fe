//! Company settings editor.
//!
//! Edits happen on a local [`CompanySettings`] value: uploads and removals
//! update its image fields, theme and footer are plain field edits, and
//! nothing reaches the database until [`SettingsEditor::save`]. Saving writes
//! the whole record and then reloads the live settings store.

use chrono::Utc;
use tracing::{info, instrument};
use vitrine_core::CompanySettings;
use vitrine_storefront::backend::{Backend, tables};
use vitrine_storefront::error::{Action, ActionContext, Result};
use vitrine_storefront::settings::fetch_settings;

use crate::AdminContext;
use crate::uploads::{Upload, company_asset_path, object_path};

const ASSET_FOLDER: &str = "company";

/// Company settings administration.
pub struct SettingsEditor {
    ctx: AdminContext,
}

impl SettingsEditor {
    pub(crate) const fn new(ctx: AdminContext) -> Self {
        Self { ctx }
    }

    fn backend(&self) -> &dyn Backend {
        self.ctx.backend()
    }

    fn bucket(&self) -> &str {
        &self.ctx.app().options().company_bucket
    }

    /// The stored record, normalized, to start editing from.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<CompanySettings> {
        fetch_settings(self.backend())
            .await
            .during(Action::LoadSettings)
    }

    /// Upload a new logo and point `settings.logo_url` at it.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails; `settings` is then unchanged.
    #[instrument(skip_all, fields(file = %upload.file_name))]
    pub async fn upload_logo(&self, settings: &mut CompanySettings, upload: Upload) -> Result<()> {
        settings.logo_url = self.upload(upload, "logo", Action::UploadLogo).await?;
        Ok(())
    }

    /// Delete the stored logo and clear `settings.logo_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails; `settings` is then unchanged.
    #[instrument(skip_all)]
    pub async fn remove_logo(&self, settings: &mut CompanySettings) -> Result<()> {
        self.remove(&settings.logo_url, Action::RemoveLogo).await?;
        settings.logo_url.clear();
        Ok(())
    }

    /// Upload a login page image and point `settings.login_image_url` at it.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails; `settings` is then unchanged.
    #[instrument(skip_all, fields(file = %upload.file_name))]
    pub async fn upload_login_image(
        &self,
        settings: &mut CompanySettings,
        upload: Upload,
    ) -> Result<()> {
        let url = self.upload(upload, "login", Action::UploadLoginImage).await?;
        settings.login_image_url = Some(url);
        Ok(())
    }

    /// Delete the stored login image and clear `settings.login_image_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails; `settings` is then unchanged.
    #[instrument(skip_all)]
    pub async fn remove_login_image(&self, settings: &mut CompanySettings) -> Result<()> {
        if let Some(url) = &settings.login_image_url {
            self.remove(url, Action::RemoveLoginImage).await?;
        }
        settings.login_image_url = None;
        Ok(())
    }

    /// Upsert the whole record, stamped with `updated_at`, then reload the
    /// live settings. Returns the reloaded value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails, or a settings error if the
    /// reload fails after a successful write.
    #[instrument(skip_all, fields(settings_id = %settings.id))]
    pub async fn save(&self, settings: &CompanySettings) -> Result<CompanySettings> {
        self.backend()
            .upsert(tables::COMPANY_SETTINGS, settings.upsert_row(Utc::now()), "id")
            .await
            .during(Action::SaveSettings)?;
        info!("Company settings saved");

        Ok(self.ctx.app().settings().reload().await?)
    }

    async fn upload(&self, upload: Upload, prefix: &str, action: Action) -> Result<String> {
        let path = company_asset_path(prefix, &upload);
        self.backend()
            .upload(self.bucket(), &path, upload.bytes, &upload.content_type)
            .await
            .during(action)?;
        Ok(self.backend().public_url(self.bucket(), &path))
    }

    async fn remove(&self, url: &str, action: Action) -> Result<()> {
        let Some(path) = object_path(url, ASSET_FOLDER) else {
            return Ok(());
        };
        self.backend()
            .remove(self.bucket(), &[path])
            .await
            .during(action)
    }
}

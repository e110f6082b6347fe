//! Unified error handling with Sentry integration.
//!
//! Services return `Result<T, AppError>`. An `AppError` carries the technical
//! cause for the diagnostic log and, separately, the fixed Portuguese message
//! shown inline to the user (see [`AppError::user_message`]).

use thiserror::Error;

use crate::backend::BackendError;
use crate::session::SessionError;
use crate::settings::SettingsError;

/// User action that failed, used to pick the inline message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    LoadFeatured,
    LoadProducts,
    LoadProduct,
    LoadCategories,
    SearchProducts,
    LoadCart,
    AddToCart,
    UpdateQuantity,
    RemoveFromCart,
    FinalizeOrder,
    Register,
    LoadSettings,
    SaveSettings,
    UploadLogo,
    RemoveLogo,
    UploadLoginImage,
    RemoveLoginImage,
    LoadDashboard,
    SaveProduct,
    DeleteProduct,
    ToggleFeatured,
    UploadImage,
    RemoveImage,
    SaveCategory,
    DeleteCategory,
    LoadUsers,
    LoadPermissions,
    CreateUser,
    SaveUser,
    UpdatePermissions,
    DeleteUser,
    ToggleUserRole,
    ToggleUserStatus,
}

impl Action {
    /// Inline message shown when this action fails.
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::LoadFeatured | Self::LoadProducts => "Erro ao carregar produtos",
            Self::LoadProduct => "Erro ao carregar produto",
            Self::LoadCategories => "Erro ao carregar categorias",
            Self::SearchProducts => "Erro ao buscar produtos",
            Self::LoadCart => "Erro ao carregar itens do carrinho",
            Self::AddToCart => "Erro ao adicionar item ao carrinho",
            Self::UpdateQuantity => "Erro ao atualizar quantidade",
            Self::RemoveFromCart => "Erro ao remover item do carrinho",
            Self::FinalizeOrder => "Erro ao finalizar pedido",
            Self::Register => "Erro ao criar conta. Por favor, tente novamente.",
            Self::LoadSettings => "Erro ao carregar configurações",
            Self::SaveSettings => "Erro ao salvar configurações",
            Self::UploadLogo => "Erro ao fazer upload do logo",
            Self::RemoveLogo => "Erro ao remover logo",
            Self::UploadLoginImage => "Erro ao fazer upload da imagem de login",
            Self::RemoveLoginImage => "Erro ao remover imagem de login",
            Self::LoadDashboard => "Erro ao carregar dados do dashboard",
            Self::SaveProduct => "Erro ao salvar produto",
            Self::DeleteProduct => "Erro ao excluir produto",
            Self::ToggleFeatured => "Erro ao alterar status de destaque",
            Self::UploadImage => "Erro ao fazer upload da imagem",
            Self::RemoveImage => "Erro ao remover imagem",
            Self::SaveCategory => "Erro ao salvar categoria",
            Self::DeleteCategory => "Erro ao excluir categoria",
            Self::LoadUsers => "Erro ao carregar usuários. Por favor, tente novamente.",
            Self::LoadPermissions => "Erro ao carregar permissões. Por favor, tente novamente.",
            Self::CreateUser => "Falha ao criar usuário",
            Self::SaveUser => "Erro ao salvar usuário",
            Self::UpdatePermissions => "Erro ao atualizar permissões",
            Self::DeleteUser => "Erro ao excluir usuário",
            Self::ToggleUserRole => "Erro ao alterar função do usuário",
            Self::ToggleUserStatus => "Erro ao alterar status do usuário",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Application-level error type for catalog, cart and admin services.
#[derive(Debug, Error)]
pub enum AppError {
    /// A backend call made on behalf of `action` failed.
    #[error("{action} failed: {source}")]
    Backend {
        action: Action,
        #[source]
        source: BackendError,
    },

    /// Authentication or authorization failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The company settings store failed.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Input rejected before reaching the backend. The message is user-facing.
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// A record the user asked for does not exist. The message is user-facing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The order spreadsheet could not be written.
    #[error("order export failed: {0}")]
    Export(#[from] rust_xlsxwriter::XlsxError),
}

impl AppError {
    /// Message for the inline error banner.
    ///
    /// Backend detail never reaches this string.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Backend { action, .. } => action.user_message().to_owned(),
            Self::Session(err) => err.user_message(),
            Self::Settings(err) => err.user_message().to_owned(),
            Self::Invalid(message) | Self::NotFound(message) => message.clone(),
            Self::Export(_) => "Erro ao exportar pedido".to_owned(),
        }
    }

    /// The action whose backend call failed, if any.
    #[must_use]
    pub const fn action(&self) -> Option<Action> {
        match self {
            Self::Backend { action, .. } => Some(*action),
            _ => None,
        }
    }

    /// Write the error to the diagnostic log, capturing backend failures to
    /// Sentry first.
    pub fn report(&self) {
        if matches!(self, Self::Backend { .. } | Self::Settings(_) | Self::Export(_)) {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Operation failed"
            );
        } else {
            tracing::warn!(error = %self, "Operation rejected");
        }
    }
}

/// Attach the failed [`Action`] to a backend result.
pub trait ActionContext<T> {
    /// Map a backend error into [`AppError::Backend`] for `action`.
    ///
    /// # Errors
    ///
    /// Returns the wrapped error when `self` is an error.
    fn during(self, action: Action) -> Result<T>;
}

impl<T> ActionContext<T> for std::result::Result<T, BackendError> {
    fn during(self, action: Action) -> Result<T> {
        self.map_err(|source| AppError::Backend { action, source })
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added product", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_detail_stays_out_of_user_message() {
        let err: Result<()> =
            Err(BackendError::api(500, "relation \"orders\" does not exist")).during(Action::FinalizeOrder);
        let err = err.unwrap_err();

        assert_eq!(err.user_message(), "Erro ao finalizar pedido");
        assert!(err.to_string().contains("relation \"orders\" does not exist"));
        assert_eq!(err.action(), Some(Action::FinalizeOrder));
    }

    #[test]
    fn test_action_messages() {
        assert_eq!(Action::LoadProducts.user_message(), "Erro ao carregar produtos");
        assert_eq!(Action::AddToCart.user_message(), "Erro ao adicionar item ao carrinho");
        assert_eq!(Action::LoadSettings.user_message(), "Erro ao carregar configurações");
    }

    #[test]
    fn test_session_errors_pass_through() {
        let err = AppError::from(SessionError::Forbidden);
        assert_eq!(err.user_message(), "Acesso não autorizado");
        assert_eq!(err.action(), None);
    }

    #[test]
    fn test_invalid_input_message_is_user_facing() {
        let err = AppError::Invalid("Quantidade deve ser pelo menos 1".to_owned());
        assert_eq!(err.user_message(), "Quantidade deve ser pelo menos 1");
        assert_eq!(err.to_string(), "Invalid input: Quantidade deve ser pelo menos 1");
    }
}

//! `vitrine settings`.

use serde_json::json;
use vitrine_storefront::AppContext;
use vitrine_storefront::AppError;
use vitrine_storefront::settings::{LoadStatus, SettingsState};

use super::CliError;
use crate::output;

/// Reload and print the settings.
pub async fn show(app: &AppContext) -> Result<(), CliError> {
    let settings = app.settings().reload().await.map_err(AppError::from)?;
    output::json(&settings)
}

/// Print the store state now and after every change until Ctrl-C.
pub async fn watch(app: &AppContext) -> Result<(), CliError> {
    let mut changes = app.settings().watch();
    loop {
        let view = state_view(&changes.borrow_and_update());
        output::json_line(&view)?;

        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn state_view(state: &SettingsState) -> serde_json::Value {
    let status = match state.status {
        LoadStatus::Idle => "idle",
        LoadStatus::Loading => "loading",
        LoadStatus::Loaded => "loaded",
        LoadStatus::Failed => "failed",
    };
    json!({
        "status": status,
        "error": state.error,
        "failures": state.failures,
        "settings": state.settings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_view_of_failed_load() {
        let state = SettingsState {
            settings: None,
            status: LoadStatus::Failed,
            error: Some("Erro ao carregar configurações".to_owned()),
            failures: 2,
        };
        let view = state_view(&state);
        assert_eq!(view["status"], "failed");
        assert_eq!(view["failures"], 2);
        assert!(view["settings"].is_null());
    }
}

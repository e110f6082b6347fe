//! Subcommand handlers.

pub mod admin;
pub mod cart;
pub mod catalog;
pub mod settings;

use thiserror::Error;
use vitrine_storefront::config::ConfigError;
use vitrine_storefront::session::SessionError;
use vitrine_storefront::AppError;

/// Errors that end a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A service call failed or was rejected.
    #[error(transparent)]
    App(#[from] AppError),

    /// `--email` given without a password.
    #[error("--password (or VITRINE_PASSWORD) is required with --email")]
    MissingPassword,

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<SessionError> for CliError {
    fn from(err: SessionError) -> Self {
        Self::App(err.into())
    }
}

impl CliError {
    /// Log the failure; service errors are logged with the message a user
    /// would see next to the diagnostic one.
    pub fn report(&self) {
        match self {
            Self::App(err) => {
                err.report();
                tracing::error!(message = %err.user_message(), "Command failed");
            }
            other => tracing::error!(error = %other, "Command failed"),
        }
    }
}

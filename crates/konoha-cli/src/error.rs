use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] konoha_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Token(#[from] konoha_core::token::TokenError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Remote store is not configured. Pass --snapshot PATH, or set KONOHA_FIRESTORE_PROJECT (and KONOHA_FIRESTORE_API_KEY)."
    )]
    RemoteNotConfigured,
    #[error("Refusing to reset event {0} without --yes")]
    ConfirmationRequired(String),
}

//! Crate-wide error type.

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum BotError {
    /// The account can no longer be driven: the handshake token cannot be
    /// obtained or the Telegram side reports the user as unauthorized.
    /// Terminates that account's run loop.
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid proxy URL {0}: {1}")]
    InvalidProxy(String, String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Account store error: {0}")]
    Accounts(#[from] crate::accounts::AccountsError),
}

impl BotError {
    /// Session-fatal errors stop the account instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidSession(_))
    }
}

pub type BotResult<T> = Result<T, BotError>;

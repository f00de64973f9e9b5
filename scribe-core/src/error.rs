use thiserror::Error;
use uuid::Uuid;

use crate::generation::GenerationError;
use crate::status::TransitionError;
use crate::vault::VaultError;

#[derive(Error, Debug)]
pub enum ScribeError {
    #[error("Capture {0} not found")]
    NotFound(Uuid),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Vault write failed: {0}")]
    Storage(#[from] VaultError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Other error: {0}")]
    Other(String),
}

impl ScribeError {
    /// Whether a fresh attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Generation(_) | Self::Storage(_) | Self::Database(_) | Self::Other(_)
        )
    }
}

pub type Result<T, E = ScribeError> = std::result::Result<T, E>;

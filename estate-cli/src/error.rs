use estate_auth::AuthError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Configuration error: {0:#}")]
    Config(#[from] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AppError {
    /// Whether the user has to run `estate login` before retrying.
    pub fn requires_relogin(&self) -> bool {
        matches!(self, Self::Auth(err) if err.requires_relogin())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

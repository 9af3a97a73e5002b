use crate::fetch::FetchError;
use crate::security::encryption::EncryptionError;
use crate::telegram::DispatchError;
use thiserror::Error;

/// Application-wide error type. Pipeline stages have their own error enums
/// ([`FetchError`], [`DispatchError`]) which fold into this at the worker
/// boundary; nothing here ever aborts the process: a failed run is logged
/// and the feed is retried on its next tick.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("bot token unavailable for bot id {0}")]
    TokenUnavailable(i32),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    ConnectionPool(#[from] diesel::r2d2::PoolError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("invalid profile config: {0}")]
    ProfileConfig(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn invalid_input(field: &str, message: &str) -> Self {
        AppError::InvalidInput {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn not_found(resource: &str) -> Self {
        AppError::NotFound {
            resource: resource.to_string(),
        }
    }
}

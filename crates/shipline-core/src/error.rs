//! Error types for shipline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("missing secret: {0}")]
    MissingSecret(String),

    #[error("secret store error: {0}")]
    SecretStore(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("vulnerability scan failed: {0}")]
    ScanFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

//! Configuration errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KDL parse error: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("duplicate definition: {0}")]
    Duplicate(String),

    #[error("invalid stage order: {0}")]
    InvalidOrder(String),

    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    #[error("secret {0} was not returned by the vault and is not set in the environment")]
    MissingSecret(String),

    #[error("unresolved variable ${{{0}}}")]
    UnresolvedVariable(String),

    #[error("git: {0}")]
    Git(String),

    #[error("project descriptor {path}: {message}")]
    Project { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

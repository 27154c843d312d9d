//! Vault client errors.

use thiserror::Error;

/// Longest response body kept in an error message.
const MAX_BODY_LEN: usize = 512;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("missing environment variable: {0}")]
    MissingEnv(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("failed to parse {endpoint} response: {message}")]
    Parse {
        endpoint: &'static str,
        message: String,
    },

    #[error("token endpoint returned no access token")]
    EmptyToken,

    #[error("secret listing did not finish after {0} pages")]
    TooManyPages(usize),
}

impl VaultError {
    pub(crate) fn status(endpoint: &'static str, status: reqwest::StatusCode, body: &str) -> Self {
        let mut body = body.trim().to_string();
        if body.len() > MAX_BODY_LEN {
            let mut cut = MAX_BODY_LEN;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
            body.push_str("...");
        }
        VaultError::Status {
            endpoint,
            status: status.as_u16(),
            body,
        }
    }
}

impl From<VaultError> for shipline_core::Error {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::MissingEnv(_) => shipline_core::Error::InvalidInput(err.to_string()),
            VaultError::Status {
                status: 401 | 403, ..
            } => shipline_core::Error::Unauthorized(err.to_string()),
            other => shipline_core::Error::SecretStore(other.to_string()),
        }
    }
}

pub type VaultResult<T> = std::result::Result<T, VaultError>;

//! Secret loading from HCP Vault Secrets.
//!
//! The loader exchanges service principal credentials for an access token
//! (OAuth client-credentials grant), then reads every secret of one
//! application through the "open" listing endpoint.

pub mod client;
pub mod error;

pub use client::{AccessToken, HcpConfig, HcpCredentials, HcpVaultClient};
pub use error::{VaultError, VaultResult};

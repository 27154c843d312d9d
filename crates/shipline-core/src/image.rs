//! Image references and registry credentials.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an image is published: `{registry}/{repository}:{tag}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
#[display("{registry}/{repository}:{tag}")]
pub struct ImageReference {
    /// Registry host (e.g. `docker.io`).
    pub registry: String,
    /// Repository path inside the registry (e.g. `acme/moderneci`).
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    pub fn new(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// Reference without the tag, as passed to a registry push.
    pub fn name(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }
}

/// An image that exists in the local container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalImage {
    /// Runtime image id (`sha256:...`).
    pub id: String,
    /// Local `repository:tag` reference.
    pub reference: String,
}

/// An image that has been pushed to a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedImage {
    pub reference: ImageReference,
    /// Manifest digest reported by the registry.
    pub digest: Option<String>,
}

impl PublishedImage {
    /// Fully qualified address, pinned to the digest when one is known.
    pub fn address(&self) -> String {
        match &self.digest {
            Some(digest) => format!("{}@{}", self.reference, digest),
            None => self.reference.to_string(),
        }
    }
}

/// Username/password credentials for a registry.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    pub server: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

//! Pipeline and stage definitions.
//!
//! A [`PipelineDefinition`] is an ordered list of stage descriptors. Every
//! stage consumes the artifact produced by the stage before it, so the list
//! is only valid when those artifact kinds line up.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::executor::LogLine;
use crate::image::{ImageReference, PublishedImage, RegistryAuth};
use crate::stage::ScanReport;
use crate::{Error, Result};

/// A fully resolved pipeline, ready to run.
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    /// Pipeline name (e.g. "moderneci").
    pub name: String,
    /// Source tree fed to the first stage.
    pub source: SourceSpec,
    /// Stages in execution order.
    pub stages: Vec<StageDescriptor>,
}

impl PipelineDefinition {
    /// Check that each stage's input is produced by the stage before it.
    pub fn validate(&self) -> Result<()> {
        validate_stage_chain(self.stages.iter().map(StageDescriptor::kind))
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(StageDescriptor::kind).collect()
    }
}

/// Check a stage sequence against the artifact chain.
pub fn validate_stage_chain(kinds: impl IntoIterator<Item = StageKind>) -> Result<()> {
    let mut current = ArtifactKind::Source;
    let mut seen = Vec::new();

    for kind in kinds {
        if seen.contains(&kind) {
            return Err(Error::InvalidInput(format!(
                "stage '{}' is declared more than once",
                kind
            )));
        }
        if kind.input() != current {
            return Err(Error::InvalidInput(format!(
                "stage '{}' needs {} but the previous stage produces {}",
                kind,
                kind.input(),
                current
            )));
        }
        current = kind.output();
        seen.push(kind);
    }

    if seen.is_empty() {
        return Err(Error::InvalidInput("pipeline has no stages".to_string()));
    }
    Ok(())
}

/// Source directory handed to the build stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub path: PathBuf,
    /// Top-level entries left out of the build workspace.
    pub exclude: Vec<String>,
}

/// The kind of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum StageKind {
    #[display("build")]
    Build,
    #[display("package")]
    Package,
    #[display("publish")]
    Publish,
    #[display("sign")]
    Sign,
    #[display("scan")]
    Scan,
}

impl StageKind {
    pub fn input(&self) -> ArtifactKind {
        match self {
            StageKind::Build => ArtifactKind::Source,
            StageKind::Package => ArtifactKind::BuildOutput,
            StageKind::Publish => ArtifactKind::LocalImage,
            StageKind::Sign | StageKind::Scan => ArtifactKind::PublishedImage,
        }
    }

    /// Sign and scan pass the published image through unchanged.
    pub fn output(&self) -> ArtifactKind {
        match self {
            StageKind::Build => ArtifactKind::BuildOutput,
            StageKind::Package => ArtifactKind::LocalImage,
            StageKind::Publish | StageKind::Sign | StageKind::Scan => ArtifactKind::PublishedImage,
        }
    }
}

impl FromStr for StageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "build" => Ok(StageKind::Build),
            "package" => Ok(StageKind::Package),
            "publish" => Ok(StageKind::Publish),
            "sign" => Ok(StageKind::Sign),
            "scan" => Ok(StageKind::Scan),
            other => Err(Error::InvalidInput(format!("unknown stage: {}", other))),
        }
    }
}

/// What flows between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ArtifactKind {
    #[display("a source tree")]
    Source,
    #[display("build output")]
    BuildOutput,
    #[display("a local image")]
    LocalImage,
    #[display("a published image")]
    PublishedImage,
}

/// One stage of a pipeline.
#[derive(Debug, Clone)]
pub enum StageDescriptor {
    Build(BuildSpec),
    Package(PackageSpec),
    Publish(PublishSpec),
    Sign(SignSpec),
    Scan(ScanSpec),
}

impl StageDescriptor {
    pub fn kind(&self) -> StageKind {
        match self {
            StageDescriptor::Build(_) => StageKind::Build,
            StageDescriptor::Package(_) => StageKind::Package,
            StageDescriptor::Publish(_) => StageKind::Publish,
            StageDescriptor::Sign(_) => StageKind::Sign,
            StageDescriptor::Scan(_) => StageKind::Scan,
        }
    }
}

/// Build inside a toolchain container.
#[derive(Debug, Clone)]
pub struct BuildSpec {
    /// Toolchain image (e.g. `maven:3.9-eclipse-temurin-17`).
    pub image: String,
    /// Command run in the workspace.
    pub command: Vec<String>,
    /// Extra environment for the build container.
    pub env: HashMap<String, String>,
    /// Persistent cache volumes.
    pub caches: Vec<CacheMount>,
    /// Where the workspace is mounted in the container.
    pub workdir: String,
    /// Output directory, relative to the workspace.
    pub output: String,
}

/// A named cache volume mounted into the build container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheMount {
    pub volume: String,
    pub path: String,
}

/// Copy build output into a runtime base image.
#[derive(Debug, Clone)]
pub struct PackageSpec {
    /// Runtime base image (e.g. `eclipse-temurin:17-alpine`).
    pub base_image: String,
    /// Directory in the image receiving the build output.
    pub workdir: String,
    /// Entrypoint of the packaged image.
    pub entrypoint: Vec<String>,
    /// Local repository name for the packaged image.
    pub repository: String,
}

/// Push the packaged image to a registry.
#[derive(Debug, Clone)]
pub struct PublishSpec {
    pub target: ImageReference,
    pub auth: RegistryAuth,
}

/// Sign the published image with cosign.
#[derive(Clone)]
pub struct SignSpec {
    /// Signing tool image (e.g. `bitnami/cosign:2.2.3`).
    pub image: String,
    /// Base64-encoded private key.
    pub key: String,
    /// Password of the private key.
    pub key_password: String,
    /// Registry credentials used to upload the signature.
    pub auth: RegistryAuth,
}

impl fmt::Debug for SignSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignSpec")
            .field("image", &self.image)
            .field("key", &"<redacted>")
            .field("key_password", &"<redacted>")
            .field("auth", &self.auth)
            .finish()
    }
}

/// Scan the published image for vulnerabilities.
#[derive(Debug, Clone)]
pub struct ScanSpec {
    /// Scanner image (e.g. `anchore/grype:latest`).
    pub image: String,
    /// Fail when findings at or above this severity exist.
    pub fail_on: Severity,
    /// Credentials for pulling a private image.
    pub auth: Option<RegistryAuth>,
}

/// Vulnerability severity, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)]
pub enum Severity {
    #[display("negligible")]
    Negligible,
    #[display("low")]
    Low,
    #[display("medium")]
    Medium,
    #[display("high")]
    High,
    #[display("critical")]
    Critical,
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "negligible" => Ok(Severity::Negligible),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(Error::InvalidInput(format!("unknown severity: {}", other))),
        }
    }
}

/// Event emitted while a pipeline runs.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StageStarted {
        stage: StageKind,
    },
    StageLog {
        stage: StageKind,
        line: LogLine,
    },
    StageCompleted {
        stage: StageKind,
        success: bool,
    },
    ImagePublished {
        image: PublishedImage,
    },
    ScanCompleted {
        report: ScanReport,
    },
    PipelineCompleted {
        success: bool,
    },
}

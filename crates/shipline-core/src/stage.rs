//! Stage capabilities.
//!
//! Each stage delegates to an external tool. The tools sit behind these
//! traits so a container-backed implementation can be swapped for another
//! without touching the sequencer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::ResourceId;
use crate::Result;
use crate::executor::LogLine;
use crate::image::{LocalImage, PublishedImage};
use crate::pipeline::{
    BuildSpec, PackageSpec, PipelineEvent, PublishSpec, ScanSpec, Severity, SignSpec, StageKind,
};

/// Source tree handed to the build stage.
#[derive(Debug, Clone)]
pub struct SourceTree {
    pub root: PathBuf,
    pub exclude: Vec<String>,
}

/// Host directory holding the build artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub directory: PathBuf,
}

/// What the scanner reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// Address that was scanned.
    pub image: String,
    pub fail_on: Severity,
    /// Scanner stdout.
    pub output: Vec<String>,
}

/// Forwards log lines of the running stage to the pipeline event channel.
#[derive(Debug, Clone)]
pub struct LogSink {
    stage: StageKind,
    tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl LogSink {
    pub fn new(stage: StageKind, tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self {
            stage,
            tx: Some(tx),
        }
    }

    /// A sink that drops everything.
    pub fn discard(stage: StageKind) -> Self {
        Self { stage, tx: None }
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    pub fn emit(&self, line: LogLine) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(PipelineEvent::StageLog {
                stage: self.stage,
                line,
            });
        }
    }

    pub fn system(&self, message: impl Into<String>) {
        self.emit(LogLine::system(message));
    }
}

/// Per-stage context.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub run_id: ResourceId,
    pub log: LogSink,
}

impl StageContext {
    pub fn stage(&self) -> StageKind {
        self.log.stage()
    }
}

/// Builds the application from source.
#[async_trait]
pub trait Builder: Send + Sync {
    async fn build(
        &self,
        spec: &BuildSpec,
        source: &SourceTree,
        ctx: &StageContext,
    ) -> Result<BuildOutput>;
}

/// Turns build output into a runnable image.
#[async_trait]
pub trait Packager: Send + Sync {
    async fn package(
        &self,
        spec: &PackageSpec,
        build: &BuildOutput,
        ctx: &StageContext,
    ) -> Result<LocalImage>;
}

/// Pushes an image to a registry.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        spec: &PublishSpec,
        image: &LocalImage,
        ctx: &StageContext,
    ) -> Result<PublishedImage>;
}

/// Signs a published image.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, spec: &SignSpec, image: &PublishedImage, ctx: &StageContext)
    -> Result<()>;
}

/// Scans a published image for vulnerabilities. Findings at or above the
/// threshold are an error.
#[async_trait]
pub trait Scanner: Send + Sync {
    async fn scan(
        &self,
        spec: &ScanSpec,
        image: &PublishedImage,
        ctx: &StageContext,
    ) -> Result<ScanReport>;
}

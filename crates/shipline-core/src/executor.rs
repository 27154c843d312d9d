//! Executor and image store traits.
//!
//! Executors run pipeline jobs in isolated containers. Image stores turn a
//! finished container into an image and push images to a registry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::image::{ImageReference, LocalImage, RegistryAuth};
use crate::{ResourceId, Result};

/// Specification for a job to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Unique identifier for this job.
    pub id: ResourceId,
    /// Container image to run.
    pub image: String,
    /// Entrypoint override. `None` keeps the image entrypoint.
    pub entrypoint: Option<Vec<String>>,
    /// Command (arguments to the entrypoint).
    pub command: Vec<String>,
    /// Working directory inside the container.
    pub working_dir: Option<String>,
    /// Environment variables.
    pub env: HashMap<String, String>,
    /// Maximum execution time.
    pub timeout: Option<Duration>,
    /// Volumes and host directories to mount.
    pub volumes: Vec<VolumeMount>,
}

impl JobSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(),
            image: image.into(),
            entrypoint: None,
            command: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            timeout: None,
            volumes: Vec::new(),
        }
    }

    pub fn with_entrypoint(mut self, entrypoint: Vec<String>) -> Self {
        self.entrypoint = Some(entrypoint);
        self
    }

    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_volume(mut self, volume: VolumeMount) -> Self {
        self.volumes.push(volume);
        self
    }
}

/// A volume mount specification.
///
/// `name` is either a named volume (e.g. `maven-cache`) or an absolute host
/// path; the container runtime tells them apart by the leading `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    pub read_only: bool,
}

impl VolumeMount {
    pub fn named(name: impl Into<String>, mount_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mount_path: mount_path.into(),
            read_only: false,
        }
    }

    pub fn host(path: &std::path::Path, mount_path: impl Into<String>, read_only: bool) -> Self {
        Self {
            name: path.to_string_lossy().to_string(),
            mount_path: mount_path.into(),
            read_only,
        }
    }

    /// Render as a Docker bind string (`source:target:mode`).
    pub fn bind(&self) -> String {
        let mode = if self.read_only { "ro" } else { "rw" };
        format!("{}:{}:{}", self.name, self.mount_path, mode)
    }
}

/// Handle to a running or completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHandle {
    /// The job ID.
    pub id: ResourceId,
    /// Executor-specific identifier (container ID).
    pub executor_id: String,
    /// Name of the executor running this job.
    pub executor_name: String,
}

/// Status of a job execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running {
        started_at: DateTime<Utc>,
    },
    Succeeded {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    Failed {
        started_at: Option<DateTime<Utc>>,
        finished_at: DateTime<Utc>,
        exit_code: Option<i32>,
        message: String,
    },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded { .. } | JobStatus::Failed { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded { .. })
    }
}

/// Result of a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub status: JobStatus,
    pub exit_code: Option<i32>,
}

/// A line of log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub stream: LogStream,
    pub content: String,
}

impl LogLine {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream: LogStream::System,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogStream {
    Stdout,
    Stderr,
    System,
}

/// Options for turning a finished container into an image.
#[derive(Debug, Clone)]
pub struct CommitSpec {
    /// Local repository name for the new image.
    pub repository: String,
    /// Local tag for the new image.
    pub tag: String,
    /// Entrypoint of the new image.
    pub entrypoint: Vec<String>,
    /// Working directory of the new image.
    pub working_dir: Option<String>,
}

/// Trait for job executors.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Name of this executor.
    fn name(&self) -> &'static str;

    /// Check whether the backing runtime is reachable.
    async fn is_available(&self) -> bool;

    /// Pull the image and start a new job.
    async fn spawn(&self, spec: JobSpec) -> Result<JobHandle>;

    /// Get a stream of log lines from a job. The stream ends when the job exits.
    async fn logs(&self, handle: &JobHandle) -> Result<BoxStream<'static, LogLine>>;

    /// Get the current status of a job.
    async fn status(&self, handle: &JobHandle) -> Result<JobStatus>;

    /// Wait for a job to complete.
    async fn wait(&self, handle: &JobHandle) -> Result<JobResult>;

    /// Stop and remove a running job.
    async fn cancel(&self, handle: &JobHandle) -> Result<()>;

    /// Remove a finished job's container.
    async fn remove(&self, handle: &JobHandle) -> Result<()>;
}

/// Result of pushing an image.
#[derive(Debug, Clone, Default)]
pub struct PushOutcome {
    /// Manifest digest reported by the registry, if any.
    pub digest: Option<String>,
}

/// Trait for local image storage and registry access.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Commit a finished job's container filesystem as a new local image.
    async fn commit(&self, handle: &JobHandle, spec: &CommitSpec) -> Result<LocalImage>;

    /// Tag a local image as `target` and push it with the given credentials.
    async fn push(
        &self,
        image: &LocalImage,
        target: &ImageReference,
        auth: &RegistryAuth,
    ) -> Result<PushOutcome>;
}

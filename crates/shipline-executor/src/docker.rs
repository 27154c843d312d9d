//! Local Docker executor implementation.

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::{
    CommitContainerOptions, CreateImageOptions, PushImageOptions, TagImageOptions,
};
use bollard::models::HostConfig;
use chrono::Utc;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use shipline_core::executor::*;
use shipline_core::image::{ImageReference, LocalImage, RegistryAuth};
use shipline_core::{Error, ResourceId, Result};
use tracing::{debug, info, warn};

/// Runs jobs as containers on the local Docker daemon.
pub struct LocalDockerExecutor {
    docker: Docker,
}

impl LocalDockerExecutor {
    /// Create a new LocalDockerExecutor connecting to the local Docker daemon.
    pub fn new() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Create with a custom Docker client.
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    fn container_name(job_id: &ResourceId) -> String {
        format!("shipline-job-{}", job_id)
    }

    async fn pull(&self, image: &str) {
        info!(image = %image, "Pulling image");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut pull_stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = pull_stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    // Locally built images cannot be pulled; creating the
                    // container reports a real absence.
                    warn!(image = %image, error = %e, "Pull warning");
                    break;
                }
            }
        }
    }
}

/// Container configuration for a job.
fn container_config(spec: &JobSpec) -> Config<String> {
    let env: Vec<String> = spec
        .env
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    let binds: Option<Vec<String>> = if spec.volumes.is_empty() {
        None
    } else {
        Some(spec.volumes.iter().map(VolumeMount::bind).collect())
    };

    let cmd = if spec.command.is_empty() {
        None
    } else {
        Some(spec.command.clone())
    };

    Config {
        image: Some(spec.image.clone()),
        entrypoint: spec.entrypoint.clone(),
        cmd,
        env: Some(env),
        working_dir: spec.working_dir.clone(),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        host_config: Some(HostConfig {
            binds,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Dockerfile instructions applied when committing a container.
fn commit_changes(spec: &CommitSpec) -> Result<String> {
    let entrypoint =
        serde_json::to_string(&spec.entrypoint).map_err(|e| Error::Internal(e.to_string()))?;
    let mut changes = format!("ENTRYPOINT {}\nCMD []", entrypoint);
    if let Some(dir) = &spec.working_dir {
        changes.push_str(&format!("\nWORKDIR {}", dir));
    }
    Ok(changes)
}

/// Pull the manifest digest out of a push status line such as
/// `main_2024: digest: sha256:abcd size: 1234`.
fn parse_push_digest(status: &str) -> Option<String> {
    let (_, rest) = status.split_once("digest: ")?;
    let digest = rest.split_whitespace().next()?;
    digest.starts_with("sha256:").then(|| digest.to_string())
}

fn split_log_output(output: LogOutput) -> Vec<LogLine> {
    let (stream, message) = match output {
        LogOutput::StdErr { message } => (LogStream::Stderr, message),
        LogOutput::StdOut { message }
        | LogOutput::Console { message }
        | LogOutput::StdIn { message } => (LogStream::Stdout, message),
    };
    let timestamp = Utc::now();
    String::from_utf8_lossy(&message)
        .lines()
        .map(|line| LogLine {
            timestamp,
            stream,
            content: line.trim_end().to_string(),
        })
        .collect()
}

fn parse_docker_time(value: Option<String>) -> Option<chrono::DateTime<Utc>> {
    value
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl Executor for LocalDockerExecutor {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    async fn spawn(&self, spec: JobSpec) -> Result<JobHandle> {
        let container_name = Self::container_name(&spec.id);

        self.pull(&spec.image).await;

        let create_options = CreateContainerOptions {
            name: container_name.clone(),
            platform: None,
        };

        info!(container = %container_name, image = %spec.image, "Creating container");
        let container = self
            .docker
            .create_container(Some(create_options), container_config(&spec))
            .await
            .map_err(|e| Error::ExecutionFailed(format!("Failed to create container: {}", e)))?;

        info!(container = %container_name, "Starting container");
        if let Err(e) = self
            .docker
            .start_container(&container_name, None::<StartContainerOptions<String>>)
            .await
        {
            let _ = self
                .docker
                .remove_container(
                    &container_name,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await;
            return Err(Error::ExecutionFailed(format!(
                "Failed to start container: {}",
                e
            )));
        }

        Ok(JobHandle {
            id: spec.id,
            executor_id: container.id,
            executor_name: self.name().to_string(),
        })
    }

    async fn logs(&self, handle: &JobHandle) -> Result<BoxStream<'static, LogLine>> {
        let container_name = Self::container_name(&handle.id);

        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mapped_stream = self
            .docker
            .logs(&container_name, Some(options))
            .filter_map(|result| async move {
                match result {
                    Ok(output) => Some(stream::iter(split_log_output(output))),
                    Err(e) => {
                        warn!(error = %e, "Log stream error");
                        None
                    }
                }
            })
            .flatten();

        Ok(Box::pin(mapped_stream))
    }

    async fn status(&self, handle: &JobHandle) -> Result<JobStatus> {
        let container_name = Self::container_name(&handle.id);

        let inspect = self
            .docker
            .inspect_container(&container_name, None)
            .await
            .map_err(|e| Error::NotFound(format!("Container not found: {}", e)))?;

        let state = inspect
            .state
            .ok_or_else(|| Error::Internal("No state".to_string()))?;

        let started_at = parse_docker_time(state.started_at);

        let status = if state.running.unwrap_or(false) {
            JobStatus::Running {
                started_at: started_at.unwrap_or_else(Utc::now),
            }
        } else if state.paused.unwrap_or(false) {
            JobStatus::Pending
        } else {
            let exit_code = state.exit_code.map(|c| c as i32);
            let finished_at = parse_docker_time(state.finished_at).unwrap_or_else(Utc::now);

            if exit_code == Some(0) {
                JobStatus::Succeeded {
                    started_at: started_at.unwrap_or(finished_at),
                    finished_at,
                }
            } else {
                JobStatus::Failed {
                    started_at,
                    finished_at,
                    exit_code,
                    message: state.error.unwrap_or_default(),
                }
            }
        };

        Ok(status)
    }

    async fn wait(&self, handle: &JobHandle) -> Result<JobResult> {
        let container_name = Self::container_name(&handle.id);

        let current_status = self.status(handle).await?;
        if current_status.is_terminal() {
            let exit_code = match &current_status {
                JobStatus::Succeeded { .. } => Some(0),
                JobStatus::Failed { exit_code, .. } => *exit_code,
                _ => None,
            };
            return Ok(JobResult {
                status: current_status,
                exit_code,
            });
        }

        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(&container_name, Some(options));

        // A non-zero exit surfaces as an error item carrying the code.
        let exit_code = match stream.next().await {
            Some(Ok(response)) => Some(response.status_code as i32),
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                Some(code as i32)
            }
            Some(Err(e)) => {
                warn!(error = %e, "Wait error");
                None
            }
            None => None,
        };

        let status = self.status(handle).await?;

        Ok(JobResult { status, exit_code })
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<()> {
        let container_name = Self::container_name(&handle.id);

        if let Err(e) = self.docker.stop_container(&container_name, None).await {
            debug!(container = %container_name, error = %e, "Stop failed, forcing removal");
        }

        self.remove(handle).await
    }

    async fn remove(&self, handle: &JobHandle) -> Result<()> {
        let container_name = Self::container_name(&handle.id);

        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        self.docker
            .remove_container(&container_name, Some(options))
            .await
            .map_err(|e| Error::ExecutionFailed(format!("Failed to remove container: {}", e)))?;

        debug!(container = %container_name, "Removed container");
        Ok(())
    }
}

#[async_trait]
impl ImageStore for LocalDockerExecutor {
    async fn commit(&self, handle: &JobHandle, spec: &CommitSpec) -> Result<LocalImage> {
        let reference = format!("{}:{}", spec.repository, spec.tag);
        let options = CommitContainerOptions {
            container: handle.executor_id.clone(),
            repo: spec.repository.clone(),
            tag: spec.tag.clone(),
            changes: Some(commit_changes(spec)?),
            ..Default::default()
        };

        info!(image = %reference, "Committing container");
        self.docker
            .commit_container(options, Config::<String>::default())
            .await
            .map_err(|e| Error::ExecutionFailed(format!("Failed to commit container: {}", e)))?;

        let inspect = self
            .docker
            .inspect_image(&reference)
            .await
            .map_err(|e| Error::NotFound(format!("Committed image not found: {}", e)))?;
        let id = inspect
            .id
            .ok_or_else(|| Error::Internal("Committed image has no id".to_string()))?;

        Ok(LocalImage { id, reference })
    }

    async fn push(
        &self,
        image: &LocalImage,
        target: &ImageReference,
        auth: &RegistryAuth,
    ) -> Result<PushOutcome> {
        let name = target.name();

        self.docker
            .tag_image(
                &image.id,
                Some(TagImageOptions {
                    repo: name.clone(),
                    tag: target.tag.clone(),
                }),
            )
            .await
            .map_err(|e| Error::PublishFailed(format!("Failed to tag image: {}", e)))?;

        let credentials = DockerCredentials {
            username: Some(auth.username.clone()),
            password: Some(auth.password.clone()),
            serveraddress: Some(auth.server.clone()),
            ..Default::default()
        };

        info!(image = %target, "Pushing image");
        let mut push_stream = self.docker.push_image(
            &name,
            Some(PushImageOptions {
                tag: target.tag.clone(),
            }),
            Some(credentials),
        );

        let mut outcome = PushOutcome::default();
        while let Some(result) = push_stream.next().await {
            let info =
                result.map_err(|e| Error::PublishFailed(format!("Push failed: {}", e)))?;
            if let Some(error) = info.error {
                return Err(Error::PublishFailed(error));
            }
            if let Some(status) = info.status {
                debug!(status = %status, "Push progress");
                if let Some(digest) = parse_push_digest(&status) {
                    outcome.digest = Some(digest);
                }
            }
        }

        Ok(outcome)
    }
}

//! Test doubles for executors and image stores.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream};
use shipline_core::executor::*;
use shipline_core::image::{ImageReference, LocalImage, RegistryAuth};
use shipline_core::{Error, ResourceId, Result};
use std::sync::Mutex;

/// Records every job it is asked to run and replays canned output.
pub struct MockExecutor {
    exit_code: i32,
    stdout: Vec<String>,
    fail_spawn: bool,
    spawned: Mutex<Vec<JobSpec>>,
    removed: Mutex<Vec<ResourceId>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            exit_code: 0,
            stdout: Vec::new(),
            fail_spawn: false,
            spawned: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_output(mut self, exit_code: i32, stdout: &[&str]) -> Self {
        self.exit_code = exit_code;
        self.stdout = stdout.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn failing_spawn(mut self) -> Self {
        self.fail_spawn = true;
        self
    }

    pub fn spawned(&self) -> Vec<JobSpec> {
        self.spawned.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<ResourceId> {
        self.removed.lock().unwrap().clone()
    }

    fn final_status(&self) -> JobStatus {
        if self.exit_code == 0 {
            JobStatus::Succeeded {
                started_at: Utc::now(),
                finished_at: Utc::now(),
            }
        } else {
            JobStatus::Failed {
                started_at: Some(Utc::now()),
                finished_at: Utc::now(),
                exit_code: Some(self.exit_code),
                message: String::new(),
            }
        }
    }
}

#[async_trait]
impl Executor for MockExecutor {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn spawn(&self, spec: JobSpec) -> Result<JobHandle> {
        if self.fail_spawn {
            return Err(Error::ExecutionFailed("no runtime".to_string()));
        }
        let id = spec.id.clone();
        self.spawned.lock().unwrap().push(spec);
        Ok(JobHandle {
            executor_id: format!("container-{}", id.short()),
            id,
            executor_name: "mock".to_string(),
        })
    }

    async fn logs(&self, _handle: &JobHandle) -> Result<BoxStream<'static, LogLine>> {
        let lines: Vec<LogLine> = self
            .stdout
            .iter()
            .map(|content| LogLine {
                timestamp: Utc::now(),
                stream: LogStream::Stdout,
                content: content.clone(),
            })
            .collect();
        Ok(Box::pin(stream::iter(lines)))
    }

    async fn status(&self, _handle: &JobHandle) -> Result<JobStatus> {
        Ok(self.final_status())
    }

    async fn wait(&self, _handle: &JobHandle) -> Result<JobResult> {
        Ok(JobResult {
            status: self.final_status(),
            exit_code: Some(self.exit_code),
        })
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<()> {
        self.remove(handle).await
    }

    async fn remove(&self, handle: &JobHandle) -> Result<()> {
        self.removed.lock().unwrap().push(handle.id.clone());
        Ok(())
    }
}

/// Image store that remembers commits and pushes.
#[derive(Default)]
pub struct MockImageStore {
    fail_push: bool,
    commits: Mutex<Vec<CommitSpec>>,
    pushes: Mutex<Vec<(LocalImage, ImageReference, RegistryAuth)>>,
}

impl MockImageStore {
    pub fn failing_push() -> Self {
        Self {
            fail_push: true,
            ..Default::default()
        }
    }

    pub fn commits(&self) -> Vec<CommitSpec> {
        self.commits.lock().unwrap().clone()
    }

    pub fn pushes(&self) -> Vec<(LocalImage, ImageReference, RegistryAuth)> {
        self.pushes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageStore for MockImageStore {
    async fn commit(&self, _handle: &JobHandle, spec: &CommitSpec) -> Result<LocalImage> {
        self.commits.lock().unwrap().push(spec.clone());
        Ok(LocalImage {
            id: "sha256:feedface".to_string(),
            reference: format!("{}:{}", spec.repository, spec.tag),
        })
    }

    async fn push(
        &self,
        image: &LocalImage,
        target: &ImageReference,
        auth: &RegistryAuth,
    ) -> Result<PushOutcome> {
        if self.fail_push {
            return Err(Error::PublishFailed(
                "denied: requested access to the resource is denied".into(),
            ));
        }
        self.pushes
            .lock()
            .unwrap()
            .push((image.clone(), target.clone(), auth.clone()));
        Ok(PushOutcome {
            digest: Some("sha256:0123".to_string()),
        })
    }
}

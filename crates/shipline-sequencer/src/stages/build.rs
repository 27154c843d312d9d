//! Build stage: run the toolchain image against a copy of the source.

use async_trait::async_trait;
use shipline_core::executor::{Executor, JobSpec, VolumeMount};
use shipline_core::pipeline::BuildSpec;
use shipline_core::stage::{BuildOutput, Builder, SourceTree, StageContext};
use shipline_core::{Error, Result};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing::info;

use crate::job::run_and_remove;
use crate::workspace::prepare_workspace;

/// Runs the build command in a container with the workspace mounted at the
/// build working directory and named cache volumes attached.
///
/// The package stage reads the build output from the workspace, so the most
/// recent workspace lives until the next build or until the builder is dropped.
pub struct ContainerBuilder {
    executor: Arc<dyn Executor>,
    workspace: Mutex<Option<TempDir>>,
}

impl ContainerBuilder {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            workspace: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Builder for ContainerBuilder {
    async fn build(
        &self,
        spec: &BuildSpec,
        source: &SourceTree,
        ctx: &StageContext,
    ) -> Result<BuildOutput> {
        if spec.command.is_empty() {
            return Err(Error::InvalidInput("build command is empty".to_string()));
        }

        ctx.log.system(format!("Copying {}", source.root.display()));
        let workspace = prepare_workspace(source).await?;

        let mut job = JobSpec::new(&spec.image)
            .with_command(spec.command.clone())
            .with_working_dir(&spec.workdir)
            .with_volume(VolumeMount::host(workspace.path(), &spec.workdir, false));
        for cache in &spec.caches {
            job = job.with_volume(VolumeMount::named(&cache.volume, &cache.path));
        }
        job.env.extend(spec.env.clone());

        let outcome = run_and_remove(self.executor.as_ref(), job, &ctx.log).await?;
        if !outcome.succeeded() {
            return Err(Error::ExecutionFailed(outcome.failure(&spec.command[0])));
        }

        let directory = workspace.path().join(&spec.output);
        if !directory.is_dir() {
            return Err(Error::ExecutionFailed(format!(
                "build finished but produced no {} directory",
                spec.output
            )));
        }

        info!(output = %directory.display(), "Build output ready");
        if let Ok(mut current) = self.workspace.lock() {
            *current = Some(workspace);
        }
        Ok(BuildOutput { directory })
    }
}

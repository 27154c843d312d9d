//! Package stage: copy build output into a runtime base image.

use async_trait::async_trait;
use shipline_core::executor::{CommitSpec, Executor, ImageStore, JobSpec, VolumeMount};
use shipline_core::image::LocalImage;
use shipline_core::pipeline::PackageSpec;
use shipline_core::stage::{BuildOutput, Packager, StageContext};
use shipline_core::{Error, Result};
use std::sync::Arc;
use tracing::info;

use crate::job::{run_job, shell_quote};

/// Where the build output is mounted inside the packaging container.
pub const ARTIFACTS_MOUNT: &str = "/shipline/artifacts";

/// Runs the base image once to copy the build output into place, then
/// commits the container as a new image with the configured entrypoint.
pub struct ContainerPackager {
    executor: Arc<dyn Executor>,
    images: Arc<dyn ImageStore>,
}

impl ContainerPackager {
    pub fn new(executor: Arc<dyn Executor>, images: Arc<dyn ImageStore>) -> Self {
        Self { executor, images }
    }
}

fn copy_script(workdir: &str) -> String {
    let target = shell_quote(workdir);
    format!("mkdir -p {target} && cp -R {ARTIFACTS_MOUNT}/. {target}/")
}

#[async_trait]
impl Packager for ContainerPackager {
    async fn package(
        &self,
        spec: &PackageSpec,
        build: &BuildOutput,
        ctx: &StageContext,
    ) -> Result<LocalImage> {
        if spec.entrypoint.is_empty() {
            return Err(Error::InvalidInput("package entrypoint is empty".to_string()));
        }

        let job = JobSpec::new(&spec.base_image)
            .with_entrypoint(vec!["/bin/sh".to_string(), "-c".to_string()])
            .with_command(vec![copy_script(&spec.workdir)])
            .with_volume(VolumeMount::host(&build.directory, ARTIFACTS_MOUNT, true));

        let outcome = run_job(self.executor.as_ref(), job, &ctx.log).await?;
        if !outcome.succeeded() {
            outcome.remove(self.executor.as_ref()).await;
            return Err(Error::ExecutionFailed(outcome.failure("copying build output")));
        }

        let commit = CommitSpec {
            repository: spec.repository.clone(),
            tag: ctx.run_id.short(),
            entrypoint: spec.entrypoint.clone(),
            working_dir: Some(spec.workdir.clone()),
        };
        let image = self.images.commit(&outcome.handle, &commit).await;
        outcome.remove(self.executor.as_ref()).await;
        let image = image?;

        info!(image = %image.reference, id = %image.id, "Packaged image");
        ctx.log.system(format!("Packaged {}", image.reference));
        Ok(image)
    }
}

//! Scan stage: grype against the published image.

use async_trait::async_trait;
use shipline_core::executor::{Executor, JobSpec};
use shipline_core::image::{PublishedImage, RegistryAuth};
use shipline_core::pipeline::ScanSpec;
use shipline_core::stage::{ScanReport, Scanner, StageContext};
use shipline_core::{Error, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::job::run_and_remove;

pub struct GrypeScanner {
    executor: Arc<dyn Executor>,
}

impl GrypeScanner {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }
}

/// grype resolves Docker Hub credentials under the index host.
fn registry_authority(server: &str) -> &str {
    match server {
        "docker.io" | "registry-1.docker.io" => "index.docker.io",
        other => other,
    }
}

fn scan_job(spec: &ScanSpec, image: &PublishedImage) -> JobSpec {
    let mut job = JobSpec::new(&spec.image).with_command(vec![
        image.address(),
        "--fail-on".to_string(),
        spec.fail_on.to_string(),
    ]);
    if let Some(RegistryAuth {
        server,
        username,
        password,
    }) = &spec.auth
    {
        job = job
            .with_env("GRYPE_REGISTRY_AUTH_AUTHORITY", registry_authority(server))
            .with_env("GRYPE_REGISTRY_AUTH_USERNAME", username)
            .with_env("GRYPE_REGISTRY_AUTH_PASSWORD", password);
    }
    job
}

#[async_trait]
impl Scanner for GrypeScanner {
    async fn scan(
        &self,
        spec: &ScanSpec,
        image: &PublishedImage,
        ctx: &StageContext,
    ) -> Result<ScanReport> {
        ctx.log.system(format!(
            "Scanning {} (fail on {})",
            image.address(),
            spec.fail_on
        ));
        let outcome =
            run_and_remove(self.executor.as_ref(), scan_job(spec, image), &ctx.log).await?;

        if !outcome.succeeded() {
            warn!(image = %image.address(), fail_on = %spec.fail_on, "Scan failed");
            return Err(Error::ScanFailed(format!(
                "{} (fail-on {})",
                outcome.failure("grype"),
                spec.fail_on
            )));
        }

        info!(image = %image.address(), "Scan passed");
        Ok(ScanReport {
            image: image.address(),
            fail_on: spec.fail_on,
            output: outcome.stdout,
        })
    }
}

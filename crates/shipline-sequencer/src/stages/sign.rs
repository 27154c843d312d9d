//! Sign stage: cosign signature pushed next to the published image.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use shipline_core::executor::{Executor, JobSpec};
use shipline_core::image::PublishedImage;
use shipline_core::pipeline::SignSpec;
use shipline_core::stage::{Signer, StageContext};
use shipline_core::{Error, Result};
use std::sync::Arc;
use tracing::info;

use crate::job::run_and_remove;

/// Logs in to the registry and signs by digest. The private key is handed
/// to cosign through the environment and never touches disk.
const SIGN_SCRIPT: &str = r#"cosign login "$REGISTRY_SERVER" -u "$REGISTRY_USERNAME" -p "$REGISTRY_PASSWORD" && cosign sign --key env://COSIGN_PRIVATE_KEY -y "$IMAGE_REF""#;

pub struct CosignSigner {
    executor: Arc<dyn Executor>,
}

impl CosignSigner {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }
}

/// Secrets store the key base64 encoded; cosign wants the PEM text.
fn decode_key(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::SigningFailed(format!("signing key is not valid base64: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|_| Error::SigningFailed("decoded signing key is not UTF-8 text".to_string()))
}

fn sign_job(spec: &SignSpec, image: &PublishedImage, key: String) -> JobSpec {
    JobSpec::new(&spec.image)
        .with_entrypoint(vec!["/bin/sh".to_string(), "-c".to_string()])
        .with_command(vec![SIGN_SCRIPT.to_string()])
        .with_env("COSIGN_PRIVATE_KEY", key)
        .with_env("COSIGN_PASSWORD", &spec.key_password)
        .with_env("REGISTRY_SERVER", &spec.auth.server)
        .with_env("REGISTRY_USERNAME", &spec.auth.username)
        .with_env("REGISTRY_PASSWORD", &spec.auth.password)
        .with_env("IMAGE_REF", image.address())
}

#[async_trait]
impl Signer for CosignSigner {
    async fn sign(
        &self,
        spec: &SignSpec,
        image: &PublishedImage,
        ctx: &StageContext,
    ) -> Result<()> {
        let key = decode_key(&spec.key)?;
        let job = sign_job(spec, image, key);

        ctx.log.system(format!("Signing {}", image.address()));
        let outcome = run_and_remove(self.executor.as_ref(), job, &ctx.log).await?;
        if !outcome.succeeded() {
            return Err(Error::SigningFailed(outcome.failure("cosign")));
        }

        info!(image = %image.address(), "Signed image");
        Ok(())
    }
}

//! Publish stage: push the packaged image to the registry.

use async_trait::async_trait;
use shipline_core::Result;
use shipline_core::executor::ImageStore;
use shipline_core::image::{LocalImage, PublishedImage};
use shipline_core::pipeline::PublishSpec;
use shipline_core::stage::{Publisher, StageContext};
use std::sync::Arc;
use tracing::info;

/// Tags the local image with the target reference and pushes it.
pub struct RegistryPublisher {
    images: Arc<dyn ImageStore>,
}

impl RegistryPublisher {
    pub fn new(images: Arc<dyn ImageStore>) -> Self {
        Self { images }
    }
}

#[async_trait]
impl Publisher for RegistryPublisher {
    async fn publish(
        &self,
        spec: &PublishSpec,
        image: &LocalImage,
        ctx: &StageContext,
    ) -> Result<PublishedImage> {
        ctx.log.system(format!("Pushing {}", spec.target));
        let outcome = self.images.push(image, &spec.target, &spec.auth).await?;

        let published = PublishedImage {
            reference: spec.target.clone(),
            digest: outcome.digest,
        };
        info!(address = %published.address(), "Published image");
        ctx.log.system(format!("Published {}", published.address()));
        Ok(published)
    }
}

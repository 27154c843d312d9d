//! Tag preview command.

use anyhow::{Context, Result};
use chrono::Local;
use shipline_config::{GitContext, ResolveContext, VariableContextBuilder};
use shipline_core::secret::SecretSet;
use std::path::Path;

use super::load_config;

/// Print the tag the publish stage would push under right now.
pub fn show(config: &Path, source: Option<&Path>) -> Result<()> {
    let loaded = load_config(config)?.with_source(source)?;
    let variables = VariableContextBuilder::new()
        .with_git(GitContext::detect(&loaded.source_root()))
        .with_pipeline(&loaded.pipeline.name)
        .build();
    let secrets = SecretSet::new();

    let ctx = ResolveContext {
        secrets: &secrets,
        variables: &variables,
        now: Local::now().naive_local(),
        base_dir: &loaded.base_dir,
        tag_override: None,
    };

    let tag = loaded
        .pipeline
        .publish_tag(&ctx)
        .context("Failed to compute tag")?
        .with_context(|| format!("Pipeline '{}' has no publish stage", loaded.pipeline.name))?;
    println!("{}", tag);
    Ok(())
}

//! Local pipeline execution command.

use anyhow::{Context, Result};
use chrono::Local;
use shipline_config::{GitContext, PipelineConfig, ResolveContext, VariableContextBuilder};
use shipline_core::ResourceId;
use shipline_core::executor::{Executor, LogStream};
use shipline_core::pipeline::{PipelineEvent, StageKind};
use shipline_core::secret::{SecretSet, SecretStore, VaultTarget};
use shipline_executor::LocalDockerExecutor;
use shipline_sequencer::{Capabilities, PipelineSequencer, StageState};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::{LoadedConfig, LoadedSecrets, load_config, load_secrets_from, vault_client};

pub struct RunOptions {
    pub config: PathBuf,
    pub source: Option<PathBuf>,
    pub tag: Option<String>,
    pub skip_sign: bool,
    pub skip_scan: bool,
}

/// Run a pipeline locally using Docker.
pub async fn run(options: RunOptions) -> Result<()> {
    let loaded = load_config(&options.config)?.with_source(options.source.as_deref())?;

    let mut pipeline = loaded.pipeline.clone();
    if options.skip_sign {
        pipeline = pipeline.without(StageKind::Sign)?;
    }
    if options.skip_scan {
        pipeline = pipeline.without(StageKind::Scan)?;
    }

    println!("Running pipeline: {}", pipeline.name);

    let vault = vault_client(&pipeline)?;
    let vault = vault
        .as_ref()
        .map(|(target, client)| (client as &dyn SecretStore, target));
    execute(
        &loaded,
        &pipeline,
        options.tag.as_deref(),
        vault,
        docker_capabilities,
    )
    .await
}

async fn docker_capabilities() -> Result<Capabilities> {
    let executor = LocalDockerExecutor::new().context("Failed to connect to Docker")?;
    if !executor.is_available().await {
        anyhow::bail!("Docker daemon is not reachable");
    }
    Ok(Capabilities::docker(Arc::new(executor)))
}

/// Load secrets, resolve the pipeline, and only then ask for the stage
/// capabilities and run. A secret or resolution failure returns before
/// `capabilities` is called.
async fn execute<F, Fut>(
    loaded: &LoadedConfig,
    pipeline: &PipelineConfig,
    tag: Option<&str>,
    vault: Option<(&dyn SecretStore, &VaultTarget)>,
    capabilities: F,
) -> Result<()>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Capabilities>>,
{
    let LoadedSecrets {
        secrets,
        from_vault,
        from_env,
    } = load_secrets_from(pipeline, vault).await?;
    info!(from_vault, from_env = from_env.len(), "Secrets ready");

    let source_root = loaded.source_root();
    let run_id = ResourceId::new();
    let variables = VariableContextBuilder::new()
        .with_git(GitContext::detect(&source_root))
        .with_pipeline(&pipeline.name)
        .with_run(run_id.to_string())
        .with_process_env()
        .with_secrets(secrets.clone())
        .build();

    let ctx = ResolveContext {
        secrets: &secrets,
        variables: &variables,
        now: Local::now().naive_local(),
        base_dir: &loaded.base_dir,
        tag_override: tag,
    };
    let definition = pipeline
        .resolve(&ctx)
        .context("Failed to resolve pipeline")?;

    println!("Source: {}", definition.source.path.display());
    println!(
        "Stages: {}",
        definition
            .kinds()
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(" → ")
    );

    let sequencer = PipelineSequencer::new(capabilities().await?).with_run_id(run_id);

    println!("\n--- Starting pipeline execution ---\n");

    let (mut rx, result_handle) = sequencer.execute(definition);

    // Process events concurrently with execution
    while let Some(event) = rx.recv().await {
        println!("{}", render_event(&event, &secrets));
    }

    let result = result_handle
        .await
        .context("Pipeline execution task failed")?;

    println!("\n--- Stage Summary ---");
    for (stage, state) in &result.stage_states {
        println!("  {} - {}", stage, secrets.mask(&render_state(state)));
    }

    if let Some(image) = &result.published {
        println!("\nPublished {}", image.address());
    }

    if result.success {
        println!("\n✓ Pipeline succeeded!");
        Ok(())
    } else {
        let reason = result.error.as_deref().unwrap_or("unknown error");
        anyhow::bail!("Pipeline failed: {}", secrets.mask(reason));
    }
}

/// One line of console output for an event, with secret values masked.
fn render_event(event: &PipelineEvent, secrets: &SecretSet) -> String {
    match event {
        PipelineEvent::StageStarted { stage } => format!("▶ Stage '{}' started", stage),
        PipelineEvent::StageLog { stage, line } => {
            let stream_marker = match line.stream {
                LogStream::Stdout => " ",
                LogStream::Stderr => "!",
                LogStream::System => "*",
            };
            format!(
                "  [{}]{} {}",
                stage,
                stream_marker,
                secrets.mask(&line.content)
            )
        }
        PipelineEvent::StageCompleted { stage, success } => {
            if *success {
                format!("✓ Stage '{}' completed successfully\n", stage)
            } else {
                format!("✗ Stage '{}' failed\n", stage)
            }
        }
        PipelineEvent::ImagePublished { image } => format!("⇪ Published {}", image.address()),
        PipelineEvent::ScanCompleted { report } => format!(
            "✓ No findings at or above {} in {}",
            report.fail_on, report.image
        ),
        PipelineEvent::PipelineCompleted { success } => {
            if *success {
                "--- Pipeline completed successfully ---".to_string()
            } else {
                "--- Pipeline failed ---".to_string()
            }
        }
    }
}

fn render_state(state: &StageState) -> String {
    match state {
        StageState::Succeeded => "✓ succeeded".to_string(),
        StageState::Failed { message } => format!("✗ failed: {}", message),
        StageState::Skipped { reason } => format!("⊘ skipped: {}", reason),
        StageState::Pending => "○ pending".to_string(),
        StageState::Running => "▶ running".to_string(),
    }
}

//! CLI command implementations.

pub mod run;
pub mod secrets;
pub mod tag;

use anyhow::{Context, Result};
use shipline_config::{PipelineConfig, StageConfig, load_pipeline};
use shipline_core::secret::{SecretSet, SecretStore, VaultTarget};
use shipline_vault::HcpVaultClient;
use std::path::{Path, PathBuf};
use tracing::info;

/// A parsed pipeline file and the directory its relative paths resolve against.
pub struct LoadedConfig {
    pub pipeline: PipelineConfig,
    pub base_dir: PathBuf,
}

impl LoadedConfig {
    /// Replace the configured source directory.
    pub fn with_source(mut self, source: Option<&Path>) -> Result<Self> {
        if let Some(source) = source {
            self.pipeline.source.path = source
                .canonicalize()
                .with_context(|| format!("Source directory not found: {}", source.display()))?;
        }
        Ok(self)
    }

    pub fn source_root(&self) -> PathBuf {
        self.base_dir.join(&self.pipeline.source.path)
    }
}

pub fn load_config(path: &Path) -> Result<LoadedConfig> {
    let pipeline = load_pipeline(path)
        .with_context(|| format!("Failed to load pipeline file: {}", path.display()))?;

    // Relative paths in the file are relative to the file itself.
    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .canonicalize()
        .context("Failed to resolve pipeline directory")?;

    Ok(LoadedConfig { pipeline, base_dir })
}

/// Secrets for a run and where they came from.
pub struct LoadedSecrets {
    pub secrets: SecretSet,
    /// Number of records returned by the vault.
    pub from_vault: usize,
    /// Names the vault did not return that were found in the environment.
    pub from_env: Vec<String>,
}

/// The vault application the pipeline names, with a client for it.
pub fn vault_client(pipeline: &PipelineConfig) -> Result<Option<(VaultTarget, HcpVaultClient)>> {
    let target = pipeline
        .vault_target()
        .context("Failed to resolve vault coordinates")?;
    target
        .map(|target| {
            let client =
                HcpVaultClient::from_env().context("HCP credentials are not configured")?;
            Ok((target, client))
        })
        .transpose()
}

/// Load the pipeline's vault application, then fill referenced names the
/// vault did not return from the process environment.
pub async fn load_secrets(pipeline: &PipelineConfig) -> Result<LoadedSecrets> {
    let vault = vault_client(pipeline)?;
    let vault = vault
        .as_ref()
        .map(|(target, client)| (client as &dyn SecretStore, target));
    load_secrets_from(pipeline, vault).await
}

/// Like [`load_secrets`] with the store supplied by the caller.
pub async fn load_secrets_from(
    pipeline: &PipelineConfig,
    vault: Option<(&dyn SecretStore, &VaultTarget)>,
) -> Result<LoadedSecrets> {
    let mut secrets: SecretSet = match vault {
        Some((store, target)) => {
            info!(store = store.name(), app = %target.app, "Loading secrets");
            store
                .load(target)
                .await
                .context("Failed to load secrets")?
                .into_iter()
                .collect()
        }
        None => {
            info!("No vault configured, reading secrets from the environment");
            SecretSet::new()
        }
    };

    let from_vault = secrets.len();
    let names = pipeline.secret_names();
    let from_env = secrets.fill_missing(names.iter().map(String::as_str), |name| {
        std::env::var(name).ok()
    });

    Ok(LoadedSecrets {
        secrets,
        from_vault,
        from_env,
    })
}

pub fn validate(path: &Path) -> Result<()> {
    let pipeline = load_pipeline(path)
        .with_context(|| format!("Configuration error in {}", path.display()))?;

    let stages: Vec<String> = pipeline
        .stages
        .iter()
        .map(StageConfig::kind)
        .map(|k| k.to_string())
        .collect();

    println!("Configuration is valid");
    println!("  pipeline: {}", pipeline.name);
    println!("  stages:   {}", stages.join(" → "));

    let secrets = pipeline.secret_names();
    if !secrets.is_empty() {
        let names: Vec<&str> = secrets.iter().map(String::as_str).collect();
        println!("  secrets:  {}", names.join(", "));
    }
    Ok(())
}

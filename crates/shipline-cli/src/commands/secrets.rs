//! Secret listing command.

use anyhow::Result;
use std::path::Path;

use super::{load_config, load_secrets};

/// Load the pipeline's secrets and print their names. Values are never shown.
pub async fn list(config: &Path) -> Result<()> {
    let loaded = load_config(config)?;
    let secrets = load_secrets(&loaded.pipeline).await?;

    if secrets.secrets.is_empty() {
        println!("No secrets loaded");
    } else {
        println!(
            "{} secrets ({} from the vault):",
            secrets.secrets.len(),
            secrets.from_vault
        );
        for name in secrets.secrets.names() {
            let origin = if secrets.from_env.iter().any(|n| n == name) {
                " (environment)"
            } else {
                ""
            };
            println!("  {}{}", name, origin);
        }
    }

    let missing: Vec<String> = loaded
        .pipeline
        .secret_names()
        .into_iter()
        .filter(|name| !secrets.secrets.contains(name))
        .collect();
    if !missing.is_empty() {
        println!("Missing: {}", missing.join(", "));
    }
    Ok(())
}

//! Turning a parsed pipeline file into a runnable definition.

use crate::pipeline::{
    BuildConfig, ImageName, PackageConfig, PipelineConfig, PublishConfig, ScanConfig, SignConfig,
    StageConfig, ValueSource,
};
use crate::project::read_artifact_id;
use crate::variables::VariableContext;
use crate::{ConfigError, ConfigResult};
use chrono::NaiveDateTime;
use shipline_core::image::{ImageReference, RegistryAuth};
use shipline_core::pipeline::{
    BuildSpec, PackageSpec, PipelineDefinition, PublishSpec, ScanSpec, SignSpec, SourceSpec,
    StageDescriptor,
};
use shipline_core::secret::{SecretSet, VaultTarget};
use shipline_core::tag::TagPolicy;
use std::path::Path;
use tracing::debug;

/// Everything a pipeline file is resolved against.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Secrets for `secret="..."` values.
    pub secrets: &'a SecretSet,
    /// Variables for `${...}` interpolation, including git information.
    pub variables: &'a VariableContext,
    /// Wall clock used by the branch-timestamp tag.
    pub now: NaiveDateTime,
    /// Directory relative paths are resolved against.
    pub base_dir: &'a Path,
    /// Overrides the configured tag policy.
    pub tag_override: Option<&'a str>,
}

impl PipelineConfig {
    /// The vault application to load secrets from. Vault coordinates can
    /// only come from the file or the environment.
    pub fn vault_target(&self) -> ConfigResult<Option<VaultTarget>> {
        let Some(vault) = &self.vault else {
            return Ok(None);
        };

        let no_secrets = SecretSet::new();
        let field = |source: &ValueSource, name: &str| -> ConfigResult<String> {
            if source.secret_name().is_some() {
                return Err(ConfigError::InvalidValue {
                    field: name.to_string(),
                    message: "vault coordinates cannot come from the vault".to_string(),
                });
            }
            source.resolve(&no_secrets)
        };

        Ok(Some(VaultTarget {
            organization: field(&vault.organization, "vault organization")?,
            project: field(&vault.project, "vault project")?,
            app: field(&vault.app, "vault app")?,
        }))
    }

    /// Resolve every value, name and tag into a [`PipelineDefinition`].
    pub fn resolve(&self, ctx: &ResolveContext<'_>) -> ConfigResult<PipelineDefinition> {
        let source_root = ctx.base_dir.join(&self.source.path);
        let mut publish_auth = None;
        let mut stages = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let descriptor = match stage {
                StageConfig::Build(build) => StageDescriptor::Build(resolve_build(build, ctx)?),
                StageConfig::Package(package) => {
                    StageDescriptor::Package(resolve_package(package, &self.name))
                }
                StageConfig::Publish(publish) => {
                    let spec = resolve_publish(publish, ctx, &source_root)?;
                    publish_auth = Some(spec.auth.clone());
                    StageDescriptor::Publish(spec)
                }
                StageConfig::Sign(sign) => {
                    let auth = publish_auth
                        .clone()
                        .ok_or_else(|| ConfigError::InvalidOrder("sign needs publish".into()))?;
                    StageDescriptor::Sign(resolve_sign(sign, ctx, auth)?)
                }
                StageConfig::Scan(scan) => {
                    let auth = publish_auth.clone().filter(|_| scan.authenticate);
                    StageDescriptor::Scan(resolve_scan(scan, auth))
                }
            };
            debug!(pipeline = %self.name, stage = %descriptor.kind(), "Resolved stage");
            stages.push(descriptor);
        }

        let definition = PipelineDefinition {
            name: self.name.clone(),
            source: SourceSpec {
                path: source_root,
                exclude: self.source.exclude.clone(),
            },
            stages,
        };
        definition.validate().map_err(|e| ConfigError::InvalidOrder(e.to_string()))?;
        Ok(definition)
    }

    /// The tag the publish stage would push, without resolving anything else.
    pub fn publish_tag(&self, ctx: &ResolveContext<'_>) -> ConfigResult<Option<String>> {
        self.publish().map(|p| render_tag(p, ctx)).transpose()
    }
}

fn resolve_build(build: &BuildConfig, ctx: &ResolveContext<'_>) -> ConfigResult<BuildSpec> {
    Ok(BuildSpec {
        image: build.image.clone(),
        command: ctx.variables.try_interpolate_vec(&build.command)?,
        env: ctx.variables.try_interpolate_map(&build.env)?,
        caches: build.caches.clone(),
        workdir: build.workdir.clone(),
        output: build.output.clone(),
    })
}

fn resolve_package(package: &PackageConfig, pipeline: &str) -> PackageSpec {
    PackageSpec {
        base_image: package.base_image.clone(),
        workdir: package.workdir.clone(),
        entrypoint: package.entrypoint.clone(),
        repository: format!("shipline-local/{}", local_repository_name(pipeline)),
    }
}

fn resolve_publish(
    publish: &PublishConfig,
    ctx: &ResolveContext<'_>,
    source_root: &Path,
) -> ConfigResult<PublishSpec> {
    let username = publish.username.resolve(ctx.secrets)?;
    let password = publish.password.resolve(ctx.secrets)?;

    // Registries reject uppercase repository names.
    let name = match &publish.name {
        ImageName::Literal(name) => name.clone(),
        ImageName::Pom(path) => read_artifact_id(&source_root.join(path))?,
    }
    .to_ascii_lowercase();
    let namespace = publish.namespace.clone().unwrap_or_else(|| username.clone());
    if namespace.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "publish namespace".to_string(),
            message: "registry username is empty".to_string(),
        });
    }

    let tag = render_tag(publish, ctx)?;

    Ok(PublishSpec {
        target: ImageReference::new(&publish.registry, format!("{}/{}", namespace, name), tag),
        auth: RegistryAuth {
            server: publish.registry.clone(),
            username,
            password,
        },
    })
}

fn render_tag(publish: &PublishConfig, ctx: &ResolveContext<'_>) -> ConfigResult<String> {
    let policy = match ctx.tag_override {
        Some(tag) => TagPolicy::Fixed(tag.to_string()),
        None => publish.tag.clone(),
    };
    policy
        .render(ctx.variables.git.branch(), ctx.now)
        .map_err(|e| match policy {
            TagPolicy::BranchTimestamp => ConfigError::Git(e.to_string()),
            TagPolicy::Fixed(_) => ConfigError::InvalidValue {
                field: "publish tag".to_string(),
                message: e.to_string(),
            },
        })
}

fn resolve_sign(
    sign: &SignConfig,
    ctx: &ResolveContext<'_>,
    auth: RegistryAuth,
) -> ConfigResult<SignSpec> {
    Ok(SignSpec {
        image: sign.image.clone(),
        key: sign.key.resolve(ctx.secrets)?,
        key_password: sign.password.resolve(ctx.secrets)?,
        auth,
    })
}

fn resolve_scan(scan: &ScanConfig, auth: Option<RegistryAuth>) -> ScanSpec {
    ScanSpec {
        image: scan.image.clone(),
        fail_on: scan.fail_on,
        auth,
    }
}

fn local_repository_name(pipeline: &str) -> String {
    pipeline
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

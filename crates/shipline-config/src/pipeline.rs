//! Pipeline configuration parsing.
//!
//! The file declares one node per stage; stages run in the order they are
//! written. Most settings have defaults matching a Maven project published
//! to Docker Hub, so `sign {}` or `scan {}` alone enables those stages.

use crate::variables::VariableContext;
use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use shipline_core::pipeline::{CacheMount, Severity, StageKind, validate_stage_chain};
use shipline_core::secret::SecretSet;
use shipline_core::tag::{TagPolicy, validate_tag};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

pub const DEFAULT_BUILD_IMAGE: &str = "maven:3.9-eclipse-temurin-17";
pub const DEFAULT_CACHE_VOLUME: &str = "maven-cache";
pub const DEFAULT_CACHE_PATH: &str = "/root/.m2";
pub const DEFAULT_WORKDIR: &str = "/app";
pub const DEFAULT_OUTPUT: &str = "target";
pub const DEFAULT_RUNTIME_IMAGE: &str = "eclipse-temurin:17-alpine";
pub const DEFAULT_REGISTRY: &str = "docker.io";
pub const DEFAULT_SIGN_IMAGE: &str = "bitnami/cosign:2.2.3";
pub const DEFAULT_SCAN_IMAGE: &str = "anchore/grype:latest";
pub const BRANCH_TIMESTAMP_TAG: &str = "branch-timestamp";

/// Where a configuration value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Written inline in the pipeline file.
    Literal(String),
    /// Read from a process environment variable.
    Env(String),
    /// Read from the loaded secret set.
    Secret(String),
}

impl ValueSource {
    pub fn secret_name(&self) -> Option<&str> {
        match self {
            ValueSource::Secret(name) => Some(name),
            _ => None,
        }
    }

    pub fn resolve(&self, secrets: &SecretSet) -> ConfigResult<String> {
        match self {
            ValueSource::Literal(value) => Ok(value.clone()),
            ValueSource::Env(name) => {
                std::env::var(name).map_err(|_| ConfigError::MissingEnv(name.clone()))
            }
            ValueSource::Secret(name) => secrets
                .get(name)
                .map(str::to_string)
                .ok_or_else(|| ConfigError::MissingSecret(name.clone())),
        }
    }
}

/// A parsed, unresolved pipeline file.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub name: String,
    pub vault: Option<VaultConfig>,
    pub source: SourceConfig,
    /// Stages in declaration order.
    pub stages: Vec<StageConfig>,
}

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub organization: ValueSource,
    pub project: ValueSource,
    pub app: ValueSource,
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Relative paths are resolved against the pipeline file's directory.
    pub path: PathBuf,
    pub exclude: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum StageConfig {
    Build(BuildConfig),
    Package(PackageConfig),
    Publish(PublishConfig),
    Sign(SignConfig),
    Scan(ScanConfig),
}

impl StageConfig {
    pub fn kind(&self) -> StageKind {
        match self {
            StageConfig::Build(_) => StageKind::Build,
            StageConfig::Package(_) => StageKind::Package,
            StageConfig::Publish(_) => StageKind::Publish,
            StageConfig::Sign(_) => StageKind::Sign,
            StageConfig::Scan(_) => StageKind::Scan,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub image: String,
    /// Command in exec form; `${...}` variables are interpolated at resolve time.
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
    pub caches: Vec<CacheMount>,
    pub workdir: String,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct PackageConfig {
    pub base_image: String,
    pub workdir: String,
    pub entrypoint: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub registry: String,
    /// Repository namespace; the registry username when unset.
    pub namespace: Option<String>,
    pub username: ValueSource,
    pub password: ValueSource,
    pub name: ImageName,
    pub tag: TagPolicy,
}

/// How the published image is named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageName {
    Literal(String),
    /// `<artifactId>` of a Maven project descriptor.
    Pom(PathBuf),
}

#[derive(Debug, Clone)]
pub struct SignConfig {
    pub image: String,
    pub key: ValueSource,
    pub password: ValueSource,
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub image: String,
    pub fail_on: Severity,
    /// Pass the publish credentials to the scanner.
    pub authenticate: bool,
}

impl PipelineConfig {
    pub fn stage(&self, kind: StageKind) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.kind() == kind)
    }

    pub fn publish(&self) -> Option<&PublishConfig> {
        self.stages.iter().find_map(|s| match s {
            StageConfig::Publish(p) => Some(p),
            _ => None,
        })
    }

    /// Drop stages, e.g. for `--skip-sign`. The remaining chain is revalidated.
    pub fn without(mut self, kind: StageKind) -> ConfigResult<Self> {
        self.stages.retain(|s| s.kind() != kind);
        validate_order(&self.stages)?;
        Ok(self)
    }

    /// Every secret name the pipeline references, either as `secret="..."`
    /// or as `${secrets.NAME}` in the build stage.
    pub fn secret_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let variables = VariableContext::new();

        for stage in &self.stages {
            match stage {
                StageConfig::Build(build) => {
                    for text in build.command.iter().chain(build.env.values()) {
                        for var in variables.find_secrets_in_string(text) {
                            if let Some(name) = var.strip_prefix("secrets.") {
                                names.insert(name.to_string());
                            }
                        }
                    }
                }
                StageConfig::Publish(publish) => {
                    for source in [&publish.username, &publish.password] {
                        if let Some(name) = source.secret_name() {
                            names.insert(name.to_string());
                        }
                    }
                }
                StageConfig::Sign(sign) => {
                    for source in [&sign.key, &sign.password] {
                        if let Some(name) = source.secret_name() {
                            names.insert(name.to_string());
                        }
                    }
                }
                StageConfig::Package(_) | StageConfig::Scan(_) => {}
            }
        }

        names
    }
}

/// Read and parse a pipeline file.
pub fn load_pipeline(path: &Path) -> ConfigResult<PipelineConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_pipeline(&content)
}

/// Parse a pipeline configuration from KDL text.
pub fn parse_pipeline(kdl: &str) -> ConfigResult<PipelineConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut name = String::new();
    let mut vault = None;
    let mut source = None;
    let mut stages = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "pipeline" => {
                name = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("pipeline name".to_string()))?;
            }
            "vault" => {
                if vault.is_some() {
                    return Err(ConfigError::Duplicate("vault".to_string()));
                }
                vault = Some(parse_vault(node)?);
            }
            "source" => {
                if source.is_some() {
                    return Err(ConfigError::Duplicate("source".to_string()));
                }
                source = Some(parse_source(node));
            }
            "build" => stages.push(StageConfig::Build(parse_build(node)?)),
            "package" => stages.push(StageConfig::Package(parse_package(node))),
            "publish" => stages.push(StageConfig::Publish(parse_publish(node)?)),
            "sign" => stages.push(StageConfig::Sign(parse_sign(node)?)),
            "scan" => stages.push(StageConfig::Scan(parse_scan(node)?)),
            _ => {} // Ignore unknown nodes
        }
    }

    if name.is_empty() {
        return Err(ConfigError::MissingField("pipeline name".to_string()));
    }

    validate_order(&stages)?;

    Ok(PipelineConfig {
        name,
        vault,
        source: source.unwrap_or_default(),
        stages,
    })
}

fn validate_order(stages: &[StageConfig]) -> ConfigResult<()> {
    validate_stage_chain(stages.iter().map(StageConfig::kind)).map_err(|e| match e {
        shipline_core::Error::InvalidInput(msg) => ConfigError::InvalidOrder(msg),
        other => ConfigError::InvalidOrder(other.to_string()),
    })
}

fn parse_vault(node: &KdlNode) -> ConfigResult<VaultConfig> {
    let mut organization = None;
    let mut project = None;
    let mut app = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "organization" => {
                    organization = Some(parse_value_source(child, "vault organization")?)
                }
                "project" => project = Some(parse_value_source(child, "vault project")?),
                "app" => app = Some(parse_value_source(child, "vault app")?),
                _ => {}
            }
        }
    }

    Ok(VaultConfig {
        organization: organization
            .ok_or_else(|| ConfigError::MissingField("vault organization".to_string()))?,
        project: project.ok_or_else(|| ConfigError::MissingField("vault project".to_string()))?,
        app: app.ok_or_else(|| ConfigError::MissingField("vault app".to_string()))?,
    })
}

fn parse_source(node: &KdlNode) -> SourceConfig {
    let path = get_first_string_arg(node).unwrap_or_else(|| ".".to_string());
    let mut exclude = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == "exclude" {
                exclude.extend(get_all_string_args(child));
            }
        }
    }

    SourceConfig {
        path: PathBuf::from(path),
        exclude,
    }
}

fn parse_build(node: &KdlNode) -> ConfigResult<BuildConfig> {
    let mut image = DEFAULT_BUILD_IMAGE.to_string();
    let mut command = Vec::new();
    let mut env = HashMap::new();
    let mut caches = Vec::new();
    let mut workdir = DEFAULT_WORKDIR.to_string();
    let mut output = DEFAULT_OUTPUT.to_string();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "image" => {
                    image = required_arg(child, "build image")?;
                }
                "run" => {
                    if !command.is_empty() {
                        return Err(ConfigError::Duplicate("build run".to_string()));
                    }
                    command = get_all_string_args(child);
                }
                "cache" => {
                    let volume = required_arg(child, "build cache volume")?;
                    let path = get_string_prop(child, "path")
                        .unwrap_or_else(|| DEFAULT_CACHE_PATH.to_string());
                    caches.push(CacheMount { volume, path });
                }
                "workdir" => {
                    workdir = required_arg(child, "build workdir")?;
                }
                "output" => {
                    output = required_arg(child, "build output")?;
                }
                "env" => {
                    if let Some(grandchildren) = child.children() {
                        for gc in grandchildren.nodes() {
                            let key = gc.name().value().to_string();
                            if let Some(val) = get_first_string_arg(gc) {
                                env.insert(key, val);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    if command.is_empty() {
        command = ["mvn", "clean", "install"].map(String::from).to_vec();
    }
    if caches.is_empty() {
        caches.push(CacheMount {
            volume: DEFAULT_CACHE_VOLUME.to_string(),
            path: DEFAULT_CACHE_PATH.to_string(),
        });
    }
    if output.starts_with('/') || output.split('/').any(|part| part == "..") {
        return Err(ConfigError::InvalidValue {
            field: "build output".to_string(),
            message: format!("'{}' must be a path inside the workspace", output),
        });
    }

    Ok(BuildConfig {
        image,
        command,
        env,
        caches,
        workdir,
        output,
    })
}

fn parse_package(node: &KdlNode) -> PackageConfig {
    let mut base_image = DEFAULT_RUNTIME_IMAGE.to_string();
    let mut workdir = DEFAULT_WORKDIR.to_string();
    let mut entrypoint = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "base" => {
                    if let Some(v) = get_first_string_arg(child) {
                        base_image = v;
                    }
                }
                "workdir" => {
                    if let Some(v) = get_first_string_arg(child) {
                        workdir = v;
                    }
                }
                "entrypoint" => {
                    entrypoint = get_all_string_args(child);
                }
                _ => {}
            }
        }
    }

    if entrypoint.is_empty() {
        entrypoint = vec![
            "java".to_string(),
            "-jar".to_string(),
            format!("{}/app.jar", workdir.trim_end_matches('/')),
        ];
    }

    PackageConfig {
        base_image,
        workdir,
        entrypoint,
    }
}

fn parse_publish(node: &KdlNode) -> ConfigResult<PublishConfig> {
    let mut registry = DEFAULT_REGISTRY.to_string();
    let mut namespace = None;
    let mut username = ValueSource::Env("REGISTRY_USERNAME".to_string());
    let mut password = ValueSource::Secret("REGISTRY_PASSWORD".to_string());
    let mut name = ImageName::Pom(PathBuf::from("pom.xml"));
    let mut tag = TagPolicy::BranchTimestamp;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "registry" => registry = required_arg(child, "publish registry")?,
                "namespace" => namespace = Some(required_arg(child, "publish namespace")?),
                "username" => username = parse_value_source(child, "publish username")?,
                "password" => password = parse_value_source(child, "publish password")?,
                "name" => {
                    name = match get_string_prop(child, "pom") {
                        Some(path) => ImageName::Pom(PathBuf::from(path)),
                        None => ImageName::Literal(required_arg(child, "publish name")?),
                    };
                }
                "tag" => {
                    let value = required_arg(child, "publish tag")?;
                    tag = if value == BRANCH_TIMESTAMP_TAG {
                        TagPolicy::BranchTimestamp
                    } else {
                        validate_tag(&value).map_err(|e| ConfigError::InvalidValue {
                            field: "publish tag".to_string(),
                            message: e.to_string(),
                        })?;
                        TagPolicy::Fixed(value)
                    };
                }
                _ => {}
            }
        }
    }

    Ok(PublishConfig {
        registry,
        namespace,
        username,
        password,
        name,
        tag,
    })
}

fn parse_sign(node: &KdlNode) -> ConfigResult<SignConfig> {
    let mut image = DEFAULT_SIGN_IMAGE.to_string();
    let mut key = ValueSource::Secret("COSIGN_KEY".to_string());
    let mut password = ValueSource::Secret("COSIGN_PASSWORD".to_string());

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "image" => image = required_arg(child, "sign image")?,
                "key" => key = parse_value_source(child, "sign key")?,
                "password" => password = parse_value_source(child, "sign password")?,
                _ => {}
            }
        }
    }

    Ok(SignConfig {
        image,
        key,
        password,
    })
}

fn parse_scan(node: &KdlNode) -> ConfigResult<ScanConfig> {
    let mut image = DEFAULT_SCAN_IMAGE.to_string();
    let mut fail_on = Severity::Critical;
    let mut authenticate = true;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "image" => image = required_arg(child, "scan image")?,
                "fail-on" | "fail_on" => {
                    let value = required_arg(child, "scan fail-on")?;
                    fail_on = value.parse().map_err(|_| ConfigError::InvalidValue {
                        field: "scan fail-on".to_string(),
                        message: format!("unknown severity: {}", value),
                    })?;
                }
                "authenticate" => {
                    authenticate = get_first_bool_arg(child).unwrap_or(true);
                }
                _ => {}
            }
        }
    }

    Ok(ScanConfig {
        image,
        fail_on,
        authenticate,
    })
}

/// `field "literal"`, `field env="VAR"` or `field secret="NAME"`.
fn parse_value_source(node: &KdlNode, field: &str) -> ConfigResult<ValueSource> {
    if let Some(name) = get_string_prop(node, "env") {
        return Ok(ValueSource::Env(name));
    }
    if let Some(name) = get_string_prop(node, "secret") {
        return Ok(ValueSource::Secret(name));
    }
    get_first_string_arg(node)
        .map(ValueSource::Literal)
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

// Helper functions for extracting values from KDL nodes

fn required_arg(node: &KdlNode, field: &str) -> ConfigResult<String> {
    get_first_string_arg(node)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        pipeline "moderneci"

        vault {
            organization "ad832508-eed1-4732-9dbc-ea7dd3c363f6"
            project env="HCP_PROJECT_ID"
            app "dagger-env"
        }

        source "." {
            exclude "ci" "argocd"
            exclude "helmChart" "img"
        }

        build {
            image "maven:3.9-eclipse-temurin-17"
            cache "maven-cache" path="/root/.m2"
            run "mvn" "clean" "install" "sonar:sonar" "-Dsonar.token=${secrets.SONAR_TOKEN}"
            output "target"
        }

        package {
            base "eclipse-temurin:17-alpine"
            entrypoint "java" "-jar" "/app/app.jar"
        }

        publish {
            registry "docker.io"
            username env="REGISTRY_USERNAME"
            password secret="REGISTRY_PASSWORD"
            name pom="pom.xml"
            tag "branch-timestamp"
        }

        sign {
            key secret="COSIGN_KEY"
            password secret="COSIGN_PASSWORD"
        }

        scan {
            fail-on "critical"
        }
    "#;

    #[test]
    fn test_parse_full_pipeline() {
        let config = parse_pipeline(FULL).unwrap();
        assert_eq!(config.name, "moderneci");

        let kinds: Vec<_> = config.stages.iter().map(StageConfig::kind).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Build,
                StageKind::Package,
                StageKind::Publish,
                StageKind::Sign,
                StageKind::Scan
            ]
        );

        let vault = config.vault.as_ref().unwrap();
        assert_eq!(
            vault.organization,
            ValueSource::Literal("ad832508-eed1-4732-9dbc-ea7dd3c363f6".to_string())
        );
        assert_eq!(vault.project, ValueSource::Env("HCP_PROJECT_ID".to_string()));

        assert_eq!(config.source.exclude, vec!["ci", "argocd", "helmChart", "img"]);

        let publish = config.publish().unwrap();
        assert_eq!(publish.name, ImageName::Pom(PathBuf::from("pom.xml")));
        assert_eq!(publish.tag, TagPolicy::BranchTimestamp);
    }

    #[test]
    fn test_defaults_fill_empty_stages() {
        let kdl = r#"
            pipeline "app"
            build
            package
            publish { name "app"; tag "latest" }
            scan
        "#;

        let config = parse_pipeline(kdl).unwrap();
        match config.stage(StageKind::Build).unwrap() {
            StageConfig::Build(build) => {
                assert_eq!(build.image, DEFAULT_BUILD_IMAGE);
                assert_eq!(build.command, vec!["mvn", "clean", "install"]);
                assert_eq!(build.caches[0].volume, DEFAULT_CACHE_VOLUME);
                assert_eq!(build.output, "target");
            }
            other => panic!("unexpected stage: {:?}", other),
        }
        match config.stage(StageKind::Package).unwrap() {
            StageConfig::Package(package) => {
                assert_eq!(package.entrypoint, vec!["java", "-jar", "/app/app.jar"]);
            }
            other => panic!("unexpected stage: {:?}", other),
        }
        let publish = config.publish().unwrap();
        assert_eq!(publish.tag, TagPolicy::Fixed("latest".to_string()));
        assert_eq!(publish.username, ValueSource::Env("REGISTRY_USERNAME".to_string()));
        match config.stage(StageKind::Scan).unwrap() {
            StageConfig::Scan(scan) => assert_eq!(scan.fail_on, Severity::Critical),
            other => panic!("unexpected stage: {:?}", other),
        }
    }

    #[test]
    fn test_fixed_tag_is_checked_at_parse_time() {
        let kdl = r#"
            pipeline "p"
            build
            package
            publish { name "app"; tag "Bad Tag" }
        "#;
        assert!(matches!(
            parse_pipeline(kdl),
            Err(ConfigError::InvalidValue { field, .. }) if field == "publish tag"
        ));
    }

    #[test]
    fn test_missing_pipeline_name() {
        let result = parse_pipeline("build");
        assert!(matches!(result, Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn test_out_of_order_stages_are_rejected() {
        let kdl = r#"
            pipeline "bad"
            build
            publish
            package
        "#;
        let result = parse_pipeline(kdl);
        assert!(matches!(result, Err(ConfigError::InvalidOrder(_))));
    }

    #[test]
    fn test_sign_requires_publish() {
        let kdl = r#"
            pipeline "bad"
            build
            package
            sign
        "#;
        assert!(matches!(
            parse_pipeline(kdl),
            Err(ConfigError::InvalidOrder(_))
        ));
    }

    #[test]
    fn test_unknown_severity() {
        let kdl = r#"
            pipeline "bad"
            build
            package
            publish
            scan { fail-on "catastrophic" }
        "#;
        assert!(matches!(
            parse_pipeline(kdl),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_incomplete_vault_block() {
        let kdl = r#"
            pipeline "bad"
            vault { organization "org" }
            build
        "#;
        assert!(matches!(
            parse_pipeline(kdl),
            Err(ConfigError::MissingField(field)) if field == "vault project"
        ));
    }

    #[test]
    fn test_output_outside_workspace_is_rejected() {
        let kdl = r#"
            pipeline "bad"
            build { output "../elsewhere" }
        "#;
        assert!(matches!(
            parse_pipeline(kdl),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_secret_names_collects_all_references() {
        let config = parse_pipeline(FULL).unwrap();
        let names: Vec<_> = config.secret_names().into_iter().collect();
        assert_eq!(
            names,
            vec![
                "COSIGN_KEY",
                "COSIGN_PASSWORD",
                "REGISTRY_PASSWORD",
                "SONAR_TOKEN"
            ]
        );
    }

    #[test]
    fn test_without_drops_optional_stage() {
        let config = parse_pipeline(FULL).unwrap().without(StageKind::Sign).unwrap();
        assert!(config.stage(StageKind::Sign).is_none());
        assert!(config.stage(StageKind::Scan).is_some());
    }

    #[test]
    fn test_without_rejects_broken_chain() {
        let config = parse_pipeline(FULL).unwrap();
        assert!(config.without(StageKind::Package).is_err());
    }

    #[test]
    fn test_value_source_resolution() {
        let mut secrets = SecretSet::new();
        secrets.insert("REGISTRY_PASSWORD", "pw");

        assert_eq!(
            ValueSource::Literal("acme".to_string())
                .resolve(&secrets)
                .unwrap(),
            "acme"
        );
        assert_eq!(
            ValueSource::Secret("REGISTRY_PASSWORD".to_string())
                .resolve(&secrets)
                .unwrap(),
            "pw"
        );
        assert!(matches!(
            ValueSource::Secret("COSIGN_KEY".to_string()).resolve(&secrets),
            Err(ConfigError::MissingSecret(_))
        ));
        assert!(matches!(
            ValueSource::Env("SHIPLINE_TEST_DEFINITELY_UNSET".to_string()).resolve(&secrets),
            Err(ConfigError::MissingEnv(_))
        ));
    }
}

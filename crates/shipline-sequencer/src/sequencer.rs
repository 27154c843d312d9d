//! Pipeline sequencer - runs the stages of a pipeline in declared order.

use shipline_core::image::{LocalImage, PublishedImage};
use shipline_core::pipeline::{PipelineDefinition, PipelineEvent, StageDescriptor, StageKind};
use shipline_core::stage::{
    BuildOutput, Builder, LogSink, Packager, Publisher, ScanReport, Scanner, Signer, SourceTree,
    StageContext,
};
use shipline_core::{Error, ResourceId, Result};
use shipline_executor::LocalDockerExecutor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::stages::{
    ContainerBuilder, ContainerPackager, CosignSigner, GrypeScanner, RegistryPublisher,
};

/// State of a stage during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageState {
    Pending,
    Running,
    Succeeded,
    Failed { message: String },
    Skipped { reason: String },
}

impl StageState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageState::Succeeded | StageState::Failed { .. } | StageState::Skipped { .. }
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageState::Succeeded)
    }
}

/// Result of a pipeline execution.
#[derive(Debug)]
pub struct PipelineResult {
    pub success: bool,
    /// Every declared stage with its final state, in declared order.
    pub stage_states: Vec<(StageKind, StageState)>,
    pub published: Option<PublishedImage>,
    pub scan: Option<ScanReport>,
    /// The error that aborted the run.
    pub error: Option<String>,
}

impl PipelineResult {
    pub fn state(&self, kind: StageKind) -> Option<&StageState> {
        self.stage_states
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, state)| state)
    }
}

/// The backends the stages delegate to.
#[derive(Clone)]
pub struct Capabilities {
    pub builder: Arc<dyn Builder>,
    pub packager: Arc<dyn Packager>,
    pub publisher: Arc<dyn Publisher>,
    pub signer: Arc<dyn Signer>,
    pub scanner: Arc<dyn Scanner>,
}

impl Capabilities {
    /// Container-backed stages on the local Docker daemon.
    pub fn docker(docker: Arc<LocalDockerExecutor>) -> Self {
        Self {
            builder: Arc::new(ContainerBuilder::new(docker.clone())),
            packager: Arc::new(ContainerPackager::new(docker.clone(), docker.clone())),
            publisher: Arc::new(RegistryPublisher::new(docker.clone())),
            signer: Arc::new(CosignSigner::new(docker.clone())),
            scanner: Arc::new(GrypeScanner::new(docker)),
        }
    }
}

/// What the previous stage handed on.
#[derive(Debug)]
enum Artifact {
    Source(SourceTree),
    Build(BuildOutput),
    Local(LocalImage),
    Published(PublishedImage),
}

/// Runs a pipeline front to back, stopping at the first failing stage.
pub struct PipelineSequencer {
    capabilities: Capabilities,
    run_id: ResourceId,
}

impl PipelineSequencer {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            run_id: ResourceId::new(),
        }
    }

    /// Use a run id chosen by the caller, e.g. one already exposed as `${run.id}`.
    pub fn with_run_id(mut self, run_id: ResourceId) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn run_id(&self) -> ResourceId {
        self.run_id
    }

    /// Execute a pipeline, returning a channel of events and a handle to get the final result.
    pub fn execute(
        &self,
        definition: PipelineDefinition,
    ) -> (
        mpsc::UnboundedReceiver<PipelineEvent>,
        tokio::task::JoinHandle<PipelineResult>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let capabilities = self.capabilities.clone();
        let run_id = self.run_id;

        let handle = tokio::spawn(async move {
            Self::execute_inner(capabilities, run_id, definition, tx).await
        });

        (rx, handle)
    }

    async fn execute_inner(
        capabilities: Capabilities,
        run_id: ResourceId,
        definition: PipelineDefinition,
        tx: mpsc::UnboundedSender<PipelineEvent>,
    ) -> PipelineResult {
        let mut stage_states: Vec<(StageKind, StageState)> = definition
            .stages
            .iter()
            .map(|s| (s.kind(), StageState::Pending))
            .collect();

        if let Err(e) = definition.validate() {
            error!(pipeline = %definition.name, error = %e, "Refusing to run invalid pipeline");
            for (_, state) in stage_states.iter_mut() {
                *state = StageState::Skipped {
                    reason: "pipeline is invalid".to_string(),
                };
            }
            let _ = tx.send(PipelineEvent::PipelineCompleted { success: false });
            return PipelineResult {
                success: false,
                stage_states,
                published: None,
                scan: None,
                error: Some(e.to_string()),
            };
        }

        info!(
            pipeline = %definition.name,
            %run_id,
            stages = ?definition.kinds(),
            "Starting pipeline"
        );

        let mut artifact = Artifact::Source(SourceTree {
            root: definition.source.path.clone(),
            exclude: definition.source.exclude.clone(),
        });
        let mut published = None;
        let mut scan = None;
        let mut failure = None;

        for (index, stage) in definition.stages.iter().enumerate() {
            let kind = stage.kind();
            stage_states[index].1 = StageState::Running;
            let _ = tx.send(PipelineEvent::StageStarted { stage: kind });

            let ctx = StageContext {
                run_id,
                log: LogSink::new(kind, tx.clone()),
            };

            match Self::run_stage(&capabilities, stage, artifact, &ctx).await {
                Ok((next, report)) => {
                    info!(stage = %kind, "Stage completed successfully");
                    stage_states[index].1 = StageState::Succeeded;
                    let _ = tx.send(PipelineEvent::StageCompleted {
                        stage: kind,
                        success: true,
                    });

                    if kind == StageKind::Publish {
                        if let Artifact::Published(image) = &next {
                            published = Some(image.clone());
                            let _ = tx.send(PipelineEvent::ImagePublished {
                                image: image.clone(),
                            });
                        }
                    }
                    if let Some(report) = report {
                        let _ = tx.send(PipelineEvent::ScanCompleted {
                            report: report.clone(),
                        });
                        scan = Some(report);
                    }
                    artifact = next;
                }
                Err(e) => {
                    error!(stage = %kind, error = %e, "Stage failed");
                    stage_states[index].1 = StageState::Failed {
                        message: e.to_string(),
                    };
                    let _ = tx.send(PipelineEvent::StageCompleted {
                        stage: kind,
                        success: false,
                    });
                    failure = Some(format!("{} stage failed: {}", kind, e));

                    for (later, state) in stage_states.iter_mut().skip(index + 1) {
                        info!(stage = %later, "Skipping stage after failure");
                        *state = StageState::Skipped {
                            reason: format!("{} failed", kind),
                        };
                    }
                    break;
                }
            }
        }

        let success = failure.is_none();
        info!(pipeline = %definition.name, %run_id, success, "Pipeline finished");
        let _ = tx.send(PipelineEvent::PipelineCompleted { success });

        PipelineResult {
            success,
            stage_states,
            published,
            scan,
            error: failure,
        }
    }

    /// Run one stage against the artifact of the stage before it.
    async fn run_stage(
        capabilities: &Capabilities,
        stage: &StageDescriptor,
        input: Artifact,
        ctx: &StageContext,
    ) -> Result<(Artifact, Option<ScanReport>)> {
        match (stage, input) {
            (StageDescriptor::Build(spec), Artifact::Source(source)) => {
                let output = capabilities.builder.build(spec, &source, ctx).await?;
                Ok((Artifact::Build(output), None))
            }
            (StageDescriptor::Package(spec), Artifact::Build(output)) => {
                let image = capabilities.packager.package(spec, &output, ctx).await?;
                Ok((Artifact::Local(image), None))
            }
            (StageDescriptor::Publish(spec), Artifact::Local(image)) => {
                let published = capabilities.publisher.publish(spec, &image, ctx).await?;
                Ok((Artifact::Published(published), None))
            }
            (StageDescriptor::Sign(spec), Artifact::Published(image)) => {
                capabilities.signer.sign(spec, &image, ctx).await?;
                Ok((Artifact::Published(image), None))
            }
            (StageDescriptor::Scan(spec), Artifact::Published(image)) => {
                let report = capabilities.scanner.scan(spec, &image, ctx).await?;
                Ok((Artifact::Published(image), Some(report)))
            }
            (stage, input) => Err(Error::Internal(format!(
                "{} stage cannot consume {:?}",
                stage.kind(),
                input
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shipline_core::image::{ImageReference, RegistryAuth};
    use shipline_core::pipeline::{
        BuildSpec, PackageSpec, PublishSpec, ScanSpec, Severity, SignSpec, SourceSpec,
    };
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Stand-in for every capability; records the order it was called in.
    #[derive(Default)]
    struct RecordingStages {
        calls: Mutex<Vec<StageKind>>,
        run_ids: Mutex<Vec<ResourceId>>,
        fail: Option<StageKind>,
    }

    impl RecordingStages {
        fn failing(kind: StageKind) -> Self {
            Self {
                fail: Some(kind),
                ..Default::default()
            }
        }

        fn record(&self, kind: StageKind) -> Result<()> {
            self.calls.lock().unwrap().push(kind);
            if self.fail == Some(kind) {
                return Err(Error::ExecutionFailed(format!("{} exploded", kind)));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<StageKind> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn published() -> PublishedImage {
        PublishedImage {
            reference: ImageReference::new(
                "docker.io",
                "acme/moderneci",
                "main_2024_01_01_00_00_00",
            ),
            digest: Some("sha256:0123".to_string()),
        }
    }

    #[async_trait]
    impl Builder for RecordingStages {
        async fn build(
            &self,
            _spec: &BuildSpec,
            source: &SourceTree,
            _ctx: &StageContext,
        ) -> Result<BuildOutput> {
            self.record(StageKind::Build)?;
            Ok(BuildOutput {
                directory: source.root.join("target"),
            })
        }
    }

    #[async_trait]
    impl Packager for RecordingStages {
        async fn package(
            &self,
            spec: &PackageSpec,
            _build: &BuildOutput,
            ctx: &StageContext,
        ) -> Result<LocalImage> {
            self.record(StageKind::Package)?;
            self.run_ids.lock().unwrap().push(ctx.run_id);
            Ok(LocalImage {
                id: "sha256:feedface".to_string(),
                reference: format!("{}:{}", spec.repository, ctx.run_id.short()),
            })
        }
    }

    #[async_trait]
    impl Publisher for RecordingStages {
        async fn publish(
            &self,
            _spec: &PublishSpec,
            _image: &LocalImage,
            _ctx: &StageContext,
        ) -> Result<PublishedImage> {
            self.record(StageKind::Publish)?;
            Ok(published())
        }
    }

    #[async_trait]
    impl Signer for RecordingStages {
        async fn sign(
            &self,
            _spec: &SignSpec,
            _image: &PublishedImage,
            _ctx: &StageContext,
        ) -> Result<()> {
            self.record(StageKind::Sign)
        }
    }

    #[async_trait]
    impl Scanner for RecordingStages {
        async fn scan(
            &self,
            spec: &ScanSpec,
            image: &PublishedImage,
            ctx: &StageContext,
        ) -> Result<ScanReport> {
            ctx.log.system("scanning");
            self.record(StageKind::Scan).map_err(|e| Error::ScanFailed(e.to_string()))?;
            Ok(ScanReport {
                image: image.address(),
                fail_on: spec.fail_on,
                output: vec!["No vulnerabilities found".to_string()],
            })
        }
    }

    fn capabilities(stages: Arc<RecordingStages>) -> Capabilities {
        Capabilities {
            builder: stages.clone(),
            packager: stages.clone(),
            publisher: stages.clone(),
            signer: stages.clone(),
            scanner: stages,
        }
    }

    fn auth() -> RegistryAuth {
        RegistryAuth {
            server: "docker.io".to_string(),
            username: "acme".to_string(),
            password: "hunter2".to_string(),
        }
    }

    fn descriptor(kind: StageKind) -> StageDescriptor {
        match kind {
            StageKind::Build => StageDescriptor::Build(BuildSpec {
                image: "maven:3.9-eclipse-temurin-17".to_string(),
                command: vec!["mvn".to_string(), "clean".to_string(), "install".to_string()],
                env: HashMap::new(),
                caches: vec![],
                workdir: "/app".to_string(),
                output: "target".to_string(),
            }),
            StageKind::Package => StageDescriptor::Package(PackageSpec {
                base_image: "eclipse-temurin:17-alpine".to_string(),
                workdir: "/app".to_string(),
                entrypoint: vec![
                    "java".to_string(),
                    "-jar".to_string(),
                    "/app/app.jar".to_string(),
                ],
                repository: "shipline-local/moderneci".to_string(),
            }),
            StageKind::Publish => StageDescriptor::Publish(PublishSpec {
                target: published().reference,
                auth: auth(),
            }),
            StageKind::Sign => StageDescriptor::Sign(SignSpec {
                image: "bitnami/cosign:2.2.3".to_string(),
                key: "a2V5".to_string(),
                key_password: "pass".to_string(),
                auth: auth(),
            }),
            StageKind::Scan => StageDescriptor::Scan(ScanSpec {
                image: "anchore/grype:latest".to_string(),
                fail_on: Severity::Critical,
                auth: None,
            }),
        }
    }

    fn definition(kinds: &[StageKind]) -> PipelineDefinition {
        PipelineDefinition {
            name: "moderneci".to_string(),
            source: SourceSpec {
                path: PathBuf::from("/src/moderneci"),
                exclude: vec!["ci".to_string()],
            },
            stages: kinds.iter().copied().map(descriptor).collect(),
        }
    }

    const FULL: [StageKind; 5] = [
        StageKind::Build,
        StageKind::Package,
        StageKind::Publish,
        StageKind::Sign,
        StageKind::Scan,
    ];

    async fn run(
        stages: Arc<RecordingStages>,
        definition: PipelineDefinition,
    ) -> (PipelineResult, Vec<PipelineEvent>) {
        let sequencer = PipelineSequencer::new(capabilities(stages));
        let (mut rx, handle) = sequencer.execute(definition);
        let result = handle.await.unwrap();
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (result, events)
    }

    #[tokio::test]
    async fn test_stages_run_in_declared_order() {
        let stages = Arc::new(RecordingStages::default());
        let (result, events) = run(stages.clone(), definition(&FULL)).await;

        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(stages.calls(), FULL.to_vec());
        assert!(result.stage_states.iter().all(|(_, s)| s.is_success()));
        assert_eq!(
            result.published.as_ref().map(|p| p.address()),
            Some("docker.io/acme/moderneci:main_2024_01_01_00_00_00@sha256:0123".to_string())
        );
        assert!(result.scan.is_some());

        assert!(matches!(
            events.first(),
            Some(PipelineEvent::StageStarted { stage: StageKind::Build })
        ));
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::PipelineCompleted { success: true })
        ));
        assert!(events.iter().any(|e| matches!(e, PipelineEvent::ImagePublished { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::StageLog { stage: StageKind::Scan, .. }
        )));
    }

    #[tokio::test]
    async fn test_scan_before_sign_keeps_declared_order() {
        let order = [
            StageKind::Build,
            StageKind::Package,
            StageKind::Publish,
            StageKind::Scan,
            StageKind::Sign,
        ];
        let stages = Arc::new(RecordingStages::default());
        let (result, _) = run(stages.clone(), definition(&order)).await;

        assert!(result.success);
        assert_eq!(stages.calls(), order.to_vec());
    }

    #[tokio::test]
    async fn test_failure_stops_later_stages() {
        let stages = Arc::new(RecordingStages::failing(StageKind::Package));
        let (result, events) = run(stages.clone(), definition(&FULL)).await;

        assert!(!result.success);
        assert_eq!(stages.calls(), vec![StageKind::Build, StageKind::Package]);
        assert_eq!(result.state(StageKind::Build), Some(&StageState::Succeeded));
        assert!(matches!(
            result.state(StageKind::Package),
            Some(StageState::Failed { message }) if message.contains("package exploded")
        ));
        for kind in [StageKind::Publish, StageKind::Sign, StageKind::Scan] {
            assert!(matches!(result.state(kind), Some(StageState::Skipped { .. })));
        }
        assert!(result.published.is_none());
        assert!(!events.iter().any(|e| matches!(
            e,
            PipelineEvent::StageStarted { stage: StageKind::Publish }
        )));
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::PipelineCompleted { success: false })
        ));
    }

    #[tokio::test]
    async fn test_scan_failure_fails_the_run() {
        let stages = Arc::new(RecordingStages::failing(StageKind::Scan));
        let (result, _) = run(stages.clone(), definition(&FULL)).await;

        assert!(!result.success);
        assert_eq!(stages.calls(), FULL.to_vec());
        assert!(result.published.is_some());
        assert!(result.scan.is_none());
        assert!(result.error.unwrap().starts_with("scan stage failed"));
    }

    #[tokio::test]
    async fn test_stages_see_the_run_id() {
        let run_id = ResourceId::new();
        let stages = Arc::new(RecordingStages::default());
        let sequencer = PipelineSequencer::new(capabilities(stages.clone())).with_run_id(run_id);
        let (_rx, handle) = sequencer.execute(definition(&[StageKind::Build, StageKind::Package]));
        let result = handle.await.unwrap();

        assert!(result.success);
        assert_eq!(sequencer.run_id(), run_id);
        assert_eq!(*stages.run_ids.lock().unwrap(), vec![run_id]);
    }

    #[tokio::test]
    async fn test_build_only_pipeline() {
        let stages = Arc::new(RecordingStages::default());
        let (result, _) = run(stages.clone(), definition(&[StageKind::Build])).await;

        assert!(result.success);
        assert_eq!(stages.calls(), vec![StageKind::Build]);
        assert!(result.published.is_none());
    }

    #[tokio::test]
    async fn test_invalid_pipeline_runs_nothing() {
        let stages = Arc::new(RecordingStages::default());
        let (result, events) = run(
            stages.clone(),
            definition(&[StageKind::Build, StageKind::Publish]),
        )
        .await;

        assert!(!result.success);
        assert!(stages.calls().is_empty());
        assert!(result.error.unwrap().contains("publish"));
        assert_eq!(events.len(), 1);
    }
}

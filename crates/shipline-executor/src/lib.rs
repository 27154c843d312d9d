//! Job execution backends for shipline.
//!
//! Provides the local Docker executor, which also acts as the image store
//! for committing and pushing packaged images.

pub mod docker;

pub use docker::LocalDockerExecutor;
pub use shipline_core::executor::{
    CommitSpec, Executor, ImageStore, JobHandle, JobResult, JobSpec, JobStatus, LogLine,
    LogStream, PushOutcome, VolumeMount,
};

//! Running a single container job and following its output.

use futures::StreamExt;
use shipline_core::executor::{Executor, JobHandle, JobSpec, JobStatus, LogStream};
use shipline_core::stage::LogSink;
use shipline_core::{Error, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long to wait for the log stream to drain after the job exits.
const LOG_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A finished job. The container still exists until [`JobOutcome::remove`]
/// or [`Executor::remove`] is called.
#[derive(Debug)]
pub struct JobOutcome {
    pub handle: JobHandle,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    /// Stdout lines in order.
    pub stdout: Vec<String>,
}

impl JobOutcome {
    pub fn succeeded(&self) -> bool {
        self.status.is_success()
    }

    /// Description of a failed job for error messages.
    pub fn failure(&self, what: &str) -> String {
        match (&self.status, self.exit_code) {
            (JobStatus::Failed { message, .. }, Some(code)) if !message.is_empty() => {
                format!("{} exited with code {}: {}", what, code, message)
            }
            (_, Some(code)) => format!("{} exited with code {}", what, code),
            _ => format!("{} ended without an exit code", what),
        }
    }

    /// Remove the job's container, logging instead of failing.
    pub async fn remove(&self, executor: &dyn Executor) {
        if let Err(e) = executor.remove(&self.handle).await {
            warn!(job_id = %self.handle.id, error = %e, "Failed to remove job container");
        }
    }
}

/// Spawn a job, forward its output to `log`, and wait for it to exit.
pub async fn run_job(executor: &dyn Executor, spec: JobSpec, log: &LogSink) -> Result<JobOutcome> {
    let timeout = spec.timeout;
    let image = spec.image.clone();

    info!(stage = %log.stage(), image = %image, job_id = %spec.id, "Spawning job");
    log.system(format!("Running {}", image));
    let handle = executor.spawn(spec).await?;

    let log_stream = match executor.logs(&handle).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = executor.cancel(&handle).await;
            return Err(e);
        }
    };

    let sink = log.clone();
    let log_task = tokio::spawn(async move {
        let mut stream = log_stream;
        let mut stdout = Vec::new();
        while let Some(line) = stream.next().await {
            if line.stream == LogStream::Stdout {
                stdout.push(line.content.clone());
            }
            sink.emit(line);
        }
        stdout
    });

    let waited = match timeout {
        Some(limit) => match tokio::time::timeout(limit, executor.wait(&handle)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(job_id = %handle.id, ?limit, "Job timed out, cancelling");
                log_task.abort();
                let _ = executor.cancel(&handle).await;
                return Err(Error::ExecutionFailed(format!(
                    "{} timed out after {:?}",
                    image, limit
                )));
            }
        },
        None => executor.wait(&handle).await,
    };

    let result = match waited {
        Ok(result) => result,
        Err(e) => {
            log_task.abort();
            let _ = executor.cancel(&handle).await;
            return Err(e);
        }
    };

    // The stream ends on its own once the container has exited.
    let stdout = match tokio::time::timeout(LOG_DRAIN_TIMEOUT, log_task).await {
        Ok(Ok(stdout)) => stdout,
        Ok(Err(e)) => {
            warn!(error = %e, "Log task failed");
            Vec::new()
        }
        Err(_) => {
            debug!(job_id = %handle.id, "Log stream did not finish, dropping it");
            Vec::new()
        }
    };

    debug!(job_id = %handle.id, exit_code = ?result.exit_code, "Job finished");
    Ok(JobOutcome {
        handle,
        status: result.status,
        exit_code: result.exit_code,
        stdout,
    })
}

/// Run a job to completion and remove its container.
pub async fn run_and_remove(
    executor: &dyn Executor,
    spec: JobSpec,
    log: &LogSink,
) -> Result<JobOutcome> {
    let outcome = run_job(executor, spec, log).await?;
    outcome.remove(executor).await;
    Ok(outcome)
}

/// Quote a value for `/bin/sh`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockExecutor;
    use shipline_core::pipeline::{PipelineEvent, StageKind};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_run_job_collects_stdout_and_forwards_logs() {
        let executor = MockExecutor::new().with_output(0, &["one", "two"]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let log = LogSink::new(StageKind::Build, tx);

        let outcome = run_and_remove(&executor, JobSpec::new("alpine:3.19.1"), &log)
            .await
            .unwrap();

        assert!(outcome.succeeded());
        assert_eq!(outcome.stdout, vec!["one", "two"]);
        assert_eq!(executor.removed().len(), 1);

        let mut forwarded = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let PipelineEvent::StageLog { line, .. } = event {
                forwarded.push(line.content);
            }
        }
        assert!(forwarded.contains(&"one".to_string()));
        assert!(forwarded.contains(&"two".to_string()));
    }

    #[tokio::test]
    async fn test_failed_job_reports_exit_code() {
        let executor = MockExecutor::new().with_output(3, &[]);
        let log = LogSink::discard(StageKind::Build);

        let outcome = run_job(&executor, JobSpec::new("maven"), &log).await.unwrap();
        assert!(!outcome.succeeded());
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.failure("mvn"), "mvn exited with code 3");
        assert!(executor.removed().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let executor = MockExecutor::new().failing_spawn();
        let log = LogSink::discard(StageKind::Build);
        assert!(run_job(&executor, JobSpec::new("maven"), &log).await.is_err());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/app"), "'/app'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}

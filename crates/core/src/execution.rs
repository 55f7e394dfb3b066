//! Executions and their state machine.
//!
//! An [`Execution`] is shared between the registry, the executor task that
//! drives it and any number of pollers. Its identity (name, job, start time)
//! is immutable; everything that changes while it runs lives behind the
//! execution's own lock, so readers always see a whole [`ExecutionSnapshot`]
//! and never a half-applied transition.

use crate::{Error, ExecutionName, Job, Result, Time};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Execution status.
///
/// ```text
/// RUNNING ─┬─> SUCCEEDED
///          ├─> FAILED
///          └─> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Reserved; executions are created directly in `Running`
    Pending,
    /// Dispatched to an executor
    Running,
    /// Finished with a zero exit
    Succeeded,
    /// Finished with an error or non-zero exit
    Failed,
    /// Stopped on request
    Cancelled,
}

impl ExecutionStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) => true,
            (Self::Pending | Self::Running, n) => n.is_terminal(),
            _ => false,
        }
    }

    /// Upper-case status name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Zero exit
    Succeeded,
    /// Launch error, non-zero exit or wait error, with a readable message
    Failed(String),
    /// Stopped on request
    Cancelled,
}

impl Outcome {
    /// Build a failure outcome.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Terminal status this outcome maps to.
    pub fn status(&self) -> ExecutionStatus {
        match self {
            Self::Succeeded => ExecutionStatus::Succeeded,
            Self::Failed(_) => ExecutionStatus::Failed,
            Self::Cancelled => ExecutionStatus::Cancelled,
        }
    }
}

#[derive(Debug)]
struct ExecutionState {
    status: ExecutionStatus,
    completion_time: Option<Time>,
    succeeded_count: u32,
    failed_count: u32,
    cancelled_count: u32,
    error_message: Option<String>,
    container_id: Option<String>,
    cancel_requested: bool,
}

/// A single run of a job.
#[derive(Debug)]
pub struct Execution {
    name: String,
    job: Arc<Job>,
    start_time: Time,
    state: RwLock<ExecutionState>,
}

impl Execution {
    /// Create an execution in `Running`, started now.
    pub fn start(name: &ExecutionName, job: Arc<Job>) -> Self {
        Self {
            name: name.to_string(),
            job,
            start_time: chrono::Utc::now(),
            state: RwLock::new(ExecutionState {
                status: ExecutionStatus::Running,
                completion_time: None,
                succeeded_count: 0,
                failed_count: 0,
                cancelled_count: 0,
                error_message: None,
                container_id: None,
                cancel_requested: false,
            }),
        }
    }

    /// Full resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The job this execution runs.
    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    /// When the execution was dispatched.
    pub fn start_time(&self) -> Time {
        self.start_time
    }

    /// Current status.
    pub async fn status(&self) -> ExecutionStatus {
        self.state.read().await.status
    }

    /// Consistent copy of the current state.
    pub async fn snapshot(&self) -> ExecutionSnapshot {
        let state = self.state.read().await;
        ExecutionSnapshot {
            name: self.name.clone(),
            job: self.job.name.clone(),
            status: state.status,
            start_time: self.start_time,
            completion_time: state.completion_time,
            succeeded_count: state.succeeded_count,
            failed_count: state.failed_count,
            cancelled_count: state.cancelled_count,
            error_message: state.error_message.clone(),
            container_id: state.container_id.clone(),
        }
    }

    /// Move to the terminal state for `outcome`.
    ///
    /// Only the first terminal write takes effect; returns `false` and leaves
    /// the execution untouched if it had already finished.
    pub async fn finish(&self, outcome: Outcome) -> bool {
        let mut state = self.state.write().await;
        let next = outcome.status();
        if !state.status.can_transition_to(next) {
            debug!(
                execution = %self.name,
                current = %state.status,
                ignored = %next,
                "execution already finished"
            );
            return false;
        }

        state.status = next;
        state.completion_time = Some(chrono::Utc::now());
        match outcome {
            Outcome::Succeeded => state.succeeded_count = 1,
            Outcome::Failed(message) => {
                state.failed_count = 1;
                state.error_message = Some(message);
            }
            Outcome::Cancelled => state.cancelled_count = 1,
        }
        true
    }

    /// Record the backend handle used for cancellation.
    pub async fn set_container_id(&self, id: impl Into<String>) {
        self.state.write().await.container_id = Some(id.into());
    }

    /// Backend handle, if the backend recorded one.
    pub async fn container_id(&self) -> Option<String> {
        self.state.read().await.container_id.clone()
    }

    /// Mark that a cancellation is in flight.
    ///
    /// Fails with `FailedPrecondition` unless the execution is running.
    pub async fn request_cancel(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.status != ExecutionStatus::Running {
            return Err(Error::FailedPrecondition(format!(
                "execution is not running: {}",
                state.status
            )));
        }
        state.cancel_requested = true;
        Ok(())
    }

    /// Withdraw a cancellation request the backend refused.
    pub async fn clear_cancel_request(&self) {
        self.state.write().await.cancel_requested = false;
    }

    /// Whether a cancellation has been requested.
    pub async fn cancel_requested(&self) -> bool {
        self.state.read().await.cancel_requested
    }
}

/// Point-in-time copy of an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    /// Full resource name
    pub name: String,
    /// Owning job's resource name
    pub job: String,
    /// Status at snapshot time
    pub status: ExecutionStatus,
    /// Dispatch time
    pub start_time: Time,
    /// Set iff the status is terminal
    pub completion_time: Option<Time>,
    /// 1 if succeeded
    pub succeeded_count: u32,
    /// 1 if failed
    pub failed_count: u32,
    /// 1 if cancelled
    pub cancelled_count: u32,
    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Backend handle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}

impl ExecutionSnapshot {
    /// Whether the snapshot shows a terminal state.
    pub fn is_done(&self) -> bool {
        self.status.is_terminal()
    }

    /// Number of tasks still running (0 or 1).
    pub fn running_count(&self) -> u32 {
        u32::from(self.status == ExecutionStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExecutionId, JobName, JobTemplate};

    fn test_execution() -> Execution {
        let job_name = JobName::new("p", "r", "echo-job");
        let job = Arc::new(Job::new(
            &job_name,
            JobTemplate::new("alpine").with_command(["echo", "hello"]),
        ));
        Execution::start(&job_name.execution(&ExecutionId::from("abcd1234")), job)
    }

    #[test]
    fn test_transitions() {
        use ExecutionStatus::*;

        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));
        assert!(Running.can_transition_to(Cancelled));
        assert!(!Running.can_transition_to(Pending));

        for terminal in [Succeeded, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Running, Succeeded, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ExecutionStatus::Running.to_string(), "RUNNING");
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::Cancelled).unwrap(),
            "\"CANCELLED\""
        );
    }

    #[tokio::test]
    async fn test_new_execution_is_running() {
        let exec = test_execution();
        let snap = exec.snapshot().await;

        assert_eq!(snap.status, ExecutionStatus::Running);
        assert!(snap.completion_time.is_none());
        assert_eq!(snap.running_count(), 1);
        assert_eq!(snap.succeeded_count + snap.failed_count + snap.cancelled_count, 0);
        assert_eq!(
            snap.name,
            "projects/p/locations/r/jobs/echo-job/executions/abcd1234"
        );
        assert_eq!(snap.job, "projects/p/locations/r/jobs/echo-job");
    }

    #[tokio::test]
    async fn test_finish_sets_exactly_one_counter() {
        for outcome in [Outcome::Succeeded, Outcome::failed("boom"), Outcome::Cancelled] {
            let exec = test_execution();
            assert!(exec.finish(outcome.clone()).await);

            let snap = exec.snapshot().await;
            assert_eq!(snap.status, outcome.status());
            assert!(snap.completion_time.is_some());
            assert_eq!(snap.succeeded_count + snap.failed_count + snap.cancelled_count, 1);
            assert_eq!(snap.running_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_first_terminal_write_wins() {
        let exec = test_execution();
        assert!(exec.finish(Outcome::Cancelled).await);
        let first = exec.snapshot().await;

        assert!(!exec.finish(Outcome::failed("exit 137")).await);
        assert!(!exec.finish(Outcome::Succeeded).await);

        let snap = exec.snapshot().await;
        assert_eq!(snap, first);
        assert_eq!(snap.status, ExecutionStatus::Cancelled);
        assert!(snap.error_message.is_none());
    }

    #[tokio::test]
    async fn test_failure_records_message() {
        let exec = test_execution();
        exec.finish(Outcome::failed("no command specified")).await;

        let snap = exec.snapshot().await;
        assert_eq!(snap.error_message.as_deref(), Some("no command specified"));
        assert_eq!(snap.failed_count, 1);
    }

    #[tokio::test]
    async fn test_cancel_request_requires_running() {
        let exec = test_execution();
        assert!(exec.request_cancel().await.is_ok());
        assert!(exec.cancel_requested().await);

        exec.clear_cancel_request().await;
        assert!(!exec.cancel_requested().await);

        exec.finish(Outcome::Succeeded).await;
        let err = exec.request_cancel().await.unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn test_container_id() {
        let exec = test_execution();
        assert!(exec.container_id().await.is_none());
        exec.set_container_id("c0ffee").await;
        assert_eq!(exec.container_id().await.as_deref(), Some("c0ffee"));
        assert_eq!(exec.snapshot().await.container_id.as_deref(), Some("c0ffee"));
    }

    #[tokio::test]
    async fn test_concurrent_finishers_agree() {
        let exec = Arc::new(test_execution());
        let mut handles = Vec::new();
        for i in 0..16 {
            let exec = exec.clone();
            handles.push(tokio::spawn(async move {
                let outcome = if i % 2 == 0 {
                    Outcome::Cancelled
                } else {
                    Outcome::failed("lost race")
                };
                exec.finish(outcome).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        let snap = exec.snapshot().await;
        assert_eq!(snap.succeeded_count + snap.failed_count + snap.cancelled_count, 1);
    }
}

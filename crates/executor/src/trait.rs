//! Executor abstraction.

use async_trait::async_trait;
use runjobs_core::{Environment, Execution};
use std::sync::Arc;

/// A backend that carries out executions.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Run an execution to completion.
    ///
    /// Called from a detached task. Every path must leave the execution in a
    /// terminal state with its completion time set.
    async fn run(&self, execution: Arc<Execution>, env: Environment);

    /// Ask the backend to stop a running execution.
    ///
    /// Best effort: success means the stop request was accepted, not that the
    /// run task has already observed it.
    async fn cancel(&self, execution: &Execution) -> Result<(), CancelError>;
}

/// Why a cancel request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CancelError {
    /// The backend cannot interrupt executions
    #[error("cancel not supported for {0} executor")]
    Unsupported(&'static str),

    /// No backend handle was recorded (e.g. container never created)
    #[error("no container ID for execution {0}")]
    NoHandle(String),

    /// The backend rejected the stop request
    #[error("stop failed: {0}")]
    Backend(String),
}

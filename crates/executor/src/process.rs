//! Local subprocess executor.

use super::r#trait::{CancelError, Executor};
use async_trait::async_trait;
use runjobs_core::{Environment, Execution, Outcome};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{error, info};

/// Runs `command[0]` with `command[1..]` as a child of the emulator.
///
/// The child inherits the host environment with the execution's overlay on
/// top, and writes straight to the host's stdout/stderr. Executions cannot be
/// interrupted; they always run to completion.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    /// Create a new process executor.
    pub fn new() -> Self {
        Self
    }

    async fn execute(&self, execution: &Execution, env: &Environment) -> Outcome {
        let Some((program, args)) = execution.job().command.split_first() else {
            error!(execution = %execution.name(), "no command specified for job");
            return Outcome::failed("no command specified");
        };

        info!(
            execution = %execution.name(),
            command = ?execution.job().command,
            "starting subprocess"
        );

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        match cmd.status().await {
            Ok(status) if status.success() => {
                info!(execution = %execution.name(), "subprocess completed successfully");
                Outcome::Succeeded
            }
            Ok(status) => {
                error!(execution = %execution.name(), %status, "subprocess failed");
                Outcome::failed(status.to_string())
            }
            Err(e) => {
                error!(execution = %execution.name(), error = %e, "subprocess failed to start");
                Outcome::failed(format!("failed to start {}: {}", program, e))
            }
        }
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    async fn run(&self, execution: Arc<Execution>, env: Environment) {
        let outcome = self.execute(&execution, &env).await;
        execution.finish(outcome).await;
    }

    async fn cancel(&self, _execution: &Execution) -> Result<(), CancelError> {
        Err(CancelError::Unsupported(self.name()))
    }
}

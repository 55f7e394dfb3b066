//! Execution dispatch.
//!
//! ```text
//! look up job → overlay env → name execution → save → spawn executor
//! ```
//!
//! The caller gets the new execution back as soon as it is registered; the
//! executor runs on its own task and reports through the shared execution.

use runjobs_core::{
    merge_env, Environment, Error, Execution, ExecutionId, ExecutionSnapshot, JobName, Outcome,
    Result,
};
use runjobs_executor::Executor;
use runjobs_storage::Registry;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A freshly dispatched execution.
#[derive(Debug)]
pub struct RunHandle {
    /// Full resource name of the execution
    pub name: String,
    /// State at dispatch (always `RUNNING`)
    pub snapshot: ExecutionSnapshot,
    /// The executor task; completes once the execution is terminal
    pub task: JoinHandle<()>,
}

/// Turns run requests into executions on an executor.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<dyn Registry>,
    executor: Arc<dyn Executor>,
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new(registry: Arc<dyn Registry>, executor: Arc<dyn Executor>) -> Self {
        Self { registry, executor }
    }

    /// The backend executions are sent to.
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Start a new execution of `job_name`.
    ///
    /// `overrides` win over the job's default environment. Fails with
    /// `NotFound` (and creates nothing) if the job is not registered.
    pub async fn run(&self, job_name: &str, overrides: &Environment) -> Result<RunHandle> {
        let job = self.registry.get_job(job_name).await?;
        let env = merge_env(&job.env, overrides);

        let job_name = JobName::parse(&job.name)?;
        let execution = loop {
            let name = job_name.execution(&ExecutionId::generate());
            let execution = Arc::new(Execution::start(&name, job.clone()));
            // Registered before the task exists, so pollers never miss it.
            match self.registry.insert_execution_if_absent(execution.clone()).await {
                Ok(()) => break execution,
                Err(Error::AlreadyExists(_)) => {
                    debug!(execution = %name, "execution id collision, regenerating")
                }
                Err(e) => return Err(e),
            }
        };
        let name = execution.name().to_string();
        let snapshot = execution.snapshot().await;

        info!(
            execution = %name,
            executor = self.executor.name(),
            overrides = overrides.len(),
            "dispatching execution"
        );

        let task = tokio::spawn(supervise(self.executor.clone(), execution, env));

        Ok(RunHandle {
            name,
            snapshot,
            task,
        })
    }
}

/// Drive one execution on its own task.
///
/// A panicking backend must not leave the execution `RUNNING`, so the run is
/// nested in a second task whose panic is recorded as a failure.
async fn supervise(executor: Arc<dyn Executor>, execution: Arc<Execution>, env: Environment) {
    let run = tokio::spawn({
        let execution = execution.clone();
        async move { executor.run(execution, env).await }
    });

    if let Err(e) = run.await {
        error!(execution = %execution.name(), error = %e, "executor task aborted");
        let message = if e.is_panic() {
            "executor panicked"
        } else {
            "executor task cancelled"
        };
        execution.finish(Outcome::failed(message)).await;
    }
}

//! Job service: the operations callers use to manage jobs and executions.

use crate::{Dispatcher, RunHandle};
use runjobs_core::name::parent_name;
use runjobs_core::{
    Environment, Error, ExecutionSnapshot, Job, JobName, JobTemplate, Outcome, Result,
};
use runjobs_executor::{CancelError, Executor};
use runjobs_storage::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Jobs and executions under one `projects/{p}/locations/{r}` parent.
pub struct JobService {
    registry: Arc<dyn Registry>,
    dispatcher: Dispatcher,
    project: String,
    region: String,
}

impl JobService {
    /// Create a new job service.
    pub fn new(
        registry: Arc<dyn Registry>,
        executor: Arc<dyn Executor>,
        project: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(registry.clone(), executor),
            registry,
            project: project.into(),
            region: region.into(),
        }
    }

    /// `projects/{project}/locations/{region}`
    pub fn parent(&self) -> String {
        parent_name(&self.project, &self.region)
    }

    /// The backend executions run on.
    pub fn executor(&self) -> &Arc<dyn Executor> {
        self.dispatcher.executor()
    }

    // === Jobs ===

    /// Register a job under the configured project and region.
    pub async fn register_job(&self, job_id: &str, template: JobTemplate) -> Result<Arc<Job>> {
        self.create_job(&self.parent(), job_id, template).await
    }

    /// Create `{parent}/jobs/{job_id}`.
    pub async fn create_job(
        &self,
        parent: &str,
        job_id: &str,
        template: JobTemplate,
    ) -> Result<Arc<Job>> {
        let name = JobName::under(parent, job_id)?;
        template.validate()?;

        let job = self.registry.insert_job_if_absent(Job::new(&name, template)).await?;
        info!(job = %job.name, image = %job.image, "registered job");
        Ok(job)
    }

    /// Get a job by full name.
    pub async fn get_job(&self, name: &str) -> Result<Arc<Job>> {
        self.registry.get_job(name).await
    }

    /// List the jobs under `parent`, sorted by name; empty lists every job.
    pub async fn list_jobs(&self, parent: &str) -> Vec<Arc<Job>> {
        if parent.is_empty() {
            return self.registry.list_jobs("").await;
        }
        self.registry.list_jobs(&format!("{}/jobs/", parent)).await
    }

    /// Delete a job, returning it. Its executions are left in place.
    pub async fn delete_job(&self, name: &str) -> Result<Arc<Job>> {
        let job = self.registry.delete_job(name).await?;
        info!(job = %name, "deleted job");
        Ok(job)
    }

    /// Find a job by full name or by its trailing job id.
    pub async fn resolve_job(&self, name: &str) -> Result<Arc<Job>> {
        if name.contains('/') {
            self.registry.get_job(name).await
        } else {
            self.registry.get_job_by_short_name(name).await
        }
    }

    // === Executions ===

    /// Start an execution of a job; returns without waiting for it.
    pub async fn run_job(&self, name: &str, overrides: &Environment) -> Result<RunHandle> {
        self.dispatcher.run(name, overrides).await
    }

    /// Current state of an execution.
    pub async fn get_execution(&self, name: &str) -> Result<ExecutionSnapshot> {
        Ok(self.registry.get_execution(name).await?.snapshot().await)
    }

    /// Executions of a job, sorted by name.
    pub async fn list_executions(&self, job_name: &str) -> Vec<ExecutionSnapshot> {
        let mut snapshots = Vec::new();
        for execution in self.registry.list_executions(job_name).await {
            snapshots.push(execution.snapshot().await);
        }
        snapshots
    }

    /// Forget an execution, returning its last state.
    ///
    /// A running execution keeps running; it is just no longer reachable.
    pub async fn delete_execution(&self, name: &str) -> Result<ExecutionSnapshot> {
        let execution = self.registry.delete_execution(name).await?;
        let snapshot = execution.snapshot().await;
        if !snapshot.is_done() {
            warn!(execution = %name, "deleted execution that is still running");
        }
        Ok(snapshot)
    }

    /// Stop a running execution.
    ///
    /// - `NotFound`: no such execution
    /// - `FailedPrecondition`: not running; nothing changes
    /// - `Unsupported`: the backend cannot interrupt runs; the execution
    ///   carries on untouched
    /// - `Internal`: the backend refused; the execution carries on
    pub async fn cancel_execution(&self, name: &str) -> Result<ExecutionSnapshot> {
        let execution = self.registry.get_execution(name).await?;
        execution.request_cancel().await?;

        match self.executor().cancel(&execution).await {
            Ok(()) => {
                if execution.finish(Outcome::Cancelled).await {
                    info!(execution = %name, "cancelled execution");
                } else {
                    info!(execution = %name, "execution finished before cancel took effect");
                }
                Ok(execution.snapshot().await)
            }
            Err(CancelError::Unsupported(backend)) => {
                execution.clear_cancel_request().await;
                Err(Error::Unsupported(format!(
                    "cancel not supported for {} executor",
                    backend
                )))
            }
            Err(e) => {
                execution.clear_cancel_request().await;
                warn!(execution = %name, error = %e, "cancel failed");
                Err(Error::Internal(e.to_string()))
            }
        }
    }

    /// Poll an execution until it is terminal.
    ///
    /// Returns `None` if `timeout` elapses first.
    pub async fn wait_for_completion(
        &self,
        name: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Option<ExecutionSnapshot>> {
        let execution = self.registry.get_execution(name).await?;
        let deadline = Instant::now() + timeout;

        loop {
            let snapshot = execution.snapshot().await;
            if snapshot.is_done() {
                return Ok(Some(snapshot));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use runjobs_core::Execution;
    use runjobs_storage::MemoryRegistry;

    /// Never finishes on its own; accepts every cancel.
    struct IdleExecutor;

    #[async_trait]
    impl Executor for IdleExecutor {
        fn name(&self) -> &'static str {
            "idle"
        }

        async fn run(&self, _execution: Arc<Execution>, _env: Environment) {}

        async fn cancel(&self, _execution: &Execution) -> std::result::Result<(), CancelError> {
            Ok(())
        }
    }

    fn service() -> JobService {
        JobService::new(
            Arc::new(MemoryRegistry::new()),
            Arc::new(IdleExecutor),
            "fake-project",
            "us-central1",
        )
    }

    fn template() -> JobTemplate {
        JobTemplate::new("alpine").with_command(["echo", "hello"])
    }

    #[test]
    fn test_parent() {
        assert_eq!(service().parent(), "projects/fake-project/locations/us-central1");
    }

    #[tokio::test]
    async fn test_register_job_uses_configured_parent() {
        let svc = service();
        let job = svc.register_job("echo-job", template()).await.unwrap();
        assert_eq!(
            job.name,
            "projects/fake-project/locations/us-central1/jobs/echo-job"
        );

        let err = svc.register_job("echo-job", template()).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_create_job_validates_input() {
        let svc = service();

        let err = svc
            .create_job("projects/p", "job", template())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = svc
            .create_job("projects/p/locations/r", "a/b", template())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = svc
            .create_job("projects/p/locations/r", "empty", JobTemplate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_list_jobs_scoped_to_parent() {
        let svc = service();
        svc.create_job("projects/p/locations/r", "b", template()).await.unwrap();
        svc.create_job("projects/p/locations/r", "a", template()).await.unwrap();
        svc.create_job("projects/p/locations/r2", "c", template()).await.unwrap();

        let names: Vec<_> = svc
            .list_jobs("projects/p/locations/r")
            .await
            .iter()
            .map(|j| j.short_name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(svc.list_jobs("").await.len(), 3);
    }

    #[tokio::test]
    async fn test_resolve_job() {
        let svc = service();
        let job = svc.register_job("echo-job", template()).await.unwrap();

        assert_eq!(svc.resolve_job("echo-job").await.unwrap(), job);
        assert_eq!(svc.resolve_job(&job.name).await.unwrap(), job);
        assert!(svc.resolve_job("other").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_job() {
        let svc = service();
        let job = svc.register_job("echo-job", template()).await.unwrap();

        assert_eq!(svc.delete_job(&job.name).await.unwrap(), job);
        assert!(svc.get_job(&job.name).await.unwrap_err().is_not_found());
        assert!(svc.delete_job(&job.name).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_cancel_running_execution() {
        let svc = service();
        let job = svc.register_job("echo-job", template()).await.unwrap();
        let handle = svc.run_job(&job.name, &Environment::new()).await.unwrap();

        let snap = svc.cancel_execution(&handle.name).await.unwrap();
        assert_eq!(snap.status, runjobs_core::ExecutionStatus::Cancelled);
        assert_eq!(snap.cancelled_count, 1);
        assert!(snap.completion_time.is_some());

        let err = svc.cancel_execution(&handle.name).await.unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let svc = service();
        let job = svc.register_job("echo-job", template()).await.unwrap();
        let handle = svc.run_job(&job.name, &Environment::new()).await.unwrap();

        let waited = svc
            .wait_for_completion(&handle.name, Duration::from_millis(30), Duration::from_millis(5))
            .await
            .unwrap();
        assert!(waited.is_none());
    }

    #[tokio::test]
    async fn test_wait_on_missing_execution() {
        let err = service()
            .wait_for_completion(
                "projects/p/locations/r/jobs/j/executions/nope",
                Duration::from_millis(10),
                Duration::from_millis(5),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}

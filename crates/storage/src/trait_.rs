//! Registry trait abstraction.

use async_trait::async_trait;
use runjobs_core::{Execution, Job, Result};
use std::sync::Arc;

/// Storage for jobs and executions, keyed by full resource name.
///
/// Every method takes `&self`: implementations serialise writers internally
/// so one instance can be shared by the request path and every executor task.
#[async_trait]
pub trait Registry: Send + Sync {
    // === Job operations ===

    /// Save a job (create or replace).
    async fn save_job(&self, job: Job) -> Arc<Job>;

    /// Save a job unless one with the same name exists (`AlreadyExists`).
    async fn insert_job_if_absent(&self, job: Job) -> Result<Arc<Job>>;

    /// Load a job by full name.
    async fn get_job(&self, name: &str) -> Result<Arc<Job>>;

    /// Load a job by its trailing name segment, across all parents.
    async fn get_job_by_short_name(&self, short_name: &str) -> Result<Arc<Job>>;

    /// Delete a job by full name, returning it.
    async fn delete_job(&self, name: &str) -> Result<Arc<Job>>;

    /// List jobs whose name starts with `parent`; empty matches all.
    async fn list_jobs(&self, parent: &str) -> Vec<Arc<Job>>;

    // === Execution operations ===

    /// Save an execution (create or replace).
    async fn save_execution(&self, execution: Arc<Execution>);

    /// Save an execution unless its name is taken (`AlreadyExists`).
    async fn insert_execution_if_absent(&self, execution: Arc<Execution>) -> Result<()>;

    /// Load an execution by full name.
    async fn get_execution(&self, name: &str) -> Result<Arc<Execution>>;

    /// Delete an execution by full name, returning it.
    async fn delete_execution(&self, name: &str) -> Result<Arc<Execution>>;

    /// List executions under `{job_name}/executions/`.
    async fn list_executions(&self, job_name: &str) -> Vec<Arc<Execution>>;
}

//! In-memory registry implementation.
//!
//! Volatile by design: nothing survives the process, nothing is evicted.

use super::Registry;
use async_trait::async_trait;
use runjobs_core::name::{executions_prefix, short_name};
use runjobs_core::{Error, Execution, Job, Result};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct JobTable {
    jobs: HashMap<String, Arc<Job>>,
    /// short name → full names
    by_short_name: HashMap<String, BTreeSet<String>>,
}

impl JobTable {
    fn insert(&mut self, job: Arc<Job>) {
        self.by_short_name
            .entry(job.short_name().to_string())
            .or_default()
            .insert(job.name.clone());
        self.jobs.insert(job.name.clone(), job);
    }

    fn remove(&mut self, name: &str) -> Option<Arc<Job>> {
        let job = self.jobs.remove(name)?;
        let short = job.short_name();
        if let Some(names) = self.by_short_name.get_mut(short) {
            names.remove(name);
            if names.is_empty() {
                self.by_short_name.remove(short);
            }
        }
        Some(job)
    }
}

/// Registry backed by two maps behind read/write locks.
#[derive(Default)]
pub struct MemoryRegistry {
    jobs: RwLock<JobTable>,
    executions: RwLock<HashMap<String, Arc<Execution>>>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered jobs.
    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.jobs.len()
    }

    /// Number of stored executions.
    pub async fn execution_count(&self) -> usize {
        self.executions.read().await.len()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn save_job(&self, job: Job) -> Arc<Job> {
        let job = Arc::new(job);
        let mut table = self.jobs.write().await;
        // Replacing must not leave the old entry in the short-name index.
        table.remove(&job.name);
        table.insert(job.clone());
        debug!(job = %job.name, "saved job");
        job
    }

    async fn insert_job_if_absent(&self, job: Job) -> Result<Arc<Job>> {
        let mut table = self.jobs.write().await;
        if table.jobs.contains_key(&job.name) {
            return Err(Error::AlreadyExists(format!("job {}", job.name)));
        }
        let job = Arc::new(job);
        table.insert(job.clone());
        debug!(job = %job.name, "created job");
        Ok(job)
    }

    async fn get_job(&self, name: &str) -> Result<Arc<Job>> {
        self.jobs
            .read()
            .await
            .jobs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job {}", name)))
    }

    async fn get_job_by_short_name(&self, short: &str) -> Result<Arc<Job>> {
        let table = self.jobs.read().await;
        table
            .by_short_name
            .get(short)
            .and_then(|names| names.iter().next())
            .and_then(|name| table.jobs.get(name))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job {}", short)))
    }

    async fn delete_job(&self, name: &str) -> Result<Arc<Job>> {
        let job = self
            .jobs
            .write()
            .await
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("job {}", name)))?;
        debug!(job = %name, "deleted job");
        Ok(job)
    }

    async fn list_jobs(&self, parent: &str) -> Vec<Arc<Job>> {
        let table = self.jobs.read().await;
        let mut jobs: Vec<_> = table
            .jobs
            .values()
            .filter(|job| job.name.starts_with(parent))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        jobs
    }

    async fn save_execution(&self, execution: Arc<Execution>) {
        let name = execution.name().to_string();
        self.executions.write().await.insert(name.clone(), execution);
        debug!(execution = %name, "saved execution");
    }

    async fn insert_execution_if_absent(&self, execution: Arc<Execution>) -> Result<()> {
        let mut executions = self.executions.write().await;
        match executions.entry(execution.name().to_string()) {
            Entry::Occupied(entry) => {
                Err(Error::AlreadyExists(format!("execution {}", entry.key())))
            }
            Entry::Vacant(entry) => {
                debug!(execution = %entry.key(), "created execution");
                entry.insert(execution);
                Ok(())
            }
        }
    }

    async fn get_execution(&self, name: &str) -> Result<Arc<Execution>> {
        self.executions
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("execution {}", name)))
    }

    async fn delete_execution(&self, name: &str) -> Result<Arc<Execution>> {
        let execution = self
            .executions
            .write()
            .await
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("execution {}", name)))?;
        debug!(execution = %name, "deleted execution");
        Ok(execution)
    }

    async fn list_executions(&self, job_name: &str) -> Vec<Arc<Execution>> {
        let prefix = executions_prefix(job_name);
        let executions = self.executions.read().await;
        let mut matched: Vec<_> = executions
            .iter()
            .filter(|(name, _)| name.starts_with(&prefix))
            .map(|(_, execution)| execution.clone())
            .collect();
        matched.sort_by(|a, b| a.name().cmp(b.name()));
        matched
    }
}

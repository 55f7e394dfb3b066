//! Hierarchical resource names.
//!
//! Jobs live at `projects/{project}/locations/{location}/jobs/{job}` and their
//! executions at `{job}/executions/{execution}`. The full string is the only
//! lookup key; these types exist to build and validate it.

use crate::{Error, ExecutionId, Result};
use serde::{Deserialize, Serialize};

/// Parsed job resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobName {
    project: String,
    location: String,
    job: String,
}

impl JobName {
    /// Build a job name from its segments.
    pub fn new(
        project: impl Into<String>,
        location: impl Into<String>,
        job: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            location: location.into(),
            job: job.into(),
        }
    }

    /// Build a job name under an existing `projects/{p}/locations/{l}` parent.
    pub fn under(parent: &str, job: &str) -> Result<Self> {
        let (project, location) = parse_parent(parent)?;
        check_segment(job, "job id")?;
        Ok(Self::new(project, location, job))
    }

    /// Parse `projects/{p}/locations/{l}/jobs/{j}`.
    pub fn parse(name: &str) -> Result<Self> {
        match name.split('/').collect::<Vec<_>>().as_slice() {
            ["projects", project, "locations", location, "jobs", job]
                if !project.is_empty() && !location.is_empty() && !job.is_empty() =>
            {
                Ok(Self::new(*project, *location, *job))
            }
            _ => Err(Error::InvalidArgument(format!(
                "malformed job name: {}",
                name
            ))),
        }
    }

    /// The trailing job id segment.
    pub fn job_id(&self) -> &str {
        &self.job
    }

    /// The `projects/{p}/locations/{l}` parent.
    pub fn parent(&self) -> String {
        parent_name(&self.project, &self.location)
    }

    /// Name of an execution of this job.
    pub fn execution(&self, id: &ExecutionId) -> ExecutionName {
        ExecutionName {
            job: self.clone(),
            execution: id.to_string(),
        }
    }

    /// Prefix shared by every execution of this job.
    pub fn executions_prefix(&self) -> String {
        executions_prefix(&self.to_string())
    }
}

impl std::fmt::Display for JobName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "projects/{}/locations/{}/jobs/{}",
            self.project, self.location, self.job
        )
    }
}

impl std::str::FromStr for JobName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Parsed execution resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionName {
    job: JobName,
    execution: String,
}

impl ExecutionName {
    /// Parse `projects/{p}/locations/{l}/jobs/{j}/executions/{e}`.
    pub fn parse(name: &str) -> Result<Self> {
        let malformed = || Error::InvalidArgument(format!("malformed execution name: {}", name));

        let (job, execution) = name.rsplit_once("/executions/").ok_or_else(malformed)?;
        if execution.is_empty() || execution.contains('/') {
            return Err(malformed());
        }
        let job = JobName::parse(job).map_err(|_| malformed())?;

        Ok(Self {
            job,
            execution: execution.to_string(),
        })
    }

    /// The owning job's name.
    pub fn job(&self) -> &JobName {
        &self.job
    }

    /// The trailing execution id segment.
    pub fn execution_id(&self) -> &str {
        &self.execution
    }
}

impl std::fmt::Display for ExecutionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/executions/{}", self.job, self.execution)
    }
}

/// `projects/{project}/locations/{location}`
pub fn parent_name(project: &str, location: &str) -> String {
    format!("projects/{}/locations/{}", project, location)
}

/// `{job_name}/executions/`
pub fn executions_prefix(job_name: &str) -> String {
    format!("{}/executions/", job_name)
}

/// Last path segment of a resource name.
pub fn short_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Split a `projects/{p}/locations/{l}` parent into its segments.
pub fn parse_parent(parent: &str) -> Result<(String, String)> {
    match parent.split('/').collect::<Vec<_>>().as_slice() {
        ["projects", project, "locations", location]
            if !project.is_empty() && !location.is_empty() =>
        {
            Ok((project.to_string(), location.to_string()))
        }
        _ => Err(Error::InvalidArgument(format!("malformed parent: {}", parent))),
    }
}

fn check_segment(segment: &str, what: &str) -> Result<()> {
    if segment.is_empty() || segment.contains('/') {
        return Err(Error::InvalidArgument(format!(
            "invalid {}: {:?}",
            what, segment
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = "projects/p1/locations/us-central1/jobs/echo-job";

    #[test]
    fn test_job_name_round_trip() {
        let name = JobName::parse(JOB).unwrap();
        assert_eq!(name.job_id(), "echo-job");
        assert_eq!(name.parent(), "projects/p1/locations/us-central1");
        assert_eq!(name.to_string(), JOB);
    }

    #[test]
    fn test_job_name_rejects_malformed() {
        for bad in [
            "",
            "echo-job",
            "projects/p1/locations/us-central1/jobs/",
            "projects//locations/us-central1/jobs/a",
            "projects/p1/regions/us-central1/jobs/a",
            "projects/p1/locations/us-central1/jobs/a/extra",
        ] {
            assert!(
                matches!(JobName::parse(bad), Err(Error::InvalidArgument(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_job_name_under_parent() {
        let name = JobName::under("projects/p1/locations/us-central1", "echo-job").unwrap();
        assert_eq!(name.to_string(), JOB);

        assert!(JobName::under("projects/p1", "echo-job").is_err());
        assert!(JobName::under("projects/p1/locations/us-central1", "a/b").is_err());
    }

    #[test]
    fn test_execution_name() {
        let job = JobName::parse(JOB).unwrap();
        let exec = job.execution(&ExecutionId::from("abcd1234"));
        assert_eq!(exec.to_string(), format!("{}/executions/abcd1234", JOB));

        let parsed = ExecutionName::parse(&exec.to_string()).unwrap();
        assert_eq!(parsed, exec);
        assert_eq!(parsed.job(), &job);
        assert_eq!(parsed.execution_id(), "abcd1234");

        assert!(ExecutionName::parse(JOB).is_err());
        assert!(ExecutionName::parse(&format!("{}/executions/", JOB)).is_err());
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name(JOB), "echo-job");
        assert_eq!(short_name("echo-job"), "echo-job");
        assert_eq!(executions_prefix(JOB), format!("{}/executions/", JOB));
    }
}

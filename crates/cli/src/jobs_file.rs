//! Jobs definition file.
//!
//! ```yaml
//! jobs:
//!   - name: echo-job
//!     image: alpine:3.20
//!     command: ["echo", "hello"]
//!     env:
//!       GREETING: hello
//!     resources:
//!       cpu: "1"
//!       memory: 512Mi
//!     timeout: 600s
//! ```

use anyhow::{Context, Result};
use runjobs_core::{Environment, JobTemplate, ResourceLimits};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level document.
#[derive(Debug, Default, Deserialize)]
pub struct JobsFile {
    /// Jobs to register at startup
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
}

/// One job as written in the file.
#[derive(Debug, Clone, Deserialize)]
pub struct JobDefinition {
    /// Job id (last segment of the resource name)
    pub name: String,
    /// Container image
    #[serde(default)]
    pub image: String,
    /// Command and arguments
    #[serde(default)]
    pub command: Vec<String>,
    /// Default environment
    #[serde(default)]
    pub env: Environment,
    /// CPU / memory limits
    #[serde(default)]
    pub resources: Option<ResourceLimits>,
    /// Run time limit, e.g. `600s`, `10m`, `1h` or bare seconds
    #[serde(default)]
    pub timeout: Option<String>,
}

impl JobDefinition {
    /// Everything but the name.
    pub fn template(&self) -> JobTemplate {
        let mut template = JobTemplate::new(self.image.clone()).with_command(self.command.clone());
        template.env = self.env.clone();
        if let Some(resources) = &self.resources {
            template = template.with_resources(resources.clone());
        }
        template
    }

    /// The parsed timeout; `None` when unset or unreadable.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.as_deref().and_then(parse_duration)
    }
}

/// Read the jobs file. A missing file yields no jobs.
pub fn load(path: &Path) -> Result<JobsFile> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(JobsFile::default()),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    parse(&data).with_context(|| format!("parsing {}", path.display()))
}

fn parse(data: &str) -> Result<JobsFile> {
    // An empty document deserializes as null rather than an empty mapping.
    if data.trim().is_empty() {
        return Ok(JobsFile::default());
    }
    Ok(serde_yaml::from_str(data)?)
}

/// Parse `90`, `90s`, `15m` or `2h`.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (number, unit) = match value.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((pos, _)) => value.split_at(pos),
        None => (value, "s"),
    };
    let number: u64 = number.parse().ok()?;
    let seconds = match unit {
        "s" => number,
        "m" => number.checked_mul(60)?,
        "h" => number.checked_mul(3600)?,
        _ => return None,
    };
    Some(Duration::from_secs(seconds))
}

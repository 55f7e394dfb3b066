//! Job templates.

use crate::{Environment, Error, JobName, Result};
use serde::{Deserialize, Serialize};

/// A registered, reusable run template.
///
/// Immutable once registered; executions share it through an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Full resource name: `projects/{p}/locations/{l}/jobs/{j}`
    pub name: String,

    /// Container image reference
    pub image: String,

    /// Command and arguments
    #[serde(default)]
    pub command: Vec<String>,

    /// Default environment
    #[serde(default)]
    pub env: Environment,

    /// Optional CPU / memory limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceLimits>,
}

impl Job {
    /// Create a job from a validated name and a template.
    pub fn new(name: &JobName, template: JobTemplate) -> Self {
        Self {
            name: name.to_string(),
            image: template.image,
            command: template.command,
            env: template.env,
            resources: template.resources,
        }
    }

    /// Create a job from a raw resource name, validating its shape.
    pub fn from_name(name: &str, template: JobTemplate) -> Result<Self> {
        let name = JobName::parse(name)?;
        Ok(Self::new(&name, template))
    }

    /// The trailing job id segment of the name.
    pub fn short_name(&self) -> &str {
        crate::name::short_name(&self.name)
    }
}

/// Everything a job is made of except its name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTemplate {
    /// Container image reference
    pub image: String,

    /// Command and arguments
    #[serde(default)]
    pub command: Vec<String>,

    /// Default environment
    #[serde(default)]
    pub env: Environment,

    /// Optional CPU / memory limits
    #[serde(default)]
    pub resources: Option<ResourceLimits>,
}

impl JobTemplate {
    /// Create a template for an image.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Set the command vector.
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Add a default environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set resource limits.
    pub fn with_resources(mut self, resources: ResourceLimits) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Reject templates that can never run.
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() && self.command.is_empty() {
            return Err(Error::InvalidArgument(
                "job needs an image or a command".to_string(),
            ));
        }
        if let Some(key) = self.env.keys().find(|k| k.is_empty() || k.contains('=')) {
            return Err(Error::InvalidArgument(format!(
                "invalid environment variable name: {:?}",
                key
            )));
        }
        Ok(())
    }
}

/// Resource limits as written in job definitions, e.g. `cpu: "500m"`,
/// `memory: "512Mi"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU quantity (`"2"`, `"500m"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    /// Memory quantity (`"512Mi"`, `"4Gi"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

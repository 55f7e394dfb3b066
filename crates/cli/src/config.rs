//! Emulator settings: command-line flags with environment fallbacks.

use clap::{ArgAction, Args, ValueEnum};
use runjobs_executor::ContainerOptions;
use serde::Serialize;
use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;

/// Which backend runs executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// One Docker container per execution
    Docker,
    /// One local child process per execution
    Subprocess,
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Docker => f.write_str("docker"),
            Self::Subprocess => f.write_str("subprocess"),
        }
    }
}

/// Settings shared by every command.
#[derive(Debug, Clone, Args, Serialize)]
pub struct Settings {
    /// Jobs definition file (YAML); a missing file means no jobs
    #[arg(
        long,
        env = "JOBS_CONFIG",
        value_name = "PATH",
        default_value = "./jobs.yaml",
        global = true
    )]
    pub jobs_config: PathBuf,

    /// Execution backend
    #[arg(
        long,
        env = "EXECUTOR",
        value_enum,
        default_value_t = ExecutorKind::Docker,
        global = true
    )]
    pub executor: ExecutorKind,

    /// Log filter (error, warn, info, debug, trace or a full directive);
    /// RUST_LOG takes precedence when set
    #[arg(long, env = "LOG_LEVEL", value_name = "LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Project segment of resource names
    #[arg(long, env = "PROJECT_ID", default_value = "fake-project", global = true)]
    pub project_id: String,

    /// Location segment of resource names
    #[arg(long, env = "REGION", default_value = "us-central1", global = true)]
    pub region: String,

    /// Forward container stdout/stderr to the log
    #[arg(
        long,
        env = "FORWARD_CONTAINER_LOGS",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        value_parser = parse_switch,
        global = true
    )]
    pub forward_container_logs: bool,

    /// `auto`, `host` or a Docker network name
    #[arg(long, env = "DOCKER_NETWORK", default_value = "auto", global = true)]
    pub docker_network: String,

    /// Comma-separated `host:ip` entries added to every container
    #[arg(
        long,
        env = "DOCKER_EXTRA_HOSTS",
        value_name = "HOSTS",
        default_value = "",
        value_parser = parse_extra_hosts,
        global = true
    )]
    pub docker_extra_hosts: ExtraHosts,

    /// Expose all GPUs to containers
    #[arg(
        long,
        env = "DOCKER_GPU",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        value_parser = parse_switch,
        global = true
    )]
    pub docker_gpu: bool,
}

impl Settings {
    /// Options for the container executor.
    pub fn container_options(&self) -> ContainerOptions {
        ContainerOptions {
            forward_logs: self.forward_container_logs,
            network: self.docker_network.clone(),
            extra_hosts: self.docker_extra_hosts.0.clone(),
            gpu: self.docker_gpu,
        }
    }
}

/// Parsed `DOCKER_EXTRA_HOSTS` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExtraHosts(pub Vec<String>);

/// Split a comma-separated host list, dropping blank entries.
pub fn parse_extra_hosts(value: &str) -> Result<ExtraHosts, Infallible> {
    Ok(ExtraHosts(
        value
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(String::from)
            .collect(),
    ))
}

/// `1`, `true`, `yes` and `on` (any case) are true; anything else is false.
pub fn parse_switch(value: &str) -> Result<bool, Infallible> {
    Ok(matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    ))
}

/// Parse a `KEY=VALUE` pair; the value may itself contain `=`.
pub fn parse_env_pair(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.is_empty() => Ok((key.to_string(), val.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", value)),
    }
}

//! Docker container executor.
//!
//! Each execution gets a fresh container:
//!
//! ```text
//! create → start → [forward logs] → wait → remove
//! ```
//!
//! Create and start failures end the execution as `FAILED`. Once the
//! container exists it is always removed, whatever the outcome.

use super::limits::{parse_cpu, parse_memory};
use super::logs::forward_logs;
use super::network::{own_hostname, resolve_network, NetworkMode};
use super::r#trait::{CancelError, Executor};
use anyhow::Context;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, NetworkingConfig, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::models::{DeviceRequest, EndpointSettings, HostConfig};
use bollard::Docker;
use futures::StreamExt;
use runjobs_core::{Environment, Execution, Job, Outcome};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Emulator-wide settings applied to every spawned container.
#[derive(Debug, Clone, Default)]
pub struct ContainerOptions {
    /// Forward container stdout/stderr to the emulator's log
    pub forward_logs: bool,
    /// `host`, `auto` (or empty), or a network name
    pub network: String,
    /// `host:ip` mappings, as with `docker run --add-host`
    pub extra_hosts: Vec<String>,
    /// Expose all GPUs to containers
    pub gpu: bool,
}

/// The container operations an execution needs.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a container; returns its id.
    async fn create(&self, config: Config<String>) -> anyhow::Result<String>;

    /// Start a created container.
    async fn start(&self, id: &str) -> anyhow::Result<()>;

    /// Wait until the container is no longer running; returns its exit code.
    async fn wait(&self, id: &str) -> anyhow::Result<i64>;

    /// Ask a running container to stop.
    async fn stop(&self, id: &str) -> anyhow::Result<()>;

    /// Force-remove a container.
    async fn remove(&self, id: &str) -> anyhow::Result<()>;

    /// Follow the container's output until it closes, logging each line.
    async fn forward_logs(&self, id: String, execution: String);
}

#[async_trait]
impl ContainerRuntime for Docker {
    async fn create(&self, config: Config<String>) -> anyhow::Result<String> {
        let response = self
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await?;
        Ok(response.id)
    }

    async fn start(&self, id: &str) -> anyhow::Result<()> {
        self.start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn wait(&self, id: &str) -> anyhow::Result<i64> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut stream = self.wait_container(id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error carrying the code.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Err(anyhow::anyhow!("wait stream closed without a status")),
        }
    }

    async fn stop(&self, id: &str) -> anyhow::Result<()> {
        self.stop_container(id, None).await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> anyhow::Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.remove_container(id, Some(options)).await?;
        Ok(())
    }

    async fn forward_logs(&self, id: String, execution: String) {
        forward_logs(self.clone(), id, execution).await
    }
}

/// Settings after network resolution.
#[derive(Debug, Clone, PartialEq)]
struct ContainerSettings {
    network: NetworkMode,
    extra_hosts: Vec<String>,
    gpu: bool,
}

/// Runs executions as containers.
pub struct ContainerExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    forward_logs: bool,
    settings: ContainerSettings,
}

impl ContainerExecutor {
    /// Connect to the local Docker daemon (honours `DOCKER_HOST`) and resolve
    /// the network once.
    pub async fn connect(options: ContainerOptions) -> anyhow::Result<Self> {
        let docker = Docker::connect_with_local_defaults().context("creating docker client")?;
        Ok(Self::with_client(docker, options).await)
    }

    /// Build an executor around an existing Docker client.
    pub async fn with_client(docker: Docker, options: ContainerOptions) -> Self {
        let network = resolve_network(&options.network, &docker, own_hostname()).await;
        info!(%network, "docker executor initialised");
        Self::new(Arc::new(docker), network, options)
    }

    /// Build an executor on any runtime with an already resolved network.
    ///
    /// `options.network` is ignored in favour of `network`.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        network: NetworkMode,
        options: ContainerOptions,
    ) -> Self {
        Self {
            runtime,
            forward_logs: options.forward_logs,
            settings: ContainerSettings {
                network,
                extra_hosts: options.extra_hosts,
                gpu: options.gpu,
            },
        }
    }

    /// The network containers are attached to.
    pub fn network(&self) -> &NetworkMode {
        &self.settings.network
    }

    /// Drive the container up to its exit.
    ///
    /// Returns the outcome and, once a container exists, its id so the
    /// caller can remove it after recording the outcome.
    async fn execute(
        &self,
        execution: &Execution,
        env: &Environment,
    ) -> (Outcome, Option<String>) {
        let name = execution.name();
        let job = execution.job();

        info!(
            execution = %name,
            image = %job.image,
            network = %self.settings.network,
            "creating container"
        );

        let config = container_config(job, env, &self.settings);
        let id = match self.runtime.create(config).await {
            Ok(id) => id,
            Err(e) => {
                error!(execution = %name, error = %e, "failed to create container");
                return (Outcome::failed(format!("container create failed: {}", e)), None);
            }
        };
        execution.set_container_id(&id).await;

        info!(execution = %name, container_id = %id, "starting container");
        if let Err(e) = self.runtime.start(&id).await {
            error!(execution = %name, container_id = %id, error = %e, "failed to start container");
            return (Outcome::failed(format!("container start failed: {}", e)), Some(id));
        }

        if self.forward_logs {
            let runtime = self.runtime.clone();
            let (id, name) = (id.clone(), name.to_string());
            tokio::spawn(async move { runtime.forward_logs(id, name).await });
        }

        let outcome = match self.runtime.wait(&id).await {
            Ok(0) => {
                info!(execution = %name, container_id = %id, "container completed successfully");
                Outcome::Succeeded
            }
            Ok(code) if execution.cancel_requested().await => {
                info!(
                    execution = %name,
                    container_id = %id,
                    exit_code = code,
                    "container stopped on request"
                );
                Outcome::Cancelled
            }
            Ok(code) => {
                warn!(execution = %name, container_id = %id, exit_code = code, "container failed");
                Outcome::failed(format!("container exited with code {}", code))
            }
            Err(e) => {
                error!(
                    execution = %name,
                    container_id = %id,
                    error = %e,
                    "error waiting for container"
                );
                Outcome::failed(format!("container wait failed: {}", e))
            }
        };
        (outcome, Some(id))
    }

    async fn remove(&self, execution: &str, id: &str) {
        match self.runtime.remove(id).await {
            Ok(()) => debug!(execution, container_id = %id, "removed container"),
            Err(e) => {
                warn!(execution, container_id = %id, error = %e, "failed to remove container")
            }
        }
    }
}

#[async_trait]
impl Executor for ContainerExecutor {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn run(&self, execution: Arc<Execution>, env: Environment) {
        let (outcome, container) = self.execute(&execution, &env).await;

        // Record the outcome before cleanup so pollers are not held up by
        // the removal.
        if !execution.finish(outcome).await {
            debug!(execution = %execution.name(), "outcome already recorded");
        }
        if let Some(id) = container {
            self.remove(execution.name(), &id).await;
        }
    }

    async fn cancel(&self, execution: &Execution) -> Result<(), CancelError> {
        let id = execution
            .container_id()
            .await
            .ok_or_else(|| CancelError::NoHandle(execution.name().to_string()))?;

        info!(execution = %execution.name(), container_id = %id, "stopping container");
        self.runtime
            .stop(&id)
            .await
            .map_err(|e| CancelError::Backend(e.to_string()))
    }
}

/// Build the create request for one execution.
fn container_config(job: &Job, env: &Environment, settings: &ContainerSettings) -> Config<String> {
    let env: Vec<String> = env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

    let mut host_config = HostConfig {
        extra_hosts: (!settings.extra_hosts.is_empty()).then(|| settings.extra_hosts.clone()),
        ..Default::default()
    };

    let networking_config = match &settings.network {
        NetworkMode::Host => {
            host_config.network_mode = Some("host".to_string());
            None
        }
        NetworkMode::Network(network) => {
            host_config.network_mode = Some(network.clone());
            Some(NetworkingConfig {
                endpoints_config: HashMap::from([(network.clone(), EndpointSettings::default())]),
            })
        }
    };

    if settings.gpu {
        host_config.device_requests = Some(vec![DeviceRequest {
            driver: Some("nvidia".to_string()),
            count: Some(-1),
            capabilities: Some(vec![vec!["gpu".to_string()]]),
            ..Default::default()
        }]);
    }

    if let Some(resources) = &job.resources {
        if let Some(cpu) = &resources.cpu {
            host_config.nano_cpus = parse_cpu(cpu);
            if host_config.nano_cpus.is_none() {
                warn!(job = %job.name, cpu = %cpu, "ignoring unparseable cpu limit");
            }
        }
        if let Some(memory) = &resources.memory {
            host_config.memory = parse_memory(memory);
            if host_config.memory.is_none() {
                warn!(job = %job.name, memory = %memory, "ignoring unparseable memory limit");
            }
        }
    }

    Config {
        image: Some(job.image.clone()),
        cmd: (!job.command.is_empty()).then(|| job.command.clone()),
        env: Some(env),
        host_config: Some(host_config),
        networking_config,
        ..Default::default()
    }
}

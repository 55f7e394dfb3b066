//! Network selection for spawned containers.
//!
//! Resolved once when the container executor is built:
//!
//! - `host`: host networking
//! - empty or `auto`: join the network of the emulator's own container,
//!   found by inspecting the container named after our hostname; host
//!   networking when that fails (e.g. not running in a container)
//! - anything else: an explicit network name

use async_trait::async_trait;
use bollard::container::InspectContainerOptions;
use bollard::Docker;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Networks every Docker daemon creates.
const DEFAULT_NETWORKS: [&str; 3] = ["bridge", "host", "none"];

const INSPECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Where spawned containers are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMode {
    /// Share the host's network stack
    Host,
    /// Join a named network
    Network(String),
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Network(name) => f.write_str(name),
        }
    }
}

/// Looks up the networks a container is attached to.
#[async_trait]
pub trait ContainerInspector: Send + Sync {
    /// Names of the networks `container` is attached to.
    async fn container_networks(&self, container: &str) -> anyhow::Result<Vec<String>>;
}

#[async_trait]
impl ContainerInspector for Docker {
    async fn container_networks(&self, container: &str) -> anyhow::Result<Vec<String>> {
        let info = tokio::time::timeout(
            INSPECT_TIMEOUT,
            self.inspect_container(container, None::<InspectContainerOptions>),
        )
        .await??;

        Ok(info
            .network_settings
            .and_then(|settings| settings.networks)
            .map(|networks| networks.into_keys().collect())
            .unwrap_or_default())
    }
}

/// Resolve the configured network value to a [`NetworkMode`].
///
/// `hostname` is only consulted in auto mode; pass [`own_hostname`] in
/// production.
pub async fn resolve_network(
    configured: &str,
    inspector: &dyn ContainerInspector,
    hostname: Option<String>,
) -> NetworkMode {
    match configured {
        "host" => NetworkMode::Host,
        "" | "auto" => detect_own_network(inspector, hostname)
            .await
            .map(NetworkMode::Network)
            .unwrap_or(NetworkMode::Host),
        name => NetworkMode::Network(name.to_string()),
    }
}

/// This machine's hostname, which Docker sets to the container id.
pub fn own_hostname() -> Option<String> {
    match hostname::get() {
        Ok(name) => Some(name.to_string_lossy().into_owned()),
        Err(e) => {
            debug!(error = %e, "network auto-detect: cannot read hostname");
            None
        }
    }
}

async fn detect_own_network(
    inspector: &dyn ContainerInspector,
    hostname: Option<String>,
) -> Option<String> {
    let hostname = hostname?;

    let mut networks = match inspector.container_networks(&hostname).await {
        Ok(networks) => networks,
        Err(e) => {
            debug!(%hostname, error = %e, "network auto-detect: cannot inspect own container");
            return None;
        }
    };
    networks.sort();

    if let Some(name) = networks
        .iter()
        .find(|name| !DEFAULT_NETWORKS.contains(&name.as_str()))
    {
        info!(network = %name, "network auto-detect: found network");
        return Some(name.clone());
    }

    match networks.into_iter().next() {
        Some(name) => {
            info!(network = %name, "network auto-detect: using fallback network");
            Some(name)
        }
        None => {
            debug!("network auto-detect: no networks found on own container");
            None
        }
    }
}

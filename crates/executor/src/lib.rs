//! Executor backends
//!
//! Turn an execution into real work: a local subprocess or a Docker
//! container.

#![warn(missing_docs)]

pub mod r#trait;
pub mod process;
pub mod docker;
pub mod network;
pub mod logs;
pub mod limits;

pub use r#trait::{CancelError, Executor};
pub use process::ProcessExecutor;
pub use docker::{ContainerExecutor, ContainerOptions, ContainerRuntime};
pub use network::{resolve_network, ContainerInspector, NetworkMode};

//! runjobs core data models.
//!
//! This crate defines the job templates, executions and the execution state
//! machine shared by the registry, the executors and the dispatcher.

#![warn(missing_docs)]

// Identities and names
mod id;
pub mod name;

// Templates and run instances
mod job;
mod execution;
mod env;

// Errors
mod error;

// Re-exports
pub use id::ExecutionId;
pub use name::{ExecutionName, JobName};

pub use job::{Job, JobTemplate, ResourceLimits};
pub use execution::{Execution, ExecutionSnapshot, ExecutionStatus, Outcome};
pub use env::{merge_env, Environment};

pub use error::{Error, Result};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

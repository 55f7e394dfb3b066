//! Execution layer - dispatching runs and the job service.

#![warn(missing_docs)]

pub mod dispatcher;
pub mod service;

pub use dispatcher::{Dispatcher, RunHandle};
pub use service::JobService;

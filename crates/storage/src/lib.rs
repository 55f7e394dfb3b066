//! Registry abstraction and implementations for runjobs.
//!
//! This crate provides a trait-based registry interface for jobs and
//! executions with a volatile in-memory implementation.

#![warn(missing_docs)]

pub mod trait_;
pub mod memory;

pub use trait_::Registry;
pub use memory::MemoryRegistry;

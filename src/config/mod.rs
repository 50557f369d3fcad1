//! Job Configuration
//!
//! Provides the job parameter record, chunk-specialized derivation,
//! YAML config loading, and the persisted settings artifact that lets
//! later invocations reattach to an existing job.
//!
//! # Structure
//!
//! - [`job`]: Core config types and persistence
//! - [`validate`]: Exhaustive parameter validation

pub mod job;
pub mod validate;

pub use job::{ClusterSettings, JobConfig, JobSettings};
pub use validate::validate_config;

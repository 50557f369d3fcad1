//! chunkalign - Chunked Workflow Engine for Sequence Alignment
//!
//! Drives a large alignment job by partitioning the input reads into
//! independently schedulable chunks, advancing each chunk through an
//! ordered graph of named steps, and merging the per-chunk results. The
//! filesystem is the single source of truth for progress: every step
//! carries a completion predicate ("output artifact exists and is
//! non-empty"), so crashing and rerunning converges to the same terminal
//! state as an uninterrupted run.
//!
//! # Architecture
//!
//! - [`workflow`]: Step/Workflow definitions with topological construction
//! - [`execution`]: The engine that runs, resumes, cleans, and exports
//! - [`config`]: Job parameters, chunk derivation, settings persistence
//! - [`platform`]: Local and cluster execution behind one interface
//! - [`job`]: Pipeline assembly and the top-level orchestrator
//! - [`monitoring`]: RAM/chunk-count estimation and usage sampling
//! - [`report`]: Status rendering
//!
//! # Example
//!
//! ```rust,no_run
//! use chunkalign::{ChunkOrchestrator, JobConfig, Phase, Platform};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = JobConfig::load_file("job.yaml")?;
//!     let orchestrator =
//!         ChunkOrchestrator::create(config, Platform::Local, false, None)?;
//!     orchestrator.run(Phase::All)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod job;
pub mod monitoring;
pub mod platform;
pub mod report;
pub mod workflow;

// Re-export commonly used types
pub use config::JobConfig;
pub use error::PipelineError;
pub use execution::Engine;
pub use job::{ChunkOrchestrator, Directive, Phase};
pub use platform::Platform;
pub use workflow::{Step, Workflow};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "chunkalign";

//! Execution Platforms
//!
//! A closed set of execution substrates behind one interface. The platform
//! is selected by an explicit name mapping at startup; nothing is resolved
//! from strings at run time beyond that mapping.
//!
//! # Structure
//!
//! - [`local`]: Concurrent worker threads on the local host
//! - [`cluster`]: Submission to an external scheduler

pub mod cluster;
pub mod local;

use crate::error::PipelineError;
use crate::job::Job;

pub use cluster::ClusterAdapter;
pub use local::LocalAdapter;

/// The execution substrates this engine can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Local,
    Cluster,
}

impl Platform {
    /// Maps a platform name from the command line to a variant.
    pub fn from_name(name: &str) -> Result<Self, PipelineError> {
        match name.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "cluster" => Ok(Self::Cluster),
            other => Err(PipelineError::Configuration(vec![format!(
                "unknown platform '{}' (expected 'local' or 'cluster')",
                other
            )])),
        }
    }

    /// The canonical platform name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cluster => "cluster",
        }
    }

    /// Builds the adapter for this platform.
    ///
    /// `local_parallelism` bounds concurrent chunk workflows on the local
    /// host; the cluster adapter leaves concurrency to the scheduler.
    pub fn adapter(&self, local_parallelism: usize) -> Box<dyn PlatformAdapter> {
        match self {
            Self::Local => Box::new(LocalAdapter::new(local_parallelism)),
            Self::Cluster => Box::new(ClusterAdapter::new()),
        }
    }
}

/// Common operations every execution platform supports.
///
/// `start_parent` drives a whole job; the per-phase operations exist so a
/// single phase can be re-run or resumed. `stop` cancels whatever the
/// platform has in flight for the job.
pub trait PlatformAdapter {
    /// The platform's canonical name, for logs.
    fn name(&self) -> &'static str;

    /// Runs or submits the whole job. Local blocks until everything
    /// finishes; cluster submits and returns immediately.
    fn start_parent(&self, job: &Job) -> Result<(), PipelineError>;

    /// Runs the preprocess workflow (always in the calling invocation).
    fn preprocess(&self, job: &Job) -> Result<(), PipelineError>;

    /// Runs or submits all chunk workflows.
    fn process(&self, job: &Job) -> Result<(), PipelineError>;

    /// Runs or submits the postprocess workflow.
    fn postprocess(&self, job: &Job) -> Result<(), PipelineError>;

    /// Cancels running tasks or submitted jobs.
    fn stop(&self, job: &Job) -> Result<(), PipelineError>;
}

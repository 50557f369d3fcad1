//! Pipeline Error Taxonomy
//!
//! Error categories surfaced by the engine and orchestrator:
//!
//! - [`PipelineError::Configuration`]: invalid job parameters, collected
//!   exhaustively and reported together before any step runs
//! - [`PipelineError::ResourceShortfall`]: estimated RAM below the minimum
//! - [`PipelineError::StepFailure`]: a step's command exited non-zero
//! - [`PipelineError::Platform`]: cluster submission or cancellation failed

use thiserror::Error;

/// Errors produced while building or driving a chunked alignment job.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// One or more invalid job parameters. All problems are gathered before
    /// execution is refused, so the operator can fix them in one pass.
    #[error("invalid configuration:\n  {}", .0.join("\n  "))]
    Configuration(Vec<String>),

    /// Estimated per-chunk RAM requirement exceeds what is available.
    #[error(
        "estimated minimum RAM per chunk is {required_gb} GB but only \
         {available_gb} GB available"
    )]
    ResourceShortfall { required_gb: u64, available_gb: u64 },

    /// A step's command exited non-zero. Halts only the owning workflow.
    #[error("step '{step}' failed in {scope}: {message}")]
    StepFailure {
        step: String,
        /// Which workflow the step belongs to ("preprocess", "chunk 3", ...).
        scope: String,
        message: String,
    },

    /// Cluster submission or cancellation failed. Fatal for the invocation.
    #[error("platform error: {0}")]
    Platform(String),

    /// A phase was requested before its predecessor phase completed.
    #[error("phase ordering: {0}")]
    PhaseOrdering(String),

    /// No settings artifact found where an existing job was expected.
    #[error("no job found at '{0}' (missing settings artifact)")]
    NoSuchJob(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Convenience constructor for a single-step failure.
    pub fn step_failure(
        step: impl Into<String>,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::StepFailure {
            step: step.into(),
            scope: scope.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_lists_all_problems() {
        let err = PipelineError::Configuration(vec![
            "missing genome".to_string(),
            "missing reads".to_string(),
        ]);

        let msg = err.to_string();
        assert!(msg.contains("missing genome"));
        assert!(msg.contains("missing reads"));
    }

    #[test]
    fn test_step_failure_names_step_and_scope() {
        let err = PipelineError::step_failure("align", "chunk 2", "exit code 1");
        let msg = err.to_string();

        assert!(msg.contains("align"));
        assert!(msg.contains("chunk 2"));
    }

    #[test]
    fn test_resource_shortfall_display() {
        let err = PipelineError::ResourceShortfall {
            required_gb: 6,
            available_gb: 4,
        };

        let msg = err.to_string();
        assert!(msg.contains('6'));
        assert!(msg.contains('4'));
    }

    #[test]
    fn test_io_error_transparent() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PipelineError = io.into();
        assert!(err.to_string().contains("gone"));
    }
}

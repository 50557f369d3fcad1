//! Resource Estimation and Monitoring
//!
//! # Structure
//!
//! - [`estimator`]: Genome-size based RAM/chunk-count guidance
//! - [`resource`]: CPU/memory sampling during local execution

pub mod estimator;
pub mod resource;

pub use estimator::ResourceEstimator;
pub use resource::ResourceMonitor;

//! Configuration Validation
//!
//! Collects every configuration problem before execution is refused, so the
//! operator fixes the whole set in one pass instead of replaying the job
//! once per mistake.

use super::job::JobConfig;

/// Validates a job config, returning the full list of problems found.
///
/// An empty list means the config is runnable. Existence checks apply to
/// inputs the job consumes (genome, reads); artifacts the job produces are
/// not expected to exist yet.
pub fn validate_config(config: &JobConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if config.output_dir.as_os_str().is_empty() {
        problems.push("output_dir is not set".to_string());
    }

    if config.genome.as_os_str().is_empty() {
        problems.push("genome is not set".to_string());
    } else if !config.genome.is_file() {
        problems.push(format!(
            "genome reference not found: {}",
            config.genome.display()
        ));
    }

    if config.index.as_os_str().is_empty() {
        problems.push("index is not set".to_string());
    }

    if config.reads.is_empty() {
        problems.push("no read files configured".to_string());
    } else if config.reads.len() > 2 {
        problems.push(format!(
            "expected 1 (single-end) or 2 (paired-end) read files, got {}",
            config.reads.len()
        ));
    }
    for reads in &config.reads {
        if !reads.is_file() {
            problems.push(format!("read file not found: {}", reads.display()));
        }
    }

    if config.aligner.trim().is_empty() {
        problems.push("aligner is not set".to_string());
    }

    if let Some(annotation) = &config.annotation {
        if !annotation.is_file() {
            problems.push(format!(
                "annotation file not found: {}",
                annotation.display()
            ));
        }
    }

    if config.num_chunks == Some(0) {
        problems.push("num_chunks must be at least 1".to_string());
    }

    if config.ram_gb == Some(0) {
        problems.push("ram_gb must be at least 1".to_string());
    }

    if config.threads == 0 {
        problems.push("threads must be at least 1".to_string());
    }

    if let (Some(chunk), Some(count)) = (config.chunk, config.num_chunks) {
        if chunk >= count {
            problems.push(format!(
                "chunk index {} out of range for {} chunks",
                chunk, count
            ));
        }
    }

    problems
}

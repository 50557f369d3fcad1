//! Local Execution
//!
//! Runs chunk workflows as concurrent worker threads on the local host,
//! bounded by the estimated safe parallelism. The parent invocation blocks
//! until every dispatched workflow finishes.
//!
//! A pid file in the job's output directory lets a later `kill` invocation
//! signal a running parent; an interrupted step simply leaves its predicate
//! false and is re-attempted on the next resumed run.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::config::JobConfig;
use crate::error::PipelineError;
use crate::job::Job;
use crate::monitoring::ResourceMonitor;
use crate::platform::PlatformAdapter;

/// Interval between resource monitor samples.
const MONITOR_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Runs chunk workflows as bounded concurrent local tasks.
pub struct LocalAdapter {
    max_parallel: usize,
}

impl LocalAdapter {
    /// Creates a local adapter running at most `max_parallel` chunks at once.
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    /// Dispatches all chunk engines over a bounded worker pool.
    ///
    /// A failing chunk halts only its own workflow; sibling chunks keep
    /// running to completion, and the first failure is returned once every
    /// dispatched workflow has finished.
    fn run_chunks(&self, job: &Job) -> Result<(), PipelineError> {
        if job.chunks.is_empty() {
            return Ok(());
        }

        info!(
            "Dispatching {} chunk workflows ({} concurrent)",
            job.chunks.len(),
            self.max_parallel
        );

        let mut failures: Vec<PipelineError> = Vec::new();

        let dispatch: Result<(), PipelineError> = thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            let mut next = 0;
            let mut running = 0;

            while next < job.chunks.len() || running > 0 {
                while running < self.max_parallel && next < job.chunks.len() {
                    let engine = &job.chunks[next];
                    let tx = tx.clone();
                    let index = next;
                    scope.spawn(move || {
                        let outcome = engine.run();
                        let _ = tx.send((index, outcome));
                    });
                    running += 1;
                    next += 1;
                }

                let (index, outcome) = rx.recv().map_err(|_| {
                    PipelineError::Platform(
                        "chunk worker exited without reporting".to_string(),
                    )
                })?;
                running -= 1;

                match outcome {
                    Ok(report) => info!(
                        "chunk {} finished: {} executed, {} skipped",
                        index, report.executed, report.skipped
                    ),
                    Err(e) => {
                        error!("chunk {} failed: {}", index, e);
                        failures.push(e);
                    }
                }
            }

            Ok(())
        });

        dispatch?;

        if !failures.is_empty() {
            warn!(
                "{} of {} chunk workflows failed; rerun to resume them",
                failures.len(),
                job.chunks.len()
            );
            return Err(failures.remove(0));
        }
        Ok(())
    }
}

impl PlatformAdapter for LocalAdapter {
    fn name(&self) -> &'static str {
        "local"
    }

    fn start_parent(&self, job: &Job) -> Result<(), PipelineError> {
        write_pid_file(&job.config)?;

        let result = self
            .preprocess(job)
            .and_then(|_| self.process(job))
            .and_then(|_| {
                // Postprocess is gated on filesystem truth, not on the
                // process phase's return value.
                if !job.process_complete() {
                    return Err(PipelineError::PhaseOrdering(format!(
                        "chunks {:?} incomplete after process phase",
                        job.incomplete_chunks()
                    )));
                }
                self.postprocess(job)
            });

        clear_pid_file(&job.config);
        result
    }

    fn preprocess(&self, job: &Job) -> Result<(), PipelineError> {
        job.preprocess.run().map(|_| ())
    }

    fn process(&self, job: &Job) -> Result<(), PipelineError> {
        write_pid_file(&job.config)?;

        let monitor_running = Arc::new(AtomicBool::new(true));
        let monitor_flag = Arc::clone(&monitor_running);
        let monitor_handle = thread::spawn(move || {
            let mut monitor = ResourceMonitor::new();
            while monitor_flag.load(Ordering::Relaxed) {
                monitor.sample();
                thread::sleep(MONITOR_SAMPLE_INTERVAL);
            }
            monitor
        });

        let result = self.run_chunks(job);

        monitor_running.store(false, Ordering::Relaxed);
        if let Ok(monitor) = monitor_handle.join() {
            info!("Resource usage: {}", monitor.summary());
        }
        clear_pid_file(&job.config);

        result
    }

    fn postprocess(&self, job: &Job) -> Result<(), PipelineError> {
        job.postprocess.run().map(|_| ())
    }

    fn stop(&self, job: &Job) -> Result<(), PipelineError> {
        let pid_file = job.config.pid_file();
        let Ok(content) = fs::read_to_string(&pid_file) else {
            info!("No pid file at {}; nothing to stop", pid_file.display());
            return Ok(());
        };

        let pid = content.trim();
        info!("Stopping local job (pid {})", pid);

        let status = std::process::Command::new("kill").arg(pid).status();
        match status {
            Ok(status) if status.success() => info!("Signalled pid {}", pid),
            Ok(_) => warn!("kill reported failure for pid {} (already gone?)", pid),
            Err(e) => warn!("failed to invoke kill for pid {}: {}", pid, e),
        }

        clear_pid_file(&job.config);
        Ok(())
    }
}

/// Records the parent pid so a later invocation can signal it.
fn write_pid_file(config: &JobConfig) -> Result<(), PipelineError> {
    fs::create_dir_all(&config.output_dir)?;
    fs::write(config.pid_file(), std::process::id().to_string())?;
    Ok(())
}

fn clear_pid_file(config: &JobConfig) {
    let path = config.pid_file();
    if path.exists() {
        if let Err(e) = fs::remove_file(&path) {
            warn!("Failed to remove pid file {}: {}", path.display(), e);
        }
    }
}

/// True when a pid file is present (a parent may be running).
pub fn pid_file_present(output_dir: &Path) -> bool {
    output_dir.join("job.pid").is_file()
}

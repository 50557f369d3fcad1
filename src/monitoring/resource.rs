//! Resource Usage Sampling
//!
//! Samples CPU and memory of the running pipeline process during local
//! execution. Purely observational: the numbers end up in the completion
//! summary and the debug log, nothing schedules off them.

use std::time::{Duration, Instant};

use sysinfo::{get_current_pid, Pid, ProcessRefreshKind, System};

/// One resource usage sample.
#[derive(Debug, Clone)]
pub struct ResourceSample {
    /// CPU usage percentage of the pipeline process (0-100+).
    pub cpu_usage: f32,
    /// Resident memory of the pipeline process, in megabytes.
    pub process_mb: u64,
}

/// Periodic sampler for the current process.
///
/// The first `sample()` call only warms up sysinfo's CPU accounting (a
/// measurement needs two reads); later calls are rate-limited.
pub struct ResourceMonitor {
    system: System,
    pid: Pid,
    samples: Vec<ResourceSample>,
    warmed_up: bool,
    last_sample: Option<Instant>,
    min_interval: Duration,
}

impl ResourceMonitor {
    /// Creates a monitor for the current process.
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: get_current_pid().expect("current pid is always resolvable"),
            samples: Vec::new(),
            warmed_up: false,
            last_sample: None,
            min_interval: Duration::from_millis(250),
        }
    }

    /// Sets the minimum interval between recorded samples.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Takes a sample, if the rate limit allows.
    pub fn sample(&mut self) {
        let now = Instant::now();
        let refresh = ProcessRefreshKind::new().with_cpu().with_memory();

        if !self.warmed_up {
            self.system.refresh_processes_specifics(refresh);
            self.warmed_up = true;
            self.last_sample = Some(now);
            return;
        }

        if let Some(last) = self.last_sample {
            if now.duration_since(last) < self.min_interval {
                return;
            }
        }

        self.system.refresh_processes_specifics(refresh);
        self.last_sample = Some(now);

        if let Some(process) = self.system.process(self.pid) {
            self.samples.push(ResourceSample {
                cpu_usage: process.cpu_usage(),
                process_mb: process.memory() / (1024 * 1024),
            });
        }
    }

    /// Peak resident memory over all samples, in MB.
    pub fn peak_memory_mb(&self) -> u64 {
        self.samples.iter().map(|s| s.process_mb).max().unwrap_or(0)
    }

    /// Mean CPU usage over all samples.
    pub fn average_cpu(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|s| s.cpu_usage).sum::<f32>() / self.samples.len() as f32
    }

    /// All recorded samples.
    pub fn samples(&self) -> &[ResourceSample] {
        &self.samples
    }

    /// Human-readable usage summary for the completion report.
    pub fn summary(&self) -> String {
        if self.samples.is_empty() {
            return "no resource data collected".to_string();
        }
        format!(
            "average CPU {:.1}%, peak memory {} MB over {} samples",
            self.average_cpu(),
            self.peak_memory_mb(),
            self.samples.len()
        )
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

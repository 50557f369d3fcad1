//! Cluster Execution
//!
//! Submits chunk workflows to an external scheduler instead of running
//! them in-process. The submitting invocation runs preprocess itself, then
//! submits one job per chunk plus a postprocess job declared dependent on
//! all chunk jobs, records the returned ids, and returns without blocking.
//!
//! Each submitted chunk job re-invokes this binary with `process --chunk i`
//! against the job's output directory; that invocation reattaches to the
//! persisted settings and executes the one chunk workflow locally. The
//! postprocess job re-invokes with `postprocess`, which re-verifies chunk
//! completion against the filesystem before running, so ordering holds even
//! if the scheduler's dependency handling is loose.
//!
//! Submission failure is surfaced immediately and is fatal for the
//! invocation; it is never silently retried.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use log::{info, warn};

use crate::config::JobConfig;
use crate::error::PipelineError;
use crate::job::Job;
use crate::platform::PlatformAdapter;

/// Submits chunk and postprocess workflows to an external scheduler.
pub struct ClusterAdapter;

impl ClusterAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Submits every chunk job, returning the scheduler ids in chunk order.
    fn submit_chunks(&self, job: &Job) -> Result<Vec<String>, PipelineError> {
        let mut ids = Vec::with_capacity(job.chunk_count());
        for index in 0..job.chunk_count() {
            let script = write_submit_script(
                &job.config,
                &format!("chunk_{}", index),
                &format!(
                    "{exe} {dir} process --chunk {index}",
                    exe = current_exe_string(),
                    dir = job.config.output_dir.display(),
                    index = index
                ),
            )?;
            let id = submit(&job.config, &script, &[])?;
            info!("chunk {} submitted as job {}", index, id);
            ids.push(id);
        }
        Ok(ids)
    }

    /// Submits the postprocess job, optionally dependent on `chunk_ids`.
    fn submit_postprocess(
        &self,
        job: &Job,
        chunk_ids: &[String],
    ) -> Result<String, PipelineError> {
        let script = write_submit_script(
            &job.config,
            "postprocess",
            &format!(
                "{exe} {dir} postprocess --platform local",
                exe = current_exe_string(),
                dir = job.config.output_dir.display()
            ),
        )?;
        let id = submit(&job.config, &script, chunk_ids)?;
        info!("postprocess submitted as job {}", id);
        Ok(id)
    }
}

impl Default for ClusterAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformAdapter for ClusterAdapter {
    fn name(&self) -> &'static str {
        "cluster"
    }

    fn start_parent(&self, job: &Job) -> Result<(), PipelineError> {
        // Preprocess must fully complete before any chunk job can read its
        // split input, so it runs here in the submitting invocation.
        self.preprocess(job)?;

        let chunk_ids = self.submit_chunks(job)?;
        let post_id = self.submit_postprocess(job, &chunk_ids)?;

        let mut all_ids = chunk_ids;
        all_ids.push(post_id);
        record_job_ids(&job.config, &all_ids, false)?;

        info!(
            "Submitted {} jobs; this invocation returns without waiting",
            all_ids.len()
        );
        Ok(())
    }

    fn preprocess(&self, job: &Job) -> Result<(), PipelineError> {
        job.preprocess.run().map(|_| ())
    }

    fn process(&self, job: &Job) -> Result<(), PipelineError> {
        let ids = self.submit_chunks(job)?;
        record_job_ids(&job.config, &ids, true)
    }

    fn postprocess(&self, job: &Job) -> Result<(), PipelineError> {
        let id = self.submit_postprocess(job, &[])?;
        record_job_ids(&job.config, &[id], true)
    }

    fn stop(&self, job: &Job) -> Result<(), PipelineError> {
        let ids_file = job.config.job_ids_file();
        let Ok(content) = fs::read_to_string(&ids_file) else {
            info!("No submitted jobs recorded at {}", ids_file.display());
            return Ok(());
        };

        for id in content.lines().filter(|l| !l.trim().is_empty()) {
            let status = Command::new(&job.config.cluster.cancel_cmd)
                .arg(id.trim())
                .status();
            match status {
                Ok(status) if status.success() => info!("cancelled job {}", id),
                Ok(_) => warn!("cancel reported failure for job {} (already done?)", id),
                Err(e) => {
                    return Err(PipelineError::Platform(format!(
                        "failed to invoke '{}': {}",
                        job.config.cluster.cancel_cmd, e
                    )))
                }
            }
        }

        if let Err(e) = fs::remove_file(&ids_file) {
            warn!("Failed to remove {}: {}", ids_file.display(), e);
        }
        Ok(())
    }
}

/// The current executable path as a string, for re-invoking this binary
/// from a generated submit script. Falls back to the binary name if the
/// path cannot be determined.
fn current_exe_string() -> String {
    std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "chunkalign".to_string())
}

/// Writes a one-command submission script into the job's cluster directory.
fn write_submit_script(
    config: &JobConfig,
    name: &str,
    command: &str,
) -> Result<PathBuf, PipelineError> {
    let dir = config.cluster_dir();
    fs::create_dir_all(&dir)?;

    let path = dir.join(format!("{}.sh", name));
    let mut file = File::create(&path)?;
    writeln!(file, "#!/bin/bash")?;
    writeln!(file, "set -e")?;
    writeln!(file, "{}", command)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    }

    Ok(path)
}

/// Runs the configured submit command for one script and parses the job id.
///
/// A non-zero exit is a fatal platform error for this invocation.
fn submit(
    config: &JobConfig,
    script: &PathBuf,
    depend_ids: &[String],
) -> Result<String, PipelineError> {
    let cluster = &config.cluster;
    let mut cmd = Command::new(&cluster.submit_cmd);

    for opt in cluster.submit_opts.split_whitespace() {
        cmd.arg(opt);
    }
    if !depend_ids.is_empty() {
        let flag = cluster.depend_flag.replace("{ids}", &depend_ids.join(":"));
        for part in flag.split_whitespace() {
            cmd.arg(part);
        }
    }
    cmd.arg(script);

    let output = cmd.output().map_err(|e| {
        PipelineError::Platform(format!(
            "failed to invoke submit command '{}': {}",
            cluster.submit_cmd, e
        ))
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::Platform(format!(
            "submission of {} failed with {:?}: {}",
            script.display(),
            output.status.code(),
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_job_id(&stdout).ok_or_else(|| {
        PipelineError::Platform(format!(
            "submit command printed no job id for {}",
            script.display()
        ))
    })
}

/// Extracts the job id from submit-command output.
///
/// Takes the last whitespace token of the first non-empty line, which
/// covers both PBS (`1234.head-node`) and Slurm (`Submitted batch job
/// 1234`) conventions.
fn parse_job_id(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find(|line| !line.trim().is_empty())?
        .split_whitespace()
        .last()
        .map(str::to_string)
}

/// Appends or overwrites the record of submitted job ids.
fn record_job_ids(
    config: &JobConfig,
    ids: &[String],
    append: bool,
) -> Result<(), PipelineError> {
    fs::create_dir_all(config.cluster_dir())?;
    let path = config.job_ids_file();

    let mut content = if append {
        fs::read_to_string(&path).unwrap_or_default()
    } else {
        String::new()
    };
    for id in ids {
        content.push_str(id);
        content.push('\n');
    }
    fs::write(&path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterSettings;
    use crate::execution::Engine;
    use crate::workflow::{Step, Workflow};
    use std::path::Path;
    use tempfile::tempdir;

    fn test_config(dir: &Path, submit_cmd: &str) -> JobConfig {
        JobConfig {
            output_dir: dir.to_path_buf(),
            genome: dir.join("genome.fa"),
            index: dir.join("genome.idx"),
            reads: vec![dir.join("left.fq")],
            aligner: "bowtie2".to_string(),
            aligner_opts: String::new(),
            annotation: None,
            num_chunks: Some(2),
            ram_gb: None,
            threads: 1,
            cluster: ClusterSettings {
                submit_cmd: submit_cmd.to_string(),
                cancel_cmd: "true".to_string(),
                depend_flag: "-W depend=afterok:{ids}".to_string(),
                submit_opts: String::new(),
            },
            chunk: None,
        }
    }

    fn test_job(dir: &Path, submit_cmd: &str) -> Job {
        let config = test_config(dir, submit_cmd);
        let pre_out = dir.join("pre.out");
        let preprocess = Engine::new(
            Workflow::from_steps(vec![Step::new(
                "split",
                format!("echo split > {}", pre_out.display()),
            )
            .with_output(&pre_out)])
            .unwrap(),
            "preprocess",
        );
        let chunks = (0..2)
            .map(|index| {
                Engine::new(
                    Workflow::from_steps(vec![Step::new("work", "true")
                        .with_output(dir.join(format!("c{}.out", index)))])
                    .unwrap(),
                    format!("chunk {}", index),
                )
            })
            .collect();
        let postprocess = Engine::new(
            Workflow::from_steps(vec![Step::new("merge", "true")
                .with_output(dir.join("merged.out"))])
            .unwrap(),
            "postprocess",
        );

        Job {
            config,
            preprocess,
            chunks,
            postprocess,
        }
    }

    #[test]
    fn test_parse_job_id_pbs() {
        assert_eq!(parse_job_id("1234.head-node\n"), Some("1234.head-node".into()));
    }

    #[test]
    fn test_parse_job_id_slurm() {
        assert_eq!(
            parse_job_id("Submitted batch job 5678\n"),
            Some("5678".into())
        );
    }

    #[test]
    fn test_parse_job_id_skips_blank_lines() {
        assert_eq!(parse_job_id("\n\n42\n"), Some("42".into()));
        assert_eq!(parse_job_id("   \n"), None);
    }

    #[test]
    fn test_write_submit_script_content() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), "echo");

        let path = write_submit_script(&config, "chunk_0", "chunkalign /out process --chunk 0")
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("#!/bin/bash"));
        assert!(content.contains("set -e"));
        assert!(content.contains("process --chunk 0"));
        assert!(path.starts_with(config.cluster_dir()));
    }

    #[test]
    fn test_start_parent_submits_and_records_ids() {
        let dir = tempdir().unwrap();
        // `echo` stands in for the scheduler: it prints its argument (the
        // script path), which the id parser then treats as the job id.
        let job = test_job(dir.path(), "echo");
        let adapter = ClusterAdapter::new();

        adapter.start_parent(&job).unwrap();

        // Preprocess ran here in the submitting invocation.
        assert!(job.preprocess_complete());

        // Two chunk jobs plus the dependent postprocess job.
        let ids = fs::read_to_string(job.config.job_ids_file()).unwrap();
        assert_eq!(ids.lines().count(), 3);
        // Chunk workflows were not executed locally.
        assert!(!job.process_complete());
    }

    #[test]
    fn test_submission_failure_is_fatal() {
        let dir = tempdir().unwrap();
        let job = test_job(dir.path(), "false");
        let adapter = ClusterAdapter::new();

        let err = adapter.process(&job).unwrap_err();
        assert!(matches!(err, PipelineError::Platform(_)));
        // No partial id record for the failed submission run.
        assert!(!job.config.job_ids_file().exists());
    }

    #[test]
    fn test_depend_flag_expansion() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), "echo");
        let script = write_submit_script(&config, "postprocess", "true").unwrap();

        // With `echo` as the scheduler the full argv comes back on stdout;
        // the last token is still the script path.
        let id = submit(
            &config,
            &script,
            &["11".to_string(), "22".to_string()],
        )
        .unwrap();
        assert!(id.ends_with("postprocess.sh"));
    }

    #[test]
    fn test_stop_without_record_is_noop() {
        let dir = tempdir().unwrap();
        let job = test_job(dir.path(), "echo");

        assert!(ClusterAdapter::new().stop(&job).is_ok());
    }

    #[test]
    fn test_stop_cancels_recorded_ids() {
        let dir = tempdir().unwrap();
        let job = test_job(dir.path(), "echo");
        record_job_ids(&job.config, &["1".into(), "2".into()], false).unwrap();

        ClusterAdapter::new().stop(&job).unwrap();

        assert!(!job.config.job_ids_file().exists());
    }

    #[test]
    fn test_record_job_ids_append() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), "echo");

        record_job_ids(&config, &["1".into()], false).unwrap();
        record_job_ids(&config, &["2".into()], true).unwrap();

        let content = fs::read_to_string(config.job_ids_file()).unwrap();
        assert_eq!(content, "1\n2\n");
    }
}

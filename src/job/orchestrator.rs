//! Chunk Orchestrator
//!
//! The top-level driver of one chunked alignment job. On creation it
//! validates the configuration exhaustively, runs the RAM check, decides
//! the chunk count, assembles the per-chunk workflows, and persists the
//! settings artifact; later invocations reattach through that artifact
//! instead of recreating the job.
//!
//! Phase ordering is enforced here against filesystem truth: the process
//! phase refuses to start until preprocess is complete, and postprocess
//! refuses until every chunk workflow reports every step complete. Because
//! the checks re-evaluate completion predicates rather than trusting any
//! return signal, they hold across process restarts and across the
//! local/cluster boundary.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{validate_config, JobConfig, JobSettings};
use crate::error::PipelineError;
use crate::job::pipeline::{build_job, Job};
use crate::monitoring::estimator::{detected_ram_gb, ResourceEstimator, ShortfallConfirm};
use crate::platform::{Platform, PlatformAdapter};
use crate::report::StatusReporter;

/// Fallback local parallelism when the genome cannot be sized on attach.
const DEFAULT_LOCAL_PARALLEL: usize = 4;

/// Which part of the job to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Preprocess,
    Process,
    Postprocess,
    All,
}

/// A parsed command-line directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Run(Phase),
    Save,
    Status,
    Kill,
    Clean { deep: bool },
    Script,
    Diagram,
}

impl Directive {
    /// Maps a directive name to its variant.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "run" | "all" => Some(Self::Run(Phase::All)),
            "preprocess" => Some(Self::Run(Phase::Preprocess)),
            "process" => Some(Self::Run(Phase::Process)),
            "postprocess" => Some(Self::Run(Phase::Postprocess)),
            "save" => Some(Self::Save),
            "status" => Some(Self::Status),
            "kill" => Some(Self::Kill),
            "clean" => Some(Self::Clean { deep: false }),
            "veryclean" => Some(Self::Clean { deep: true }),
            "script" => Some(Self::Script),
            "diagram" => Some(Self::Diagram),
            _ => None,
        }
    }

    /// True when this directive only inspects or edits persisted state and
    /// must never invoke a step action.
    pub fn is_passive(&self) -> bool {
        !matches!(self, Self::Run(_))
    }
}

/// Drives one job across its phases and directives.
#[derive(Debug)]
pub struct ChunkOrchestrator {
    job: Job,
    platform: Platform,
    local_parallelism: usize,
}

impl ChunkOrchestrator {
    /// Creates a new job from a validated config and persists its settings.
    ///
    /// Configuration problems are collected exhaustively and reported
    /// together; nothing runs until the config is clean. The RAM check asks
    /// `confirm` on shortfall, or aborts when no callback is given
    /// (non-interactive contexts).
    pub fn create(
        config: JobConfig,
        platform: Platform,
        dry_run: bool,
        confirm: Option<ShortfallConfirm>,
    ) -> Result<Self, PipelineError> {
        let problems = validate_config(&config);
        if !problems.is_empty() {
            return Err(PipelineError::Configuration(problems));
        }

        let estimator = ResourceEstimator::from_genome(&config.genome)?;
        let total_ram = detected_ram_gb().max(1);
        let local_parallelism = estimator.safe_parallelism(total_ram);

        let num_chunks = match config.num_chunks {
            Some(n) => n,
            None => {
                let suggested = estimator.suggested_chunks(total_ram);
                info!(
                    "No chunk count configured; estimator suggests {} for a \
                     {} GB minimum per chunk",
                    suggested,
                    estimator.min_ram_gb()
                );
                suggested
            }
        };

        let per_chunk_ram = config
            .ram_gb
            .unwrap_or(total_ram / local_parallelism as u64);
        estimator.check_ram(per_chunk_ram, confirm)?;

        // Pin the resolved chunk count so reattached invocations rebuild
        // the exact same chunk layout.
        let mut config = config;
        config.num_chunks = Some(num_chunks);

        let job = build_job(&config, num_chunks, dry_run)?;
        JobSettings::save(&config)?;

        info!(
            "Job created: {} chunks, platform '{}', {} concurrent locally",
            num_chunks,
            platform.name(),
            local_parallelism
        );

        Ok(Self {
            job,
            platform,
            local_parallelism,
        })
    }

    /// Reattaches to an existing job through its settings artifact.
    pub fn attach(
        output_dir: &Path,
        platform: Platform,
        dry_run: bool,
    ) -> Result<Self, PipelineError> {
        let settings = JobSettings::load(output_dir)?;
        let config = settings.config;
        let num_chunks = config.num_chunks.unwrap_or(1);

        let local_parallelism = match ResourceEstimator::from_genome(&config.genome) {
            Ok(estimator) => estimator.safe_parallelism(detected_ram_gb().max(1)),
            Err(e) => {
                warn!(
                    "Cannot size genome while attaching ({}); defaulting to \
                     {} concurrent chunks",
                    e, DEFAULT_LOCAL_PARALLEL
                );
                DEFAULT_LOCAL_PARALLEL.min(num_cpus::get()).max(1)
            }
        };

        let job = build_job(&config, num_chunks, dry_run)?;
        Ok(Self {
            job,
            platform,
            local_parallelism,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_job(job: Job, platform: Platform, local_parallelism: usize) -> Self {
        Self {
            job,
            platform,
            local_parallelism,
        }
    }

    /// The assembled job.
    pub fn job(&self) -> &Job {
        &self.job
    }

    fn adapter(&self) -> Box<dyn PlatformAdapter> {
        self.platform.adapter(self.local_parallelism)
    }

    /// Runs one phase (or all) on the active platform.
    ///
    /// Phase gates are verified against completion predicates, so a
    /// re-run or a resume converges regardless of what earlier
    /// invocations managed to finish.
    pub fn run(&self, phase: Phase) -> Result<(), PipelineError> {
        let adapter = self.adapter();
        info!("Running phase {:?} on platform '{}'", phase, adapter.name());

        match phase {
            Phase::All => adapter.start_parent(&self.job),
            Phase::Preprocess => adapter.preprocess(&self.job),
            Phase::Process => {
                self.require_preprocess_complete()?;
                adapter.process(&self.job)
            }
            Phase::Postprocess => {
                self.require_process_complete()?;
                adapter.postprocess(&self.job)
            }
        }
    }

    /// Executes exactly one chunk's workflow locally.
    ///
    /// This is the reattach path for an invocation running inside a
    /// submitted cluster job.
    pub fn run_chunk(&self, index: usize) -> Result<(), PipelineError> {
        self.require_preprocess_complete()?;

        let engine = self.job.chunks.get(index).ok_or_else(|| {
            PipelineError::Configuration(vec![format!(
                "chunk index {} out of range for {} chunks",
                index,
                self.job.chunk_count()
            )])
        })?;

        info!("Running chunk {} inside a submitted job", index);
        engine.run().map(|_| ())
    }

    /// Persists the settings artifact.
    pub fn save(&self) -> Result<PathBuf, PipelineError> {
        JobSettings::save(&self.job.config)
    }

    /// Renders the status display.
    pub fn status(&self) -> String {
        StatusReporter::new(&self.job).render()
    }

    /// Cancels running tasks or submitted jobs via the active platform.
    pub fn kill(&self) -> Result<(), PipelineError> {
        self.adapter().stop(&self.job)
    }

    /// Removes step artifacts; `deep` removes precious ones too.
    pub fn clean(&self, deep: bool) -> usize {
        self.job.clean(deep)
    }

    /// The whole-job standalone shell script.
    pub fn shell_script(&self) -> String {
        self.job.shell_script()
    }

    /// The whole-job DOT diagram.
    pub fn diagram(&self) -> String {
        self.job.diagram()
    }

    fn require_preprocess_complete(&self) -> Result<(), PipelineError> {
        if !self.job.preprocess_complete() {
            return Err(PipelineError::PhaseOrdering(
                "preprocess has not completed; run the preprocess phase first".to_string(),
            ));
        }
        Ok(())
    }

    fn require_process_complete(&self) -> Result<(), PipelineError> {
        let incomplete = self.job.incomplete_chunks();
        if !incomplete.is_empty() {
            return Err(PipelineError::PhaseOrdering(format!(
                "chunks {:?} are not complete; postprocess refused",
                incomplete
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterSettings;
    use crate::execution::Engine;
    use crate::workflow::{Step, Workflow};
    use std::fs;
    use tempfile::tempdir;

    fn test_config(dir: &Path) -> JobConfig {
        let genome = dir.join("genome.fa");
        let reads = dir.join("left.fq");
        fs::write(&genome, ">chr1\nACGTACGT\n").unwrap();
        fs::write(&reads, "@r1\nACGT\n+\nIIII\n").unwrap();

        JobConfig {
            output_dir: dir.join("out"),
            genome,
            index: dir.join("genome.idx"),
            reads: vec![reads],
            aligner: "bowtie2".to_string(),
            aligner_opts: String::new(),
            annotation: None,
            num_chunks: Some(2),
            ram_gb: Some(64),
            threads: 1,
            cluster: ClusterSettings::default(),
            chunk: None,
        }
    }

    /// Job with traced echo workflows: preprocess writes one artifact, each
    /// chunk runs work → finish, postprocess merges.
    fn traced_job(dir: &Path) -> Job {
        let config = test_config(dir);
        fs::create_dir_all(&config.output_dir).unwrap();
        let out = config.output_dir.clone();
        let log = out.join("trace.log");

        let traced = |scope: &str, name: &str, artifact: PathBuf, log: &Path| {
            Step::new(
                name,
                format!(
                    "echo {scope}/{name} >> {log} && echo done > {artifact}",
                    scope = scope,
                    name = name,
                    log = log.display(),
                    artifact = artifact.display()
                ),
            )
            .with_output(artifact)
        };

        let preprocess = Engine::new(
            Workflow::from_steps(vec![traced("pre", "split", out.join("split.out"), &log)])
                .unwrap(),
            "preprocess",
        );

        let chunks = (0..2)
            .map(|i| {
                let scope = format!("chunk{}", i);
                Engine::new(
                    Workflow::from_steps(vec![
                        traced(&scope, "work", out.join(format!("work.c{}.out", i)), &log),
                        traced(&scope, "finish", out.join(format!("finish.c{}.out", i)), &log)
                            .depends_on("work"),
                    ])
                    .unwrap(),
                    format!("chunk {}", i),
                )
            })
            .collect();

        let postprocess = Engine::new(
            Workflow::from_steps(vec![traced("post", "merge", out.join("merged.out"), &log)])
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

    fn trace(job: &Job) -> Vec<String> {
        fs::read_to_string(job.config.output_dir.join("trace.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_create_rejects_bad_config_with_all_problems() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.genome = "/nonexistent/genome.fa".into();
        config.threads = 0;

        let err =
            ChunkOrchestrator::create(config, Platform::Local, false, None).unwrap_err();

        match err {
            PipelineError::Configuration(problems) => {
                assert!(problems.len() >= 2, "got: {:?}", problems);
            }
            other => panic!("expected Configuration, got {:?}", other),
        }
    }

    #[test]
    fn test_create_persists_settings_with_pinned_chunks() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.num_chunks = None; // let the estimator decide

        let orchestrator =
            ChunkOrchestrator::create(config, Platform::Local, false, None).unwrap();

        let settings = JobSettings::load(&orchestrator.job().config.output_dir).unwrap();
        assert_eq!(
            settings.config.num_chunks,
            Some(orchestrator.job().chunk_count())
        );
        assert!(orchestrator.job().chunk_count() >= 1);
    }

    #[test]
    fn test_attach_rebuilds_same_chunk_layout() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let output_dir = config.output_dir.clone();

        let created =
            ChunkOrchestrator::create(config, Platform::Local, false, None).unwrap();
        let attached =
            ChunkOrchestrator::attach(&output_dir, Platform::Local, false).unwrap();

        assert_eq!(created.job().chunk_count(), attached.job().chunk_count());
    }

    #[test]
    fn test_attach_without_settings_fails() {
        let dir = tempdir().unwrap();
        let result = ChunkOrchestrator::attach(dir.path(), Platform::Local, false);
        assert!(matches!(result, Err(PipelineError::NoSuchJob(_))));
    }

    #[test]
    fn test_process_refused_before_preprocess() {
        let dir = tempdir().unwrap();
        let orchestrator =
            ChunkOrchestrator::with_job(traced_job(dir.path()), Platform::Local, 2);

        let err = orchestrator.run(Phase::Process).unwrap_err();
        assert!(matches!(err, PipelineError::PhaseOrdering(_)));
        assert!(trace(orchestrator.job()).is_empty());
    }

    #[test]
    fn test_postprocess_refused_until_all_chunks_complete() {
        let dir = tempdir().unwrap();
        let orchestrator =
            ChunkOrchestrator::with_job(traced_job(dir.path()), Platform::Local, 2);

        orchestrator.run(Phase::Preprocess).unwrap();
        orchestrator.run(Phase::Process).unwrap();

        // Knock out chunk 1's final artifact: postprocess must refuse.
        let finish = orchestrator.job().config.output_dir.join("finish.c1.out");
        fs::remove_file(&finish).unwrap();

        let err = orchestrator.run(Phase::Postprocess).unwrap_err();
        match err {
            PipelineError::PhaseOrdering(message) => assert!(message.contains("[1]")),
            other => panic!("expected PhaseOrdering, got {:?}", other),
        }
    }

    #[test]
    fn test_two_chunk_scenario_selective_rerun() {
        let dir = tempdir().unwrap();
        let orchestrator =
            ChunkOrchestrator::with_job(traced_job(dir.path()), Platform::Local, 2);

        orchestrator.run(Phase::Preprocess).unwrap();
        orchestrator.run(Phase::Process).unwrap();

        let after_first: Vec<String> = trace(orchestrator.job());
        assert_eq!(after_first.len(), 5); // split + 2 steps × 2 chunks

        // Delete chunk 1's final-step artifact and rerun the process phase:
        // only chunk 1's final step re-executes.
        fs::remove_file(orchestrator.job().config.output_dir.join("finish.c1.out")).unwrap();
        orchestrator.run(Phase::Process).unwrap();

        let after_second = trace(orchestrator.job());
        assert_eq!(after_second.len(), 6);
        assert_eq!(after_second[5], "chunk1/finish");

        // With both chunks fully complete, postprocess now succeeds.
        orchestrator.run(Phase::Postprocess).unwrap();
        assert!(orchestrator.job().postprocess_complete());
    }

    #[test]
    fn test_full_run_converges_to_same_state_as_phased_run() {
        let dir = tempdir().unwrap();
        let orchestrator =
            ChunkOrchestrator::with_job(traced_job(dir.path()), Platform::Local, 2);

        orchestrator.run(Phase::All).unwrap();

        assert!(orchestrator.job().preprocess_complete());
        assert!(orchestrator.job().process_complete());
        assert!(orchestrator.job().postprocess_complete());

        // Running everything again performs zero actions.
        let before = trace(orchestrator.job()).len();
        orchestrator.run(Phase::All).unwrap();
        assert_eq!(trace(orchestrator.job()).len(), before);
    }

    #[test]
    fn test_run_chunk_executes_exactly_one_chunk() {
        let dir = tempdir().unwrap();
        let orchestrator =
            ChunkOrchestrator::with_job(traced_job(dir.path()), Platform::Local, 2);

        orchestrator.run(Phase::Preprocess).unwrap();
        orchestrator.run_chunk(1).unwrap();

        let lines = trace(orchestrator.job());
        assert!(lines.contains(&"chunk1/work".to_string()));
        assert!(!lines.iter().any(|l| l.starts_with("chunk0/")));
    }

    #[test]
    fn test_run_chunk_out_of_range() {
        let dir = tempdir().unwrap();
        let orchestrator =
            ChunkOrchestrator::with_job(traced_job(dir.path()), Platform::Local, 2);
        orchestrator.run(Phase::Preprocess).unwrap();

        assert!(orchestrator.run_chunk(7).is_err());
    }

    #[test]
    fn test_clean_then_status_without_actions() {
        let dir = tempdir().unwrap();
        let orchestrator =
            ChunkOrchestrator::with_job(traced_job(dir.path()), Platform::Local, 2);
        orchestrator.run(Phase::All).unwrap();

        let removed = orchestrator.clean(false);
        assert!(removed > 0);

        // Status is purely derived; rendering runs nothing.
        let before = trace(orchestrator.job()).len();
        let rendered = orchestrator.status();
        assert!(rendered.contains("Process"));
        assert_eq!(trace(orchestrator.job()).len(), before);
    }

    #[test]
    fn test_directive_parse() {
        assert_eq!(Directive::parse("run"), Some(Directive::Run(Phase::All)));
        assert_eq!(
            Directive::parse("preprocess"),
            Some(Directive::Run(Phase::Preprocess))
        );
        assert_eq!(
            Directive::parse("veryclean"),
            Some(Directive::Clean { deep: true })
        );
        assert_eq!(Directive::parse("status"), Some(Directive::Status));
        assert_eq!(Directive::parse("bogus"), None);
    }

    #[test]
    fn test_directive_passivity() {
        assert!(Directive::Status.is_passive());
        assert!(Directive::Kill.is_passive());
        assert!(Directive::Clean { deep: false }.is_passive());
        assert!(!Directive::Run(Phase::All).is_passive());
    }
}

//! Alignment Pipeline Definition
//!
//! Builds the three workflow kinds of a chunked alignment job from a
//! [`JobConfig`]:
//!
//! - preprocess: partition the raw read files into chunk files
//! - per-chunk process: align, convert, coordinate-sort
//! - postprocess: merge per-chunk alignments, index, optionally quantify
//!
//! Every command is an opaque external invocation; the engine only knows
//! "zero exit = ran" and checks declared artifacts for completion. All
//! chunk-produced artifacts carry a chunk suffix, so concurrent chunks
//! never write-contend; the postprocess merge is the single point that
//! reads across chunks.

use crate::config::JobConfig;
use crate::error::PipelineError;
use crate::execution::Engine;
use crate::workflow::{Step, Workflow};

/// One assembled job: the global config plus an engine per workflow.
#[derive(Debug)]
pub struct Job {
    pub config: JobConfig,
    pub preprocess: Engine,
    pub chunks: Vec<Engine>,
    pub postprocess: Engine,
}

impl Job {
    /// Number of chunks in the process phase.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// True when every preprocess step is complete.
    pub fn preprocess_complete(&self) -> bool {
        self.preprocess.is_complete()
    }

    /// True when every step of every chunk workflow is complete, verified
    /// via completion predicates (filesystem truth).
    pub fn process_complete(&self) -> bool {
        self.chunks.iter().all(|engine| engine.is_complete())
    }

    /// True when every postprocess step is complete.
    pub fn postprocess_complete(&self) -> bool {
        self.postprocess.is_complete()
    }

    /// Chunk indexes whose workflow is not yet fully complete.
    pub fn incomplete_chunks(&self) -> Vec<usize> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, engine)| !engine.is_complete())
            .map(|(index, _)| index)
            .collect()
    }

    /// Whole-job DOT diagram: each workflow's steps with scope-prefixed
    /// node names, edges pointing dependency → dependent.
    pub fn diagram(&self) -> String {
        let mut out = String::from("digraph job {\n    rankdir=LR;\n");

        for engine in self.engines() {
            for step in engine.workflow().steps() {
                out.push_str(&format!("    \"{}/{}\";\n", engine.scope(), step.name));
            }
            for step in engine.workflow().steps() {
                for dep in &step.previous {
                    out.push_str(&format!(
                        "    \"{scope}/{dep}\" -> \"{scope}/{name}\";\n",
                        scope = engine.scope(),
                        dep = dep,
                        name = step.name
                    ));
                }
            }
        }

        out.push_str("}\n");
        out
    }

    /// Whole-job shell script: preprocess, each chunk, then postprocess,
    /// each workflow's steps in topological order.
    pub fn shell_script(&self) -> String {
        let mut out = String::from("#!/bin/bash\nset -e\n");

        for engine in self.engines() {
            out.push_str(&format!("\n### {}\n", engine.scope()));
            for step in engine.workflow().steps() {
                if !step.comment.is_empty() {
                    out.push_str(&format!("# {}\n", step.comment));
                }
                out.push_str(&step.command);
                out.push('\n');
            }
        }

        out
    }

    /// Removes step artifacts across all workflows; deep also removes
    /// precious ones. Returns the number of artifacts removed.
    pub fn clean(&self, deep: bool) -> usize {
        self.engines().map(|engine| engine.clean(deep)).sum()
    }

    fn engines(&self) -> impl Iterator<Item = &Engine> {
        std::iter::once(&self.preprocess)
            .chain(self.chunks.iter())
            .chain(std::iter::once(&self.postprocess))
    }
}

/// Assembles the full job for `num_chunks` chunks.
pub fn build_job(
    config: &JobConfig,
    num_chunks: usize,
    dry_run: bool,
) -> Result<Job, PipelineError> {
    let mut preprocess = Engine::new(preprocess_workflow(config, num_chunks)?, "preprocess");
    preprocess.set_dry_run(dry_run);

    let mut chunks = Vec::with_capacity(num_chunks);
    for index in 0..num_chunks {
        let chunk_config = config.for_chunk(index);
        let mut engine = Engine::new(
            chunk_workflow(&chunk_config)?,
            format!("chunk {}", index),
        );
        engine.set_dry_run(dry_run);
        chunks.push(engine);
    }

    let mut postprocess = Engine::new(postprocess_workflow(config, num_chunks)?, "postprocess");
    postprocess.set_dry_run(dry_run);

    Ok(Job {
        config: config.clone(),
        preprocess,
        chunks,
        postprocess,
    })
}

/// Preprocess: split each read file into `num_chunks` chunk files.
pub fn preprocess_workflow(
    config: &JobConfig,
    num_chunks: usize,
) -> Result<Workflow, PipelineError> {
    let mut workflow = Workflow::new();

    for (mate_index, reads) in config.reads.iter().enumerate() {
        let mate = mate_index + 1;
        let prefix = config.chunks_dir().join(format!("reads_{}", mate));

        let mut step = Step::new(
            format!("split_reads_{}", mate),
            format!(
                "mkdir -p {dir} && seqsplit -n {n} -p {prefix} {reads}",
                dir = config.chunks_dir().display(),
                n = num_chunks,
                prefix = prefix.display(),
                reads = reads.display()
            ),
        )
        .with_comment(format!(
            "Partition mate-{} reads into {} chunks",
            mate, num_chunks
        ));
        for index in 0..num_chunks {
            step = step.with_output(config.chunk_reads(mate, index));
        }

        workflow.add_step(step).map_err(definition_error)?;
    }

    Ok(workflow)
}

/// Process phase for one chunk: align, convert, coordinate-sort.
///
/// The config must be chunk-specialized (see [`JobConfig::for_chunk`]).
pub fn chunk_workflow(config: &JobConfig) -> Result<Workflow, PipelineError> {
    let index = config.chunk.ok_or_else(|| {
        PipelineError::Configuration(vec![
            "chunk workflow requires a chunk-specialized config".to_string(),
        ])
    })?;

    let sam = config.chunk_sam(index);
    let bam = config.chunk_bam(index);
    let sorted = config.chunk_sorted_bam(index);

    let reads_spec = if config.is_paired() {
        format!(
            "-1 {} -2 {}",
            config.chunk_reads(1, index).display(),
            config.chunk_reads(2, index).display()
        )
    } else {
        format!("-U {}", config.chunk_reads(1, index).display())
    };

    let mut workflow = Workflow::new();

    workflow
        .add_step(
            Step::new(
                "align",
                format!(
                    "{aligner} {opts} -p {threads} -x {index} {reads} -S {sam}",
                    aligner = config.aligner,
                    opts = config.aligner_opts,
                    threads = config.threads,
                    index = config.index.display(),
                    reads = reads_spec,
                    sam = sam.display()
                ),
            )
            .with_output(&sam)
            .with_comment("Align chunk reads to the reference index"),
        )
        .map_err(definition_error)?;

    workflow
        .add_step(
            Step::new(
                "to_bam",
                format!(
                    "samtools view -b -o {bam} {sam}",
                    bam = bam.display(),
                    sam = sam.display()
                ),
            )
            .depends_on("align")
            .with_output(&bam)
            .with_comment("Convert the chunk alignment to BAM"),
        )
        .map_err(definition_error)?;

    workflow
        .add_step(
            Step::new(
                "sort_bam",
                format!(
                    "samtools sort -o {sorted} {bam}",
                    sorted = sorted.display(),
                    bam = bam.display()
                ),
            )
            .depends_on("to_bam")
            .with_output(&sorted)
            .with_comment("Coordinate-sort the chunk alignment"),
        )
        .map_err(definition_error)?;

    Ok(workflow)
}

/// Postprocess: merge all chunk alignments, index, optionally quantify.
///
/// Merged outputs are precious: they survive ordinary clean and fall only
/// to deep clean.
pub fn postprocess_workflow(
    config: &JobConfig,
    num_chunks: usize,
) -> Result<Workflow, PipelineError> {
    let merged = config.merged_bam();
    let sorted_list: Vec<String> = (0..num_chunks)
        .map(|index| config.chunk_sorted_bam(index).display().to_string())
        .collect();

    let mut workflow = Workflow::new();

    workflow
        .add_step(
            Step::new(
                "merge_bams",
                format!(
                    "samtools merge -f {merged} {inputs}",
                    merged = merged.display(),
                    inputs = sorted_list.join(" ")
                ),
            )
            .with_output(&merged)
            .precious()
            .with_comment("Merge per-chunk alignments into the final BAM"),
        )
        .map_err(definition_error)?;

    workflow
        .add_step(
            Step::new(
                "index_bam",
                format!("samtools index {}", merged.display()),
            )
            .depends_on("merge_bams")
            .with_output(config.merged_bam_index())
            .precious()
            .with_comment("Index the merged alignment"),
        )
        .map_err(definition_error)?;

    if let Some(annotation) = &config.annotation {
        workflow
            .add_step(
                Step::new(
                    "quantify",
                    format!(
                        "featureCounts -a {annotation} -o {counts} {merged}",
                        annotation = annotation.display(),
                        counts = config.counts_table().display(),
                        merged = merged.display()
                    ),
                )
                .depends_on("merge_bams")
                .with_output(config.counts_table())
                .precious()
                .with_comment("Quantify features over the merged alignment"),
            )
            .map_err(definition_error)?;
    }

    Ok(workflow)
}

fn definition_error(message: String) -> PipelineError {
    PipelineError::Configuration(vec![message])
}

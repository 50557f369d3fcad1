//! Job Configuration Record
//!
//! A [`JobConfig`] holds every parameter of a chunked alignment job. A
//! chunk-specialized config is derived from the global one with
//! [`JobConfig::for_chunk`]; it is identical except for the chunk index,
//! and all chunk-suffixed artifact paths are derived through the path
//! helpers on this type.
//!
//! The global config is persisted as a settings artifact inside the job's
//! output directory. Its presence is what distinguishes "attach to an
//! existing job" (status/kill/clean) from "start a new job".

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// File name of the persisted settings artifact in the output directory.
pub const SETTINGS_FILE: &str = "job.settings";

/// Cluster scheduler interface settings.
///
/// The scheduler itself is an external collaborator; only its submission
/// interface is consumed. Defaults speak PBS (`qsub`/`qdel`), and the
/// dependency flag is a template with an `{ids}` placeholder so other
/// dialects can be configured without code changes.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClusterSettings {
    /// Command that submits a job script and prints the job id.
    #[serde(default = "default_submit_cmd")]
    pub submit_cmd: String,

    /// Command that cancels a submitted job by id.
    #[serde(default = "default_cancel_cmd")]
    pub cancel_cmd: String,

    /// Dependency flag template; `{ids}` expands to a colon-joined id list.
    #[serde(default = "default_depend_flag")]
    pub depend_flag: String,

    /// Extra options appended to every submission.
    #[serde(default)]
    pub submit_opts: String,
}

fn default_submit_cmd() -> String {
    "qsub".to_string()
}

fn default_cancel_cmd() -> String {
    "qdel".to_string()
}

fn default_depend_flag() -> String {
    "-W depend=afterok:{ids}".to_string()
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            submit_cmd: default_submit_cmd(),
            cancel_cmd: default_cancel_cmd(),
            depend_flag: default_depend_flag(),
            submit_opts: String::new(),
        }
    }
}

/// Parameters of one chunked alignment job.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JobConfig {
    /// Directory receiving all artifacts, including the settings artifact.
    pub output_dir: PathBuf,

    /// Reference genome FASTA, used for resource estimation.
    pub genome: PathBuf,

    /// Prebuilt aligner index prefix.
    pub index: PathBuf,

    /// Input read files: one entry for single-end, two for paired-end.
    pub reads: Vec<PathBuf>,

    /// Aligner program name (invoked as an opaque command).
    #[serde(default = "default_aligner")]
    pub aligner: String,

    /// Extra options passed through to the aligner.
    #[serde(default)]
    pub aligner_opts: String,

    /// Optional annotation file; enables the quantification step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<PathBuf>,

    /// Explicit chunk count. When absent the resource estimator decides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_chunks: Option<usize>,

    /// Declared RAM available per chunk, in GB. When absent it is detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram_gb: Option<u64>,

    /// Threads handed to each per-chunk aligner invocation.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Cluster scheduler interface settings.
    #[serde(default)]
    pub cluster: ClusterSettings,

    /// Chunk index; set only on chunk-specialized configs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<usize>,
}

fn default_aligner() -> String {
    "bowtie2".to_string()
}

fn default_threads() -> usize {
    4
}

impl JobConfig {
    /// Loads a job config from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(vec![format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            )])
        })?;

        let config: JobConfig = serde_yaml::from_str(&content).map_err(|e| {
            PipelineError::Configuration(vec![format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            )])
        })?;

        info!("Loaded job config from {}", path.display());
        Ok(config)
    }

    /// Derives the chunk-specialized config for chunk `index`.
    ///
    /// The result is identical to the global config except for the chunk
    /// index; chunk-suffixed paths come out of the path helpers below.
    pub fn for_chunk(&self, index: usize) -> Self {
        let mut chunk_config = self.clone();
        chunk_config.chunk = Some(index);
        chunk_config
    }

    /// True when this is a chunk-specialized config.
    pub fn is_chunk(&self) -> bool {
        self.chunk.is_some()
    }

    /// True for paired-end input (two read files).
    pub fn is_paired(&self) -> bool {
        self.reads.len() == 2
    }

    // --- artifact path helpers -------------------------------------------

    /// Directory holding per-chunk artifacts.
    pub fn chunks_dir(&self) -> PathBuf {
        self.output_dir.join("chunks")
    }

    /// Directory holding cluster submission scripts and the job-id record.
    pub fn cluster_dir(&self) -> PathBuf {
        self.output_dir.join("cluster")
    }

    /// Split read file for mate `mate` (1 or 2) of chunk `index`.
    pub fn chunk_reads(&self, mate: usize, index: usize) -> PathBuf {
        self.chunks_dir().join(format!("reads_{}.c{}.fq", mate, index))
    }

    /// Raw alignment output of chunk `index`.
    pub fn chunk_sam(&self, index: usize) -> PathBuf {
        self.chunks_dir().join(format!("aligned.c{}.sam", index))
    }

    /// Converted alignment of chunk `index`.
    pub fn chunk_bam(&self, index: usize) -> PathBuf {
        self.chunks_dir().join(format!("aligned.c{}.bam", index))
    }

    /// Coordinate-sorted alignment of chunk `index`.
    pub fn chunk_sorted_bam(&self, index: usize) -> PathBuf {
        self.chunks_dir().join(format!("sorted.c{}.bam", index))
    }

    /// Final merged alignment across all chunks.
    pub fn merged_bam(&self) -> PathBuf {
        self.output_dir.join("merged.bam")
    }

    /// Index of the merged alignment.
    pub fn merged_bam_index(&self) -> PathBuf {
        self.output_dir.join("merged.bam.bai")
    }

    /// Quantification table over the merged alignment.
    pub fn counts_table(&self) -> PathBuf {
        self.output_dir.join("counts.txt")
    }

    /// Pid file written by a running local parent.
    pub fn pid_file(&self) -> PathBuf {
        self.output_dir.join("job.pid")
    }

    /// Record of submitted cluster job ids.
    pub fn job_ids_file(&self) -> PathBuf {
        self.cluster_dir().join("job_ids")
    }

    /// Path of the settings artifact for this job.
    pub fn settings_path(&self) -> PathBuf {
        self.output_dir.join(SETTINGS_FILE)
    }
}

/// The persisted form of a job: the global config plus a save timestamp.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JobSettings {
    /// When the settings artifact was written.
    pub saved_at: DateTime<Utc>,

    /// The serialized global config.
    pub config: JobConfig,
}

impl JobSettings {
    /// Writes the settings artifact into the job's output directory.
    pub fn save(config: &JobConfig) -> Result<PathBuf, PipelineError> {
        fs::create_dir_all(&config.output_dir)?;

        let settings = JobSettings {
            saved_at: Utc::now(),
            config: config.clone(),
        };

        let path = config.settings_path();
        let json = serde_json::to_string_pretty(&settings)
            .map_err(|e| PipelineError::Configuration(vec![e.to_string()]))?;
        fs::write(&path, json)?;

        info!("Saved job settings to {}", path.display());
        Ok(path)
    }

    /// Loads the settings artifact from a job output directory.
    pub fn load(output_dir: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = output_dir.as_ref().join(SETTINGS_FILE);

        let content = fs::read_to_string(&path)
            .map_err(|_| PipelineError::NoSuchJob(output_dir.as_ref().display().to_string()))?;
        let settings: JobSettings = serde_json::from_str(&content).map_err(|e| {
            PipelineError::Configuration(vec![format!(
                "corrupt settings artifact '{}': {}",
                path.display(),
                e
            )])
        })?;

        info!(
            "Attached to job saved at {} ({})",
            settings.saved_at,
            path.display()
        );
        Ok(settings)
    }

    /// True when `output_dir` holds a settings artifact.
    pub fn exists(output_dir: impl AsRef<Path>) -> bool {
        output_dir.as_ref().join(SETTINGS_FILE).is_file()
    }
}
